//! Bridging local destinations to broker queues.
//!
//! For every [`Route`] the router installs two legs. The forward leg listens
//! on the local request destination and sends each message to the broker
//! queue, copying the `responseId` header into the native correlation id and
//! naming the paired `.REPLY` queue as reply-to. The reverse leg consumes the
//! broker reply queue and delivers each reply to the local `.REPLY`
//! destination with the correlation id copied back into `responseId`.
//!
//! Neither leg retries or buffers. Under the default
//! [`CorrelationPolicy::Stateless`] the router keeps no per-request state.

mod config;
mod error;
mod forward;
mod pending;
mod reverse;
mod route;
#[cfg(test)]
mod tests;

use std::{fmt, sync::Arc};

pub use config::{CorrelationPolicy, MissingTokenPolicy, RouterConfig};
pub use error::RouterError;
use forward::ForwardRoute;
use pending::PendingReplies;
use reverse::ReverseRoute;
pub(crate) use route::ensure_distinct;
pub use route::Route;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::info;

use crate::{broker::RemoteBroker, bus::LocalBus};

/// Installs routes between a local bus and a remote broker.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use busbridge::{
///     broker::MemoryBroker,
///     bus::InMemoryBus,
///     router::{CorrelationRouter, Route},
/// };
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bus = Arc::new(InMemoryBus::new());
/// let broker = Arc::new(MemoryBroker::new());
/// let handle = CorrelationRouter::new(bus, broker)
///     .install(Route::symmetric("orders")?)
///     .await?;
/// handle.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct CorrelationRouter {
    bus: Arc<dyn LocalBus>,
    broker: Arc<dyn RemoteBroker>,
    config: RouterConfig,
}

impl CorrelationRouter {
    #[must_use]
    pub fn new(bus: Arc<dyn LocalBus>, broker: Arc<dyn RemoteBroker>) -> Self {
        Self {
            bus,
            broker,
            config: RouterConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: RouterConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn config(&self) -> &RouterConfig { &self.config }

    /// Install a single route.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError`] if the reply queue cannot be subscribed or the
    /// local destination already has a listener.
    pub async fn install(&self, route: Route) -> Result<RouterHandle, RouterError> {
        self.install_all([route]).await
    }

    /// Install several routes under one handle.
    ///
    /// Routes sharing a local destination or a broker queue are refused
    /// before anything is installed. Installation stops at the first
    /// failure; routes installed before it are removed again.
    ///
    /// # Errors
    ///
    /// See [`CorrelationRouter::install`].
    pub async fn install_all(&self, routes: impl IntoIterator<Item = Route>) -> Result<RouterHandle, RouterError> {
        let routes: Vec<Route> = routes.into_iter().collect();
        ensure_distinct(&routes)?;
        let mut handle = RouterHandle::new(Arc::clone(&self.bus));
        for route in routes {
            if let Err(e) = self.install_route(route, &mut handle).await {
                handle.shutdown().await;
                return Err(e);
            }
        }
        Ok(handle)
    }

    async fn install_route(&self, route: Route, handle: &mut RouterHandle) -> Result<(), RouterError> {
        let pending = match self.config.correlation {
            CorrelationPolicy::Stateless => None,
            CorrelationPolicy::Tracked { .. } => Some(Arc::new(PendingReplies::default())),
        };
        // Subscribe before listening so no reply can precede its consumer.
        let replies = self.broker.subscribe(&route.broker_reply()).await?;
        let forward = ForwardRoute::new(
            &route,
            Arc::clone(&self.broker),
            self.config,
            pending.clone(),
        );
        self.bus
            .register_listener(&route.bus_request(), Arc::new(forward))?;

        let reverse = ReverseRoute::new(&route, Arc::clone(&self.bus), self.config, pending.clone());
        handle
            .tracker
            .spawn(reverse.run(replies, handle.shutdown.clone()));
        if let (CorrelationPolicy::Tracked { timeout }, Some(pending)) = (self.config.correlation, &pending) {
            handle.tracker.spawn(pending::sweep(
                Arc::clone(pending),
                timeout,
                route.broker_request(),
                handle.shutdown.clone(),
            ));
        }
        info!(%route, "route installed");
        handle.routes.push(InstalledRoute { route, pending });
        Ok(())
    }
}

impl fmt::Debug for CorrelationRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorrelationRouter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

struct InstalledRoute {
    route: Route,
    pending: Option<Arc<PendingReplies>>,
}

/// Owns the listeners and consumer tasks of installed routes.
///
/// Dropping the handle stops the consumers but leaves the forward listeners
/// registered; call [`RouterHandle::shutdown`] to remove both.
pub struct RouterHandle {
    bus: Arc<dyn LocalBus>,
    routes: Vec<InstalledRoute>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl RouterHandle {
    fn new(bus: Arc<dyn LocalBus>) -> Self {
        Self {
            bus,
            routes: Vec::new(),
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Routes managed by this handle, in installation order.
    pub fn routes(&self) -> impl Iterator<Item = &Route> { self.routes.iter().map(|r| &r.route) }

    /// Requests still awaiting a reply; always zero when stateless.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.routes
            .iter()
            .filter_map(|r| r.pending.as_ref())
            .map(|p| p.len())
            .sum()
    }

    /// Unregister the forward listeners, stop the reply consumers and wait
    /// for them to exit.
    pub async fn shutdown(&self) {
        for installed in &self.routes {
            self.bus.unregister_listener(&installed.route.bus_request());
        }
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        info!(routes = self.routes.len(), "router stopped");
    }
}

impl Drop for RouterHandle {
    fn drop(&mut self) { self.shutdown.cancel(); }
}

impl fmt::Debug for RouterHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterHandle")
            .field("routes", &self.routes.iter().map(|r| r.route.to_string()).collect::<Vec<_>>())
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

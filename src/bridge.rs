//! Wiring a configured bridge together.

use std::sync::Arc;

use tracing::info;

use crate::{
    broker::BrokerClient,
    bus::LocalBus,
    config::BridgeConfig,
    error::BridgeError,
    router::{CorrelationRouter, Route, RouterHandle},
    transport::TransportSelector,
};

/// A running bridge: one broker connection and the routes installed on it.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
///
/// use busbridge::{Bridge, BridgeConfig, bus::InMemoryBus};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = BridgeConfig::from_toml_str(
///     r#"
///     broker_url = "tcp://localhost:61616"
///     [[routes]]
///     bus = "orders"
///     "#,
/// )?;
/// let bridge = Bridge::start(&config, Arc::new(InMemoryBus::new())).await?;
/// // ...
/// bridge.shutdown().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Bridge {
    client: Arc<BrokerClient>,
    router: RouterHandle,
}

impl Bridge {
    /// Connect to the configured broker and install every configured route
    /// on `bus`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError`] if the broker cannot be reached, the TLS
    /// credentials cannot be loaded or a route cannot be installed.
    pub async fn start(config: &BridgeConfig, bus: Arc<dyn LocalBus>) -> Result<Self, BridgeError> {
        let uri = config.broker_uri()?;
        let routes = config.routes()?;
        let selector = match config.tls_settings() {
            Some(tls) => TransportSelector::with_tls(tls, config.connect_options()),
            None => TransportSelector::plain_only(config.connect_options()),
        };
        let client = Arc::new(BrokerClient::connect(&uri, &selector).await?);
        let router = match CorrelationRouter::new(bus, client.clone())
            .with_config(config.router_config())
            .install_all(routes)
            .await
        {
            Ok(router) => router,
            Err(e) => {
                client.close().await;
                return Err(e.into());
            }
        };
        info!(%uri, routes = router.routes().count(), "bridge started");
        Ok(Self { client, router })
    }

    pub fn routes(&self) -> impl Iterator<Item = &Route> { self.router.routes() }

    /// Requests awaiting a reply under the tracked correlation policy.
    #[must_use]
    pub fn pending_count(&self) -> usize { self.router.pending_count() }

    #[must_use]
    pub fn broker(&self) -> &Arc<BrokerClient> { &self.client }

    /// Remove the routes and close the broker connection.
    pub async fn shutdown(self) {
        self.router.shutdown().await;
        self.client.close().await;
    }
}

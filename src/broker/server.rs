//! Network front end for a [`MemoryBroker`].

mod accept;
mod backoff;
mod connection;

use std::{io, net::SocketAddr, sync::Arc};

pub use backoff::BackoffConfig;
use rustls::ServerConfig;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::info;

use self::{accept::accept_loop, connection::ConnectionContext};
use super::MemoryBroker;

/// Serves the broker protocol on a TCP listener, optionally behind TLS.
///
/// # Examples
///
/// ```no_run
/// use busbridge::broker::BrokerServer;
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main]
/// # async fn main() -> std::io::Result<()> {
/// let server = BrokerServer::bind("127.0.0.1:61616".parse().expect("valid address")).await?;
/// let shutdown = CancellationToken::new();
/// tokio::spawn(server.run(shutdown.clone()));
/// // ...
/// shutdown.cancel();
/// # Ok(())
/// # }
/// ```
pub struct BrokerServer {
    listener: TcpListener,
    acceptor: Option<TlsAcceptor>,
    broker: Arc<MemoryBroker>,
    backoff: BackoffConfig,
}

impl BrokerServer {
    /// Listen on `addr` with a fresh, empty broker.
    ///
    /// # Errors
    ///
    /// Returns an [`io::Error`] if the address cannot be bound.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        Ok(Self::from_listener(TcpListener::bind(addr).await?))
    }

    /// Serve on an already bound listener.
    #[must_use]
    pub fn from_listener(listener: TcpListener) -> Self {
        Self {
            listener,
            acceptor: None,
            broker: Arc::new(MemoryBroker::new()),
            backoff: BackoffConfig::default(),
        }
    }

    /// Require TLS on every connection.
    #[must_use]
    pub fn with_tls(mut self, config: Arc<ServerConfig>) -> Self {
        self.acceptor = Some(TlsAcceptor::from(config));
        self
    }

    /// Serve `broker` instead of a private one.
    #[must_use]
    pub fn with_broker(mut self, broker: Arc<MemoryBroker>) -> Self {
        self.broker = broker;
        self
    }

    #[must_use]
    pub fn accept_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// # Errors
    ///
    /// Returns an [`io::Error`] if the socket address cannot be read.
    pub fn local_addr(&self) -> io::Result<SocketAddr> { self.listener.local_addr() }

    #[must_use]
    pub fn broker(&self) -> &Arc<MemoryBroker> { &self.broker }

    #[must_use]
    pub fn is_secure(&self) -> bool { self.acceptor.is_some() }

    /// Accept and serve connections until `shutdown` is cancelled, then wait
    /// for every connection task to finish.
    pub async fn run(self, shutdown: CancellationToken) {
        let local_addr = self.listener.local_addr().ok();
        info!(
            address = ?local_addr,
            secure = self.is_secure(),
            "broker listening"
        );
        let tracker = TaskTracker::new();
        let context = ConnectionContext {
            broker: self.broker,
            acceptor: self.acceptor,
            shutdown,
        };
        accept_loop(
            Arc::new(self.listener),
            context,
            tracker.clone(),
            self.backoff,
        )
        .await;
        tracker.close();
        tracker.wait().await;
        info!(address = ?local_addr, "broker stopped");
    }
}

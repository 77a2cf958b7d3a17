//! In-process brokers and scripted peers for end-to-end tests.

use std::{io, net::SocketAddr, sync::Arc};

use busbridge::broker::{BrokerMessage, BrokerServer, MemoryBroker, RemoteBroker};
use rustls::ServerConfig;
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::sync::CancellationToken;

/// A [`BrokerServer`] running on an ephemeral loopback port.
#[derive(Debug)]
pub struct TestBroker {
    addr: SocketAddr,
    secure: bool,
    broker: Arc<MemoryBroker>,
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl TestBroker {
    /// Start a plain TCP broker.
    ///
    /// # Errors
    ///
    /// Returns an error if no loopback port can be bound.
    pub async fn spawn() -> io::Result<Self> { Self::start(None).await }

    /// Start a broker that requires TLS with `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if no loopback port can be bound.
    pub async fn spawn_tls(config: Arc<ServerConfig>) -> io::Result<Self> { Self::start(Some(config)).await }

    async fn start(tls: Option<Arc<ServerConfig>>) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let mut server = BrokerServer::from_listener(listener);
        if let Some(config) = tls {
            server = server.with_tls(config);
        }
        let secure = server.is_secure();
        let broker = Arc::clone(server.broker());
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(server.run(shutdown.clone()));
        Ok(Self {
            addr,
            secure,
            broker,
            shutdown,
            handle,
        })
    }

    #[must_use]
    pub fn addr(&self) -> SocketAddr { self.addr }

    /// Broker URL with the scheme matching the listener: `tcp://` or `ssl://`.
    #[must_use]
    pub fn url(&self) -> String {
        let scheme = if self.secure { "ssl" } else { "tcp" };
        format!("{scheme}://{}", self.addr)
    }

    /// The queues behind the server, for peers that skip the network.
    #[must_use]
    pub fn broker(&self) -> Arc<MemoryBroker> { Arc::clone(&self.broker) }

    /// Stop accepting, close every connection and wait for the server task.
    pub async fn stop(mut self) {
        self.shutdown.cancel();
        let _ = (&mut self.handle).await;
    }
}

impl Drop for TestBroker {
    fn drop(&mut self) { self.shutdown.cancel(); }
}

/// Consume requests from `queue` and answer each with its payload in upper
/// case on the request's reply-to queue.
///
/// Requests are answered in batches of `batch`, last request first, so
/// replies reach the bridge out of order. A batch of one answers in order.
/// The subscription is in place when this returns.
///
/// # Errors
///
/// Returns the subscription error if `queue` cannot be consumed.
pub async fn spawn_uppercase_responder(
    broker: Arc<dyn RemoteBroker>,
    queue: &str,
    batch: usize,
) -> Result<JoinHandle<()>, busbridge::transport::TransportError> {
    let mut requests = broker.subscribe(queue).await?;
    let batch = batch.max(1);
    Ok(tokio::spawn(async move {
        let mut held: Vec<BrokerMessage> = Vec::with_capacity(batch);
        while let Some(request) = requests.next().await {
            held.push(request);
            if held.len() < batch {
                continue;
            }
            while let Some(request) = held.pop() {
                let upper = String::from_utf8_lossy(&request.payload).to_uppercase();
                let Some(reply) = request.reply(upper.into_bytes()) else {
                    continue;
                };
                if broker.send(reply).await.is_err() {
                    return;
                }
            }
        }
    }))
}

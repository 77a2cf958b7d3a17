//! Connection strategies for plain and TLS-secured broker transports.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use rustls::pki_types::ServerName;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};
use tokio_rustls::TlsConnector;
use tracing::debug;

use super::{BrokerUri, TransportError};
use crate::tls::TlsContextCell;

/// Trait alias for byte streams a broker connection can run over.
pub trait ChannelStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T> ChannelStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// An open, possibly encrypted, byte channel to the broker.
pub type Channel = Box<dyn ChannelStream>;

/// Socket behaviour shared by every connector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectOptions {
    nodelay: bool,
    timeout: Option<Duration>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            nodelay: true,
            timeout: None,
        }
    }
}

impl ConnectOptions {
    /// Configure `TCP_NODELAY` on new sockets.
    #[must_use]
    pub fn nodelay(mut self, enabled: bool) -> Self {
        self.nodelay = enabled;
        self
    }

    /// Abort connection attempts that take longer than `timeout`.
    #[must_use]
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Strategy that turns a broker URI into an open channel.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a channel to `uri`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the connection cannot be established.
    async fn connect(&self, uri: &BrokerUri) -> Result<Channel, TransportError>;
}

/// Plain TCP connector; no TLS negotiation.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlainConnector {
    options: ConnectOptions,
}

impl PlainConnector {
    #[must_use]
    pub fn new(options: ConnectOptions) -> Self { Self { options } }

    async fn open(&self, uri: &BrokerUri) -> Result<TcpStream, TransportError> {
        let address = uri.address();
        let dial = TcpStream::connect((uri.host(), uri.port()));
        let stream = match self.options.timeout {
            Some(limit) => tokio::time::timeout(limit, dial)
                .await
                .map_err(|_| TransportError::Timeout(address.clone()))?,
            None => dial.await,
        }
        .map_err(|source| TransportError::Connect {
            address: address.clone(),
            source,
        })?;
        stream.set_nodelay(self.options.nodelay)?;
        debug!(%address, "tcp connection established");
        Ok(stream)
    }
}

#[async_trait]
impl Connector for PlainConnector {
    async fn connect(&self, uri: &BrokerUri) -> Result<Channel, TransportError> {
        Ok(Box::new(self.open(uri).await?))
    }
}

/// TLS connector backed by the shared [`TlsContextCell`].
///
/// The context is requested before dialling, so credential problems surface
/// without touching the network.
#[derive(Debug)]
pub struct SecureConnector {
    tcp: PlainConnector,
    contexts: Arc<TlsContextCell>,
}

impl SecureConnector {
    #[must_use]
    pub fn new(contexts: Arc<TlsContextCell>, options: ConnectOptions) -> Self {
        Self {
            tcp: PlainConnector::new(options),
            contexts,
        }
    }

    /// The context cell this connector draws from.
    #[must_use]
    pub fn contexts(&self) -> &Arc<TlsContextCell> { &self.contexts }
}

#[async_trait]
impl Connector for SecureConnector {
    async fn connect(&self, uri: &BrokerUri) -> Result<Channel, TransportError> {
        let context = self.contexts.get().await?;
        let server_name = ServerName::try_from(uri.host().to_owned()).map_err(|e| {
            TransportError::InvalidUri {
                uri: uri.to_string(),
                reason: e.to_string(),
            }
        })?;
        let stream = self.tcp.open(uri).await?;
        let tls = TlsConnector::from(context.client_config())
            .connect(server_name, stream)
            .await
            .map_err(|source| TransportError::Handshake {
                address: uri.address(),
                source,
            })?;
        debug!(address = %uri.address(), "tls session established");
        Ok(Box::new(tls))
    }
}

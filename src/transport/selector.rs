//! Scheme-based choice between plain and secure connectors.

use std::{fmt, sync::Arc};

use super::{
    BrokerUri,
    Channel,
    ConnectOptions,
    Connector,
    PlainConnector,
    SecureConnector,
    TransportError,
};
use crate::tls::{TlsContextBuilder, TlsContextCell, TlsSettings};

/// Picks the connector matching a broker URI scheme.
///
/// Non-secure schemes go to the plain connector and never touch TLS
/// material. Secure schemes go to the secure connector, which builds the
/// shared context on first use.
///
/// # Examples
///
/// ```
/// use busbridge::transport::{ConnectOptions, TransportSelector};
///
/// let selector = TransportSelector::plain_only(ConnectOptions::default());
/// let uri = "ssl://broker.example:61617".parse().expect("valid URI");
/// assert!(selector.connector_for(&uri).is_err());
/// ```
#[derive(Clone)]
pub struct TransportSelector {
    plain: Arc<dyn Connector>,
    secure: Option<Arc<dyn Connector>>,
}

impl TransportSelector {
    /// Combine explicit connector strategies.
    #[must_use]
    pub fn new(plain: Arc<dyn Connector>, secure: Option<Arc<dyn Connector>>) -> Self {
        Self { plain, secure }
    }

    /// Selector that only supports plain transports.
    #[must_use]
    pub fn plain_only(options: ConnectOptions) -> Self {
        Self::new(Arc::new(PlainConnector::new(options)), None)
    }

    /// Selector whose secure connector loads credentials from `settings`.
    ///
    /// Nothing is read until the first secure connection is attempted.
    #[must_use]
    pub fn with_tls(settings: TlsSettings, options: ConnectOptions) -> Self {
        let cell = Arc::new(TlsContextCell::new(Arc::new(TlsContextBuilder::new(
            settings,
        ))));
        Self::with_context_cell(cell, options)
    }

    /// Selector sharing an existing context cell.
    #[must_use]
    pub fn with_context_cell(cell: Arc<TlsContextCell>, options: ConnectOptions) -> Self {
        Self::new(
            Arc::new(PlainConnector::new(options)),
            Some(Arc::new(SecureConnector::new(cell, options))),
        )
    }

    /// Connector responsible for `uri`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::SecureUnavailable`] for a secure URI when no
    /// secure connector is configured.
    pub fn connector_for(&self, uri: &BrokerUri) -> Result<&Arc<dyn Connector>, TransportError> {
        if uri.scheme().is_secure() {
            self.secure
                .as_ref()
                .ok_or_else(|| TransportError::SecureUnavailable(uri.to_string()))
        } else {
            Ok(&self.plain)
        }
    }

    /// Open a channel to `uri` with the matching connector.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if no connector matches or the connection
    /// fails.
    pub async fn connect(&self, uri: &BrokerUri) -> Result<Channel, TransportError> {
        self.connector_for(uri)?.connect(uri).await
    }
}

impl fmt::Debug for TransportSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportSelector")
            .field("secure", &self.secure.is_some())
            .finish_non_exhaustive()
    }
}

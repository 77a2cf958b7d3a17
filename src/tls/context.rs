//! Construction of the shared client-side TLS context.

use std::{fmt, sync::Arc};

use rustls::{ClientConfig, RootCertStore, crypto::CryptoProvider};
use tracing::debug;

use super::{CredentialLoadError, StoreSettings};

/// Credential locations used to secure broker connections.
///
/// The key store is optional; without it no client certificate is
/// presented and only the server is authenticated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TlsSettings {
    trust_store: StoreSettings,
    key_store: Option<StoreSettings>,
}

impl TlsSettings {
    #[must_use]
    pub fn new(trust_store: StoreSettings) -> Self {
        Self {
            trust_store,
            key_store: None,
        }
    }

    /// Present the identity in `key_store` to the broker.
    #[must_use]
    pub fn key_store(mut self, key_store: StoreSettings) -> Self {
        self.key_store = Some(key_store);
        self
    }

    #[must_use]
    pub fn trust_store_settings(&self) -> &StoreSettings { &self.trust_store }

    #[must_use]
    pub fn key_store_settings(&self) -> Option<&StoreSettings> { self.key_store.as_ref() }
}

/// Immutable TLS context shared by every connection to the broker.
#[derive(Clone)]
pub struct SecureTransportContext {
    config: Arc<ClientConfig>,
    trust_anchors: usize,
    client_auth: bool,
}

impl SecureTransportContext {
    /// Client configuration handed to the TLS connector.
    #[must_use]
    pub fn client_config(&self) -> Arc<ClientConfig> { Arc::clone(&self.config) }

    /// Number of trust anchors loaded from the trust store.
    #[must_use]
    pub fn trust_anchor_count(&self) -> usize { self.trust_anchors }

    /// Whether a client certificate is presented during the handshake.
    #[must_use]
    pub fn presents_client_certificate(&self) -> bool { self.client_auth }

    /// Context with no trust anchors; every handshake fails verification.
    #[cfg(test)]
    pub(crate) fn untrusted() -> Self {
        let config = ClientConfig::builder_with_provider(provider())
            .with_safe_default_protocol_versions()
            .expect("ring supports the default protocol versions")
            .with_root_certificates(RootCertStore::empty())
            .with_no_client_auth();
        Self {
            config: Arc::new(config),
            trust_anchors: 0,
            client_auth: false,
        }
    }
}

impl fmt::Debug for SecureTransportContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureTransportContext")
            .field("trust_anchors", &self.trust_anchors)
            .field("client_auth", &self.client_auth)
            .finish_non_exhaustive()
    }
}

/// Something able to produce a [`SecureTransportContext`].
///
/// [`TlsContextBuilder`] is the production implementation; the seam lets
/// the context cell be exercised without real credentials.
#[cfg_attr(test, mockall::automock)]
pub trait ContextSource: Send + Sync {
    /// Build a fresh context.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialLoadError`] if the material cannot be loaded.
    fn build_context(&self) -> Result<SecureTransportContext, CredentialLoadError>;
}

/// Loads trust and key material and combines it into a context.
#[derive(Clone, Debug)]
pub struct TlsContextBuilder {
    settings: TlsSettings,
}

impl TlsContextBuilder {
    #[must_use]
    pub fn new(settings: TlsSettings) -> Self { Self { settings } }

    /// Load the stores and build the context.
    ///
    /// Reads the stores synchronously; no network I/O takes place.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialLoadError`] if either store is missing, corrupt,
    /// sealed with a different password, or rejected by the TLS library.
    pub fn build(&self) -> Result<SecureTransportContext, CredentialLoadError> {
        let trust_store = &self.settings.trust_store;
        let mut roots = RootCertStore::empty();
        for cert in trust_store.load_certificates()? {
            roots
                .add(cert)
                .map_err(|source| CredentialLoadError::InvalidCertificate {
                    location: format!("{:?}", trust_store.source()),
                    source,
                })?;
        }
        let trust_anchors = roots.len();

        let identity = match &self.settings.key_store {
            Some(key_store) => key_store.load_identity()?,
            None => None,
        };

        let builder = ClientConfig::builder_with_provider(provider())
            .with_safe_default_protocol_versions()?
            .with_root_certificates(roots);
        let (config, client_auth) = match identity {
            Some(identity) => (builder.with_client_auth_cert(identity.chain, identity.key)?, true),
            None => (builder.with_no_client_auth(), false),
        };
        debug!(trust_anchors, client_auth, "secure transport context built");

        Ok(SecureTransportContext {
            config: Arc::new(config),
            trust_anchors,
            client_auth,
        })
    }
}

impl ContextSource for TlsContextBuilder {
    fn build_context(&self) -> Result<SecureTransportContext, CredentialLoadError> { self.build() }
}

/// Crypto provider used for every client and server configuration.
pub(crate) fn provider() -> Arc<CryptoProvider> { Arc::new(rustls::crypto::ring::default_provider()) }

//! Server-side TLS configuration for [`crate::broker::BrokerServer`].

use std::sync::Arc;

use rustls::{RootCertStore, ServerConfig, server::WebPkiClientVerifier};

use super::{CredentialLoadError, StoreSettings, context::provider};

/// Build a server configuration from the broker's own identity.
///
/// When `client_trust` is given, clients must present a certificate signed
/// by one of its anchors.
///
/// # Errors
///
/// Returns [`CredentialLoadError`] if a store cannot be loaded, the identity
/// store holds no key, or the TLS library rejects the material.
pub fn server_config(
    identity: &StoreSettings,
    client_trust: Option<&StoreSettings>,
) -> Result<Arc<ServerConfig>, CredentialLoadError> {
    let location = format!("{:?}", identity.source());
    let identity = identity
        .load_identity()?
        .ok_or(CredentialLoadError::NoCertificates { location })?;

    let builder =
        ServerConfig::builder_with_provider(provider()).with_safe_default_protocol_versions()?;
    let config = match client_trust {
        Some(trust) => {
            let mut roots = RootCertStore::empty();
            for cert in trust.load_certificates()? {
                roots.add(cert)?;
            }
            let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider())
                .build()
                .map_err(|e| CredentialLoadError::Config(rustls::Error::General(e.to_string())))?;
            builder
                .with_client_cert_verifier(verifier)
                .with_single_cert(identity.chain, identity.key)?
        }
        None => builder
            .with_no_client_auth()
            .with_single_cert(identity.chain, identity.key)?,
    };
    Ok(Arc::new(config))
}

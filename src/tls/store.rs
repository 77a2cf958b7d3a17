//! Trust and key store loading.
//!
//! Stores are PEM documents read from a file or from memory and optionally
//! protected by a password seal (see [`super::seal_store`]).

use std::{fmt, fs, path::PathBuf, sync::Arc};

use rustls::pki_types::{CertificateDer, PrivateKeyDer, pem::PemObject};

use super::{
    CredentialLoadError,
    seal::{SealCheck, check_seal},
};

/// Where a credential store's bytes come from.
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// A file on disk, read each time the store is loaded.
    File(PathBuf),
    /// Bytes embedded by the caller.
    Memory {
        /// Label used in diagnostics.
        label: String,
        /// Store contents.
        bytes: Arc<[u8]>,
    },
}

impl CredentialSource {
    /// Store held in memory under a diagnostic label.
    #[must_use]
    pub fn memory(label: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self::Memory {
            label: label.into(),
            bytes: bytes.into(),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::Memory { label, .. } => format!("<memory:{label}>"),
        }
    }

    fn read(&self) -> Result<Vec<u8>, CredentialLoadError> {
        match self {
            Self::File(path) => fs::read(path).map_err(|source| CredentialLoadError::Read {
                location: path.clone(),
                source,
            }),
            Self::Memory { bytes, .. } => Ok(bytes.to_vec()),
        }
    }
}

impl fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => f.debug_tuple("File").field(path).finish(),
            Self::Memory { label, bytes } => f
                .debug_struct("Memory")
                .field("label", label)
                .field("len", &bytes.len())
                .finish(),
        }
    }
}

impl From<PathBuf> for CredentialSource {
    fn from(path: PathBuf) -> Self { Self::File(path) }
}

/// A store location plus the password protecting it.
#[derive(Clone, PartialEq, Eq)]
pub struct StoreSettings {
    source: CredentialSource,
    password: Option<String>,
}

impl StoreSettings {
    #[must_use]
    pub fn new(source: impl Into<CredentialSource>) -> Self {
        Self {
            source: source.into(),
            password: None,
        }
    }

    /// Require the store seal to verify against `password`.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    #[must_use]
    pub fn source(&self) -> &CredentialSource { &self.source }

    /// Read the store and verify its seal, returning the PEM body.
    fn open(&self) -> Result<Vec<u8>, CredentialLoadError> {
        let bytes = self.source.read()?;
        self.verify(&bytes)
    }

    fn verify(&self, bytes: &[u8]) -> Result<Vec<u8>, CredentialLoadError> {
        let location = self.source.describe();
        match check_seal(bytes, self.password.as_deref()) {
            SealCheck::Verified(body) => Ok(body.to_vec()),
            SealCheck::Mismatch => Err(CredentialLoadError::PasswordMismatch { location }),
            SealCheck::Missing => Err(CredentialLoadError::MissingSeal { location }),
            SealCheck::Malformed => Err(CredentialLoadError::MalformedSeal { location }),
        }
    }

    /// Load every certificate in the store as a trust anchor candidate.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialLoadError`] if the store is unreadable, the seal
    /// fails, the PEM is corrupt, or no certificate is present.
    pub fn load_certificates(&self) -> Result<Vec<CertificateDer<'static>>, CredentialLoadError> {
        let body = self.open()?;
        let certs = parse_certificates(&body, &self.source.describe())?;
        if certs.is_empty() {
            return Err(CredentialLoadError::NoCertificates {
                location: self.source.describe(),
            });
        }
        Ok(certs)
    }

    /// Load a certificate chain and its private key.
    ///
    /// Returns `Ok(None)` for an empty store so callers fall back to
    /// connecting without a client certificate. An empty store carries no
    /// seal, so its password is not checked.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialLoadError`] if the store is unreadable, the seal
    /// fails, the PEM is corrupt, or certificates come without a key.
    pub fn load_identity(&self) -> Result<Option<Identity>, CredentialLoadError> {
        let bytes = self.source.read()?;
        if is_blank(&bytes) {
            return Ok(None);
        }
        let body = self.verify(&bytes)?;
        if is_blank(&body) {
            return Ok(None);
        }
        let location = self.source.describe();
        let chain = parse_certificates(&body, &location)?;
        let key = match PrivateKeyDer::from_pem_slice(&body) {
            Ok(key) => key,
            Err(rustls::pki_types::pem::Error::NoItemsFound) => {
                return Err(CredentialLoadError::MissingPrivateKey { location });
            }
            Err(e) => {
                return Err(CredentialLoadError::InvalidPem {
                    location,
                    reason: e.to_string(),
                });
            }
        };
        if chain.is_empty() {
            return Err(CredentialLoadError::NoCertificates { location });
        }
        Ok(Some(Identity { chain, key }))
    }
}

impl fmt::Debug for StoreSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreSettings")
            .field("source", &self.source)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// A certificate chain with the private key of its leaf.
#[derive(Debug)]
pub struct Identity {
    pub chain: Vec<CertificateDer<'static>>,
    pub key: PrivateKeyDer<'static>,
}

fn is_blank(bytes: &[u8]) -> bool { bytes.iter().all(u8::is_ascii_whitespace) }

fn parse_certificates(
    body: &[u8],
    location: &str,
) -> Result<Vec<CertificateDer<'static>>, CredentialLoadError> {
    CertificateDer::pem_slice_iter(body)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CredentialLoadError::InvalidPem {
            location: location.to_owned(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls::seal_store;

    fn memory(bytes: &[u8]) -> StoreSettings {
        StoreSettings::new(CredentialSource::memory("test", bytes.to_vec()))
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let settings = StoreSettings::new(PathBuf::from("/nonexistent/trust.pem"));
        let err = settings
            .load_certificates()
            .expect_err("missing file must fail");
        assert!(matches!(err, CredentialLoadError::Read { .. }));
    }

    #[test]
    fn empty_trust_store_has_no_certificates() {
        let err = memory(b"").load_certificates().expect_err("empty store must fail");
        assert!(matches!(err, CredentialLoadError::NoCertificates { .. }));
    }

    #[test]
    fn empty_key_store_means_no_identity() {
        let identity = memory(b"\n  \n").load_identity().expect("empty key store loads");
        assert!(identity.is_none());
    }

    #[test]
    fn empty_key_store_ignores_its_password() {
        let identity = memory(b"")
            .password("changeit")
            .load_identity()
            .expect("empty key store loads");
        assert!(identity.is_none());
    }

    #[test]
    fn sealed_empty_key_store_means_no_identity() {
        let identity = memory(&seal_store(b"", "changeit"))
            .password("changeit")
            .load_identity()
            .expect("sealed empty key store loads");
        assert!(identity.is_none());
    }

    #[test]
    fn wrong_password_rejected_before_parsing() {
        let sealed = seal_store(b"not pem at all\n", "right");
        let err = memory(&sealed)
            .password("wrong")
            .load_certificates()
            .expect_err("wrong password must fail");
        assert!(matches!(err, CredentialLoadError::PasswordMismatch { .. }));
    }

    #[test]
    fn debug_redacts_password() {
        let rendered = format!("{:?}", memory(b"").password("secret"));
        assert!(!rendered.contains("secret"));
    }
}

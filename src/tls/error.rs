//! Errors raised while loading trust and key material.

use std::{io, path::PathBuf};

use thiserror::Error;

/// Trust or key material could not be loaded.
///
/// Every variant is fatal for the connection attempt that triggered the
/// load. Nothing is cached after a failure.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum CredentialLoadError {
    /// The store could not be read from its location.
    #[error("failed to read credential store {location}: {source}")]
    Read {
        /// File the store was read from.
        location: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The store seal did not match the configured password.
    #[error("credential store {location} failed its integrity check; wrong password?")]
    PasswordMismatch {
        /// Human-readable store location.
        location: String,
    },
    /// A password was configured but the store carries no seal.
    #[error("credential store {location} is not sealed but a password was configured")]
    MissingSeal {
        /// Human-readable store location.
        location: String,
    },
    /// The seal section was present but malformed.
    #[error("credential store {location} has a malformed seal")]
    MalformedSeal {
        /// Human-readable store location.
        location: String,
    },
    /// The PEM document could not be parsed.
    #[error("credential store {location} is not valid PEM: {reason}")]
    InvalidPem {
        /// Human-readable store location.
        location: String,
        /// Parser diagnostic.
        reason: String,
    },
    /// A trust store without any certificate.
    #[error("trust store {location} contains no certificates")]
    NoCertificates {
        /// Human-readable store location.
        location: String,
    },
    /// A key store with certificates but no private key.
    #[error("key store {location} contains no private key")]
    MissingPrivateKey {
        /// Human-readable store location.
        location: String,
    },
    /// A certificate was rejected as a trust anchor.
    #[error("trust store {location} holds an unusable certificate: {source}")]
    InvalidCertificate {
        /// Human-readable store location.
        location: String,
        #[source]
        source: rustls::Error,
    },
    /// The combined material was rejected by the TLS library.
    #[error("TLS configuration rejected: {0}")]
    Config(#[from] rustls::Error),
}

//! Error types for transport selection and connection.

use std::io;

use thiserror::Error;

use crate::tls::CredentialLoadError;

/// A channel to the broker could not be obtained.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum TransportError {
    /// The broker URI could not be parsed or lacks a host or port.
    #[error("invalid broker URI `{uri}`: {reason}")]
    InvalidUri {
        /// The rejected URI.
        uri: String,
        /// Why it was rejected.
        reason: String,
    },
    /// The URI scheme names no known transport.
    #[error("unsupported transport scheme `{0}`")]
    UnsupportedScheme(String),
    /// A secure URI was requested but no TLS settings are configured.
    #[error("secure transport requested for {0} but no TLS settings are configured")]
    SecureUnavailable(String),
    /// Trust or key material could not be loaded.
    #[error(transparent)]
    Credentials(#[from] CredentialLoadError),
    /// The TCP connection could not be established.
    #[error("failed to connect to {address}: {source}")]
    Connect {
        /// `host:port` that was dialled.
        address: String,
        #[source]
        source: io::Error,
    },
    /// The connect attempt exceeded the configured timeout.
    #[error("timed out connecting to {0}")]
    Timeout(String),
    /// The TLS handshake failed.
    #[error("TLS handshake with {address} failed: {source}")]
    Handshake {
        /// `host:port` of the peer.
        address: String,
        #[source]
        source: io::Error,
    },
    /// Any other I/O failure on an established channel.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
    /// The broker refused a subscription.
    #[error("broker refused subscription to `{queue}`: {reason}")]
    SubscriptionRefused {
        /// Queue that was requested.
        queue: String,
        /// Reason reported by the broker.
        reason: String,
    },
    /// The broker connection closed.
    #[error("broker connection closed")]
    Closed,
}

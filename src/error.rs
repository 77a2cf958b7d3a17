//! Top-level error type for starting a bridge.

use thiserror::Error;

use crate::{config::ConfigError, router::RouterError, transport::TransportError};

/// A [`crate::Bridge`] could not be started.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The broker connection could not be opened.
    #[error("broker unreachable: {0}")]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Router(#[from] RouterError),
}

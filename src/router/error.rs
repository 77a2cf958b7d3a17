use thiserror::Error;

use crate::{bus::BusError, destination::DestinationError, transport::TransportError};

/// A route could not be installed.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RouterError {
    /// One side of the route is not a valid destination name.
    #[error("invalid route destination: {0}")]
    Destination(#[from] DestinationError),
    /// The bus side must be a local request destination.
    #[error("`{0}` is not a local request destination")]
    NotLocal(String),
    /// The broker side must be a remote request destination.
    #[error("`{0}` is not a remote request destination")]
    NotRemote(String),
    /// Two routes share a local destination or a broker queue.
    #[error("`{0}` is routed more than once")]
    Duplicate(String),
    /// The forward listener could not be registered.
    #[error(transparent)]
    Bus(#[from] BusError),
    /// The reply queue could not be subscribed.
    #[error("failed to subscribe reply queue: {0}")]
    Subscribe(#[from] TransportError),
}

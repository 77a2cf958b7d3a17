//! Errors surfaced when a message cannot be handed to the broker.

use thiserror::Error;

use crate::transport::TransportError;

/// A send failed after the bridge accepted the message.
///
/// Retrying is the job of whoever sent the message on the local bus; the
/// bridge reports the failure and moves on.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// No channel to the broker could be obtained.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The broker refused the message.
    #[error("broker rejected message for `{destination}`: {reason}")]
    Rejected {
        /// Queue the message was addressed to.
        destination: String,
        /// Reason reported by the broker.
        reason: String,
    },
    /// The connection closed before the broker confirmed the send.
    #[error("broker connection lost before the send was confirmed")]
    ConnectionLost,
    /// A request without a correlation token under the strict policy.
    #[error("request on `{0}` carries no responseId")]
    MissingToken(String),
    /// The message could not be encoded for the wire.
    #[error("failed to encode message: {0}")]
    Encode(#[from] bincode::error::EncodeError),
}

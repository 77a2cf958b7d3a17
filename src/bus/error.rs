use std::error::Error as StdError;

use thiserror::Error;

/// Error type returned by a [`super::MessageListener`].
pub type ListenerError = Box<dyn StdError + Send + Sync>;

/// Failures reported by a [`super::LocalBus`].
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BusError {
    /// Nothing listens on the destination.
    #[error("no listener registered for `{0}`")]
    NoListener(String),
    /// The destination already has a listener.
    #[error("a listener is already registered for `{0}`")]
    ListenerExists(String),
    /// The listener received the message but failed to handle it.
    #[error("listener for `{destination}` failed: {source}")]
    Listener {
        destination: String,
        #[source]
        source: ListenerError,
    },
}

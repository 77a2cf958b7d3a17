//! The local message bus the bridge attaches to.
//!
//! Applications address local destinations by name; at most one
//! [`MessageListener`] receives each destination's messages.

mod error;
mod listener;
mod memory;

use std::sync::Arc;

use async_trait::async_trait;
pub use error::{BusError, ListenerError};
pub use listener::{ChannelListener, FnListener, MessageListener, from_fn};
pub use memory::InMemoryBus;

use crate::message::Message;

/// An in-process publish point for local destinations.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LocalBus: Send + Sync {
    /// Attach `listener` to `destination`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::ListenerExists`] if the destination is taken.
    fn register_listener(&self, destination: &str, listener: Arc<dyn MessageListener>) -> Result<(), BusError>;

    /// Detach the listener on `destination`; `false` if there was none.
    fn unregister_listener(&self, destination: &str) -> bool;

    /// Deliver `message` to the listener on `destination` and wait for it to
    /// be handled.
    async fn send(&self, destination: &str, message: Message) -> Result<(), BusError>;
}

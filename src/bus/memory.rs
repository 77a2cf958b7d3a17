use std::sync::Arc;

use async_trait::async_trait;
use dashmap::{DashMap, mapref::entry::Entry};
use tracing::trace;

use super::{BusError, LocalBus, MessageListener};
use crate::message::Message;

/// Local bus dispatching directly to listeners in the sender's task.
#[derive(Default)]
pub struct InMemoryBus {
    listeners: DashMap<String, Arc<dyn MessageListener>>,
}

impl InMemoryBus {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Whether `destination` currently has a listener.
    #[must_use]
    pub fn has_listener(&self, destination: &str) -> bool { self.listeners.contains_key(destination) }
}

#[async_trait]
impl LocalBus for InMemoryBus {
    fn register_listener(&self, destination: &str, listener: Arc<dyn MessageListener>) -> Result<(), BusError> {
        match self.listeners.entry(destination.to_owned()) {
            Entry::Occupied(_) => Err(BusError::ListenerExists(destination.to_owned())),
            Entry::Vacant(slot) => {
                slot.insert(listener);
                trace!(%destination, "listener registered");
                Ok(())
            }
        }
    }

    fn unregister_listener(&self, destination: &str) -> bool { self.listeners.remove(destination).is_some() }

    async fn send(&self, destination: &str, mut message: Message) -> Result<(), BusError> {
        // Clone the listener out so no map guard is held across the await.
        let listener = self
            .listeners
            .get(destination)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| BusError::NoListener(destination.to_owned()))?;
        message.set_destination(destination);
        listener
            .receive(message)
            .await
            .map_err(|source| BusError::Listener {
                destination: destination.to_owned(),
                source,
            })
    }
}

impl std::fmt::Debug for InMemoryBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

//! In-process queue broker.
//!
//! Queues are created on first use. Messages sent before anyone subscribes
//! wait in the queue; several subscriptions on one queue compete for its
//! messages, each message going to exactly one of them.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::{
    sync::{Mutex, mpsc},
    time::Instant,
};
use tracing::debug;

use super::{
    BrokerMessage,
    DeliveryError,
    RemoteBroker,
    Subscription,
    subscription::{Queued, SharedReceiver},
};
use crate::transport::TransportError;

struct Queue {
    tx: mpsc::UnboundedSender<Queued>,
    rx: SharedReceiver,
}

impl Queue {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }
}

/// Broker keeping every queue in memory.
///
/// # Examples
///
/// ```
/// use busbridge::broker::{BrokerMessage, MemoryBroker, RemoteBroker};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let broker = MemoryBroker::new();
/// broker.send(BrokerMessage::new("orders", "hello")).await?;
/// let mut orders = broker.subscribe("orders").await?;
/// let message = orders.next().await.expect("queued message");
/// assert_eq!(message.payload, b"hello");
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct MemoryBroker {
    queues: DashMap<String, Queue>,
}

impl MemoryBroker {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Number of queues created so far.
    #[must_use]
    pub fn queue_count(&self) -> usize { self.queues.len() }

    /// Messages waiting on `queue`; zero for queues never used.
    ///
    /// Returns `None` while a subscriber is receiving from the queue.
    #[must_use]
    pub fn depth(&self, queue: &str) -> Option<usize> {
        match self.queues.get(queue) {
            Some(entry) => entry.rx.try_lock().ok().map(|rx| rx.len()),
            None => Some(0),
        }
    }

    fn receiver(&self, queue: &str) -> SharedReceiver {
        let entry = self.queues.entry(queue.to_owned()).or_insert_with(Queue::new);
        Arc::clone(&entry.rx)
    }

    pub(crate) fn enqueue(&self, message: BrokerMessage) -> Result<(), DeliveryError> {
        if message.destination.is_empty() {
            return Err(DeliveryError::Rejected {
                destination: message.destination,
                reason: "queue name must not be empty".into(),
            });
        }
        let expires_at = message.qos.time_to_live.map(|ttl| Instant::now() + ttl);
        let entry = self
            .queues
            .entry(message.destination.clone())
            .or_insert_with(Queue::new);
        debug!(queue = %message.destination, "message enqueued");
        // The queue owns its receiver, so the channel cannot be closed here.
        entry
            .tx
            .send(Queued {
                message,
                expires_at,
            })
            .map_err(|e| DeliveryError::Rejected {
                destination: e.0.message.destination,
                reason: "queue closed".into(),
            })
    }
}

impl fmt::Debug for MemoryBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBroker")
            .field("queues", &self.queues.len())
            .finish()
    }
}

#[async_trait]
impl RemoteBroker for MemoryBroker {
    async fn send(&self, message: BrokerMessage) -> Result<(), DeliveryError> { self.enqueue(message) }

    async fn subscribe(&self, queue: &str) -> Result<Subscription, TransportError> {
        if queue.is_empty() {
            return Err(TransportError::SubscriptionRefused {
                queue: queue.to_owned(),
                reason: "queue name must not be empty".into(),
            });
        }
        Ok(Subscription::from_queue(queue, self.receiver(queue)))
    }
}

//! The remote side of the bridge.
//!
//! [`RemoteBroker`] is the seam the router talks to. [`BrokerClient`] speaks
//! the framed protocol to a [`BrokerServer`] over a channel obtained from the
//! [`TransportSelector`](crate::transport::TransportSelector);
//! [`MemoryBroker`] keeps queues in process and backs the server.

mod client;
mod error;
mod frame;
mod memory;
mod message;
mod server;
mod subscription;

use async_trait::async_trait;
pub use client::BrokerClient;
pub use error::DeliveryError;
pub use frame::Frame;
pub use memory::MemoryBroker;
pub use message::{BrokerMessage, PERSISTENT_HEADER, PRIORITY_HEADER, Qos, TIME_TO_LIVE_HEADER};
pub use server::{BackoffConfig, BrokerServer};
pub use subscription::Subscription;

use crate::transport::TransportError;

/// Operations the router needs from a queue broker.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteBroker: Send + Sync {
    /// Enqueue `message` on its destination queue.
    ///
    /// Resolves once the broker has accepted the message.
    async fn send(&self, message: BrokerMessage) -> Result<(), DeliveryError>;

    /// Start consuming `queue`.
    async fn subscribe(&self, queue: &str) -> Result<Subscription, TransportError>;
}

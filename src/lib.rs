#![doc(html_root_url = "https://docs.rs/busbridge/latest")]
//! Public API for the `busbridge` library.
//!
//! `busbridge` relays request/reply traffic between an in-process message
//! bus and a remote queue broker. Requests carry their correlation token in
//! the `responseId` header; the bridge moves it into the broker's native
//! correlation field on the way out and back into the header on the way in.
//! Broker connections run over plain TCP or TLS, chosen by the URI scheme.

pub mod broker;
mod bridge;
pub mod bus;
pub mod config;
pub mod correlation;
pub mod destination;
pub mod error;
pub mod message;
pub mod metrics;
pub mod router;
pub mod tls;
pub mod transport;

pub use bridge::Bridge;
pub use config::{BridgeConfig, ConfigError};
pub use correlation::CorrelatableFrame;
pub use destination::{Destination, DestinationScheme};
pub use error::BridgeError;
pub use message::{Message, RESPONSE_ID_HEADER};
pub use router::{CorrelationPolicy, CorrelationRouter, MissingTokenPolicy, Route, RouterConfig, RouterHandle};

//! Transport selection for broker connections.
//!
//! A [`BrokerUri`] names the transport through its scheme. The
//! [`TransportSelector`] hands plain schemes to a [`PlainConnector`] and
//! secure ones to a [`SecureConnector`], which draws its TLS context from a
//! shared [`crate::tls::TlsContextCell`].

mod connector;
mod error;
mod selector;
mod uri;

pub use connector::{
    Channel,
    ChannelStream,
    ConnectOptions,
    Connector,
    PlainConnector,
    SecureConnector,
};
pub use error::TransportError;
pub use selector::TransportSelector;
pub use uri::{BrokerUri, Scheme};

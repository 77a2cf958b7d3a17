//! Secure transport material for broker connections.
//!
//! Loading happens in three layers: [`StoreSettings`] reads and verifies a
//! single PEM store, [`TlsContextBuilder`] combines the trust and key
//! stores into a [`SecureTransportContext`], and [`TlsContextCell`] builds
//! that context once and shares it with every connection.

mod cell;
mod context;
mod error;
mod seal;
mod server;
mod store;

pub use cell::TlsContextCell;
#[cfg(test)]
pub(crate) use context::MockContextSource;
pub use context::{ContextSource, SecureTransportContext, TlsContextBuilder, TlsSettings};
pub use error::CredentialLoadError;
pub use seal::seal_store;
pub use server::server_config;
pub use store::{CredentialSource, Identity, StoreSettings};

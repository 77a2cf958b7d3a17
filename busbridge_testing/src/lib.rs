//! Helpers for exercising `busbridge` end to end.
//!
//! [`TestBroker`] runs a real broker server on a loopback port,
//! [`TlsFixture`] mints a throwaway CA with sealed stores for it, and
//! [`spawn_uppercase_responder`] plays the remote service answering
//! requests.
//!
//! ```no_run
//! use busbridge_testing::{TestBroker, TlsFixture};
//!
//! # async fn example() -> busbridge_testing::TestResult {
//! let tls = TlsFixture::generate()?;
//! let broker = TestBroker::spawn_tls(tls.server_config()?).await?;
//! assert!(broker.url().starts_with("ssl://"));
//! broker.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod broker;
pub mod logging;
pub mod tls;

pub use broker::{TestBroker, spawn_uppercase_responder};
pub use logging::{LoggerHandle, logger};
pub use tls::{FixtureError, STORE_PASSWORD, TlsFixture};

/// Result type for tests that propagate any error with `?`.
pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

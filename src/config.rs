//! Bridge configuration loaded from TOML.
//!
//! ```toml
//! broker_url = "ssl://broker.example.com:61617"
//! connect_timeout_ms = 5000
//!
//! [[routes]]
//! bus = "orders"
//! broker = "orders.v1"   # defaults to the bus name
//!
//! [tls]
//! trust_store = "/etc/busbridge/trust.pem"
//! trust_store_password = "changeit"
//! key_store = "/etc/busbridge/client.pem"
//! key_store_password = "changeit"
//!
//! [correlation]
//! policy = "tracked"     # or "stateless"
//! timeout_ms = 30000
//! missing_token = "reject"   # or "forward-empty"
//! preserve_qos = true
//! ```

use std::{
    fs,
    io,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use thiserror::Error;

use crate::{
    destination::Destination,
    router::{CorrelationPolicy, MissingTokenPolicy, Route, RouterConfig, RouterError, ensure_distinct},
    tls::{StoreSettings, TlsSettings},
    transport::{BrokerUri, ConnectOptions, TransportError},
};

const DEFAULT_TRACKING_TIMEOUT_MS: u64 = 30_000;

/// Errors raised while loading a [`BridgeConfig`].
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error(transparent)]
    BrokerUri(#[from] TransportError),
    #[error(transparent)]
    Route(#[from] RouterError),
    #[error("no routes configured")]
    NoRoutes,
    #[error("broker URI `{0}` requires TLS but no [tls] section is configured")]
    MissingTls(String),
}

/// One `[[routes]]` entry.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RouteConfig {
    /// Local request destination.
    pub bus: String,
    /// Broker queue; the bus name when omitted.
    #[serde(default)]
    pub broker: Option<String>,
}

/// The `[tls]` section. Paths point at PEM stores, optionally sealed.
#[derive(Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TlsConfig {
    pub trust_store: PathBuf,
    #[serde(default)]
    pub trust_store_password: Option<String>,
    #[serde(default)]
    pub key_store: Option<PathBuf>,
    #[serde(default)]
    pub key_store_password: Option<String>,
}

impl std::fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConfig")
            .field("trust_store", &self.trust_store)
            .field("key_store", &self.key_store)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    #[default]
    Stateless,
    Tracked,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum MissingTokenKind {
    #[default]
    ForwardEmpty,
    Reject,
}

/// The `[correlation]` section.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct CorrelationConfig {
    pub policy: PolicyKind,
    /// Age after which a tracked request is reported as orphaned.
    pub timeout_ms: u64,
    pub missing_token: MissingTokenKind,
    pub preserve_qos: bool,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            policy: PolicyKind::default(),
            timeout_ms: DEFAULT_TRACKING_TIMEOUT_MS,
            missing_token: MissingTokenKind::default(),
            preserve_qos: true,
        }
    }
}

/// Everything needed to start a [`crate::Bridge`].
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    pub broker_url: String,
    #[serde(default)]
    pub connect_timeout_ms: Option<u64>,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
    #[serde(default)]
    pub tls: Option<TlsConfig>,
    #[serde(default)]
    pub correlation: CorrelationConfig,
}

impl BridgeConfig {
    /// Parse and validate a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the document is malformed, names an invalid
    /// broker URI or route, or asks for TLS without a `[tls]` section.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate the file at `path`.
    ///
    /// # Errors
    ///
    /// See [`BridgeConfig::from_toml_str`]; unreadable files yield
    /// [`ConfigError::Read`].
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let uri = self.broker_uri()?;
        if uri.scheme().is_secure() && self.tls.is_none() {
            return Err(ConfigError::MissingTls(uri.to_string()));
        }
        if self.routes.is_empty() {
            return Err(ConfigError::NoRoutes);
        }
        self.routes()?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns a [`TransportError`] if `broker_url` is not a broker URI.
    pub fn broker_uri(&self) -> Result<BrokerUri, TransportError> { self.broker_url.parse() }

    #[must_use]
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions::default().timeout(self.connect_timeout_ms.map(Duration::from_millis))
    }

    /// Credential settings for the secure transport, if configured.
    #[must_use]
    pub fn tls_settings(&self) -> Option<TlsSettings> {
        let tls = self.tls.as_ref()?;
        let mut settings = TlsSettings::new(store(&tls.trust_store, tls.trust_store_password.as_deref()));
        if let Some(key_store) = &tls.key_store {
            settings = settings.key_store(store(key_store, tls.key_store_password.as_deref()));
        }
        Some(settings)
    }

    #[must_use]
    pub fn router_config(&self) -> RouterConfig {
        let correlation = match self.correlation.policy {
            PolicyKind::Stateless => CorrelationPolicy::Stateless,
            PolicyKind::Tracked => CorrelationPolicy::Tracked {
                timeout: Duration::from_millis(self.correlation.timeout_ms),
            },
        };
        let missing_token = match self.correlation.missing_token {
            MissingTokenKind::ForwardEmpty => MissingTokenPolicy::ForwardEmpty,
            MissingTokenKind::Reject => MissingTokenPolicy::Reject,
        };
        RouterConfig::default()
            .correlation(correlation)
            .missing_token(missing_token)
            .preserve_qos(self.correlation.preserve_qos)
    }

    /// The configured routes, with broker sides marked secure when the broker
    /// URI is.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the URI or a route name is invalid, or if
    /// two routes share a local destination or a broker queue.
    pub fn routes(&self) -> Result<Vec<Route>, ConfigError> {
        let secure = self.broker_uri()?.scheme().is_secure();
        let routes = self
            .routes
            .iter()
            .map(|r| -> Result<Route, ConfigError> {
                let bus = Destination::local(&r.bus).map_err(RouterError::from)?;
                let queue = r.broker.as_deref().unwrap_or(&r.bus);
                let broker = Destination::remote(queue, secure).map_err(RouterError::from)?;
                Ok(Route::between(bus, broker)?)
            })
            .collect::<Result<Vec<_>, _>>()?;
        ensure_distinct(&routes)?;
        Ok(routes)
    }
}

fn store(path: &Path, password: Option<&str>) -> StoreSettings {
    let settings = StoreSettings::new(path.to_path_buf());
    match password {
        Some(password) => settings.password(password),
        None => settings,
    }
}

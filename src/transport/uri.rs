//! Broker URI parsing.

use std::{fmt, str::FromStr};

use url::{Host, Url};

use super::TransportError;

/// Transport named by a broker URI scheme.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// Plain TCP (`tcp://`, `nio://`).
    Tcp,
    /// TLS over TCP (`ssl://`, `tls://`).
    Ssl,
}

impl Scheme {
    fn parse(scheme: &str) -> Option<Self> {
        match scheme {
            "tcp" | "nio" => Some(Self::Tcp),
            "ssl" | "tls" => Some(Self::Ssl),
            _ => None,
        }
    }

    /// Whether connections must negotiate TLS.
    #[must_use]
    pub fn is_secure(self) -> bool { matches!(self, Self::Ssl) }
}

/// A parsed broker address such as `ssl://broker.example:61617`.
///
/// # Examples
///
/// ```
/// use busbridge::transport::{BrokerUri, Scheme};
///
/// let uri: BrokerUri = "ssl://broker.example:61617".parse().expect("valid URI");
/// assert_eq!(uri.scheme(), Scheme::Ssl);
/// assert_eq!(uri.address(), "broker.example:61617");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BrokerUri {
    scheme: Scheme,
    host: String,
    port: u16,
    raw: String,
}

impl BrokerUri {
    #[must_use]
    pub fn scheme(&self) -> Scheme { self.scheme }

    /// Host name or IP literal, without IPv6 brackets.
    #[must_use]
    pub fn host(&self) -> &str { &self.host }

    #[must_use]
    pub fn port(&self) -> u16 { self.port }

    /// `host:port`, suitable for diagnostics.
    #[must_use]
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for BrokerUri {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| TransportError::InvalidUri {
            uri: s.to_owned(),
            reason: reason.to_owned(),
        };
        let url = Url::parse(s).map_err(|e| invalid(&e.to_string()))?;
        let scheme = Scheme::parse(url.scheme())
            .ok_or_else(|| TransportError::UnsupportedScheme(url.scheme().to_owned()))?;
        let host = match url.host() {
            Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_owned(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            _ => return Err(invalid("missing host")),
        };
        let port = url.port().ok_or_else(|| invalid("missing port"))?;
        Ok(Self {
            scheme,
            host,
            port,
            raw: s.to_owned(),
        })
    }
}

impl fmt::Display for BrokerUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.raw) }
}

//! Logical destination addresses and the request/reply pairing convention.
//!
//! Every request destination `<base>` has exactly one reply destination
//! `<base>.REPLY`, on the local bus and on the broker alike. The pairing is
//! fixed; callers cannot choose a different reply channel per message.

use std::{fmt, str::FromStr};

use thiserror::Error;

/// Suffix marking a reply channel.
pub const REPLY_SUFFIX: &str = ".REPLY";

/// Where a destination lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DestinationScheme {
    /// The in-process local bus.
    Local,
    /// A broker queue reached over a TLS-secured transport.
    SecureRemote,
    /// A broker queue reached over a plain transport.
    PlainRemote,
}

impl DestinationScheme {
    fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::SecureRemote => "secure-remote",
            Self::PlainRemote => "plain-remote",
        }
    }

    /// Whether the destination lives on the broker.
    #[must_use]
    pub fn is_remote(self) -> bool { !matches!(self, Self::Local) }
}

/// Errors returned when parsing a destination.
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DestinationError {
    /// The base name was empty.
    #[error("destination name must not be empty")]
    Empty,
    /// The scheme prefix was not recognised.
    #[error("unknown destination scheme `{0}`")]
    UnknownScheme(String),
    /// The name carried the reply suffix more than once.
    #[error("destination `{0}` repeats the reply suffix")]
    NestedReply(String),
}

/// A logical address on the local bus or the broker.
///
/// # Examples
///
/// ```
/// use busbridge::destination::Destination;
///
/// let orders: Destination = "plain-remote:orders".parse().expect("valid destination");
/// assert_eq!(orders.reply().name(), "orders.REPLY");
/// assert_eq!(orders.reply().request(), orders);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Destination {
    scheme: DestinationScheme,
    base: String,
    reply: bool,
}

impl Destination {
    /// Build a request destination, or a reply one when `name` ends in
    /// `.REPLY`.
    ///
    /// # Errors
    ///
    /// Returns [`DestinationError`] if the base name is empty or repeats the
    /// reply suffix.
    pub fn new(scheme: DestinationScheme, name: &str) -> Result<Self, DestinationError> {
        let (base, reply) = match name.strip_suffix(REPLY_SUFFIX) {
            Some(base) => (base, true),
            None => (name, false),
        };
        if base.is_empty() {
            return Err(DestinationError::Empty);
        }
        if base.ends_with(REPLY_SUFFIX) {
            return Err(DestinationError::NestedReply(name.to_owned()));
        }
        Ok(Self {
            scheme,
            base: base.to_owned(),
            reply,
        })
    }

    /// Shorthand for a local bus destination.
    ///
    /// # Errors
    ///
    /// See [`Destination::new`].
    pub fn local(name: &str) -> Result<Self, DestinationError> {
        Self::new(DestinationScheme::Local, name)
    }

    /// Shorthand for a broker destination with the given security.
    ///
    /// # Errors
    ///
    /// See [`Destination::new`].
    pub fn remote(name: &str, secure: bool) -> Result<Self, DestinationError> {
        let scheme = if secure {
            DestinationScheme::SecureRemote
        } else {
            DestinationScheme::PlainRemote
        };
        Self::new(scheme, name)
    }

    #[must_use]
    pub fn scheme(&self) -> DestinationScheme { self.scheme }

    /// Base name without the reply suffix.
    #[must_use]
    pub fn base(&self) -> &str { &self.base }

    #[must_use]
    pub fn is_reply(&self) -> bool { self.reply }

    /// Name as used on the wire: `<base>` or `<base>.REPLY`.
    #[must_use]
    pub fn name(&self) -> String {
        if self.reply {
            format!("{}{REPLY_SUFFIX}", self.base)
        } else {
            self.base.clone()
        }
    }

    /// The reply channel paired with this destination.
    ///
    /// The reply of a reply destination is the destination itself.
    #[must_use]
    pub fn reply(&self) -> Self {
        Self {
            reply: true,
            ..self.clone()
        }
    }

    /// The request channel paired with this destination.
    #[must_use]
    pub fn request(&self) -> Self {
        Self {
            reply: false,
            ..self.clone()
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scheme.as_str(), self.name())
    }
}

impl FromStr for Destination {
    type Err = DestinationError;

    /// Parse `scheme:name`; a name without a scheme is a local destination.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((scheme, name)) = s.split_once(':') else {
            return Self::local(s);
        };
        let scheme = match scheme {
            "local" => DestinationScheme::Local,
            "secure-remote" => DestinationScheme::SecureRemote,
            "plain-remote" => DestinationScheme::PlainRemote,
            other => return Err(DestinationError::UnknownScheme(other.to_owned())),
        };
        Self::new(scheme, name)
    }
}

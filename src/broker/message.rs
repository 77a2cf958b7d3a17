//! Messages as the broker sees them.

use std::{collections::BTreeMap, time::Duration};

use bincode::{Decode, Encode};

use crate::correlation::CorrelatableFrame;

/// Header carrying the JMS-style priority of a local message.
pub const PRIORITY_HEADER: &str = "priority";
/// Header carrying the delivery mode of a local message.
pub const PERSISTENT_HEADER: &str = "persistent";
/// Header carrying the time-to-live, in milliseconds, of a local message.
pub const TIME_TO_LIVE_HEADER: &str = "timeToLive";

const MAX_PRIORITY: u8 = 9;

/// Quality-of-service attributes preserved across the bridge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Encode, Decode)]
pub struct Qos {
    /// Priority from 0 (lowest) to 9 (highest).
    pub priority: u8,
    /// Whether the broker should persist the message.
    pub persistent: bool,
    /// How long the message stays deliverable; `None` for forever.
    pub time_to_live: Option<Duration>,
}

impl Default for Qos {
    fn default() -> Self {
        Self {
            priority: 4,
            persistent: true,
            time_to_live: None,
        }
    }
}

impl Qos {
    /// Read QoS attributes from local message headers.
    ///
    /// Missing or unparsable headers keep their defaults; priorities above 9
    /// are clamped and a time-to-live of zero means forever.
    #[must_use]
    pub fn from_headers(headers: &BTreeMap<String, String>) -> Self {
        let mut qos = Self::default();
        if let Some(priority) = headers.get(PRIORITY_HEADER).and_then(|p| p.parse::<u8>().ok()) {
            qos.priority = priority.min(MAX_PRIORITY);
        }
        if let Some(persistent) = headers
            .get(PERSISTENT_HEADER)
            .and_then(|p| p.parse::<bool>().ok())
        {
            qos.persistent = persistent;
        }
        if let Some(ttl) = headers
            .get(TIME_TO_LIVE_HEADER)
            .and_then(|t| t.parse::<u64>().ok())
        {
            qos.time_to_live = (ttl > 0).then(|| Duration::from_millis(ttl));
        }
        qos
    }

    /// Whether `name` is one of the headers consumed by [`Qos::from_headers`].
    #[must_use]
    pub fn is_qos_header(name: &str) -> bool {
        matches!(name, PRIORITY_HEADER | PERSISTENT_HEADER | TIME_TO_LIVE_HEADER)
    }
}

/// A message on a broker queue.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct BrokerMessage {
    /// Queue the message is addressed to.
    pub destination: String,
    pub payload: Vec<u8>,
    /// Native correlation identifier.
    pub correlation_id: Option<String>,
    /// Queue the receiver should answer on.
    pub reply_to: Option<String>,
    pub qos: Qos,
    /// Application properties; local headers travel here.
    pub properties: BTreeMap<String, String>,
}

impl BrokerMessage {
    /// Message for `destination` with default QoS and no correlation.
    #[must_use]
    pub fn new(destination: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            destination: destination.into(),
            payload: payload.into(),
            correlation_id: None,
            reply_to: None,
            qos: Qos::default(),
            properties: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    #[must_use]
    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    #[must_use]
    pub fn with_qos(mut self, qos: Qos) -> Self {
        self.qos = qos;
        self
    }

    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Build the answer to this message: addressed to its reply-to queue and
    /// carrying the same correlation identifier.
    ///
    /// Returns `None` when the message names no reply-to queue.
    #[must_use]
    pub fn reply(&self, payload: impl Into<Vec<u8>>) -> Option<Self> {
        let reply_to = self.reply_to.as_ref()?;
        let mut reply = Self::new(reply_to.clone(), payload);
        reply.correlation_id.clone_from(&self.correlation_id);
        Some(reply)
    }
}

impl CorrelatableFrame for BrokerMessage {
    fn correlation_id(&self) -> Option<&str> { self.correlation_id.as_deref() }

    fn set_correlation_id(&mut self, correlation_id: Option<String>) {
        self.correlation_id = correlation_id;
    }
}

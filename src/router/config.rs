use std::time::Duration;

/// Whether the router remembers requests awaiting a reply.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CorrelationPolicy {
    /// Keep no state; every reply is relayed as it arrives.
    #[default]
    Stateless,
    /// Remember forwarded tokens and report requests left unanswered for
    /// longer than `timeout`.
    Tracked { timeout: Duration },
}

/// What to do with messages that carry no correlation token.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MissingTokenPolicy {
    /// Relay them with the empty token.
    #[default]
    ForwardEmpty,
    /// Refuse requests and drop replies.
    Reject,
}

/// Behaviour shared by every route a router installs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RouterConfig {
    pub correlation: CorrelationPolicy,
    pub missing_token: MissingTokenPolicy,
    /// Map the `priority`, `persistent` and `timeToLive` headers onto broker
    /// QoS instead of passing them through as properties.
    pub preserve_qos: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            correlation: CorrelationPolicy::default(),
            missing_token: MissingTokenPolicy::default(),
            preserve_qos: true,
        }
    }
}

impl RouterConfig {
    #[must_use]
    pub fn correlation(mut self, policy: CorrelationPolicy) -> Self {
        self.correlation = policy;
        self
    }

    #[must_use]
    pub fn missing_token(mut self, policy: MissingTokenPolicy) -> Self {
        self.missing_token = policy;
        self
    }

    #[must_use]
    pub fn preserve_qos(mut self, enabled: bool) -> Self {
        self.preserve_qos = enabled;
        self
    }

    pub(crate) fn rejects_missing_tokens(&self) -> bool {
        matches!(self.missing_token, MissingTokenPolicy::Reject)
    }
}

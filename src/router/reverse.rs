//! Broker reply to local message.

use std::sync::Arc;

use bytes::Bytes;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{PendingReplies, Route, RouterConfig};
use crate::{
    broker::{BrokerMessage, Subscription},
    bus::LocalBus,
    correlation::{CorrelatableFrame, copy_correlation},
    message::Message,
    metrics::{self, Direction},
};

/// Consumer of the broker reply queue of one route.
pub(crate) struct ReverseRoute {
    queue: String,
    destination: String,
    bus: Arc<dyn LocalBus>,
    config: RouterConfig,
    pending: Option<Arc<PendingReplies>>,
}

impl ReverseRoute {
    pub(crate) fn new(
        route: &Route,
        bus: Arc<dyn LocalBus>,
        config: RouterConfig,
        pending: Option<Arc<PendingReplies>>,
    ) -> Self {
        Self {
            queue: route.broker_request(),
            destination: route.bus_reply(),
            bus,
            config,
            pending,
        }
    }

    /// Build the local message for a broker reply.
    ///
    /// The reply's own reply-to field is ignored. Returns `None` when the
    /// reply carries no correlation identifier and such replies are rejected.
    pub(crate) fn translate(&self, mut reply: BrokerMessage) -> Option<Message> {
        if reply.correlation_id.is_none() && self.config.rejects_missing_tokens() {
            return None;
        }
        let payload = Bytes::from(std::mem::take(&mut reply.payload));
        let mut local = Message::new(payload).with_headers(std::mem::take(&mut reply.properties));
        copy_correlation(&reply, &mut local);
        Some(local)
    }

    async fn deliver(&self, reply: BrokerMessage) {
        let Some(local) = self.translate(reply) else {
            warn!(queue = %self.queue, "dropping reply without correlation id");
            metrics::inc_errors(&self.queue, Direction::Reverse);
            return;
        };
        let token = local.correlation_id().unwrap_or_default().to_owned();
        let known = self.pending.as_ref().is_none_or(|pending| pending.complete(&token));
        if !known {
            debug!(queue = %self.queue, %token, "reply for unknown correlation token");
        }
        match self.bus.send(&self.destination, local).await {
            Ok(()) => {
                debug!(destination = %self.destination, %token, "reply delivered");
                metrics::inc_replies(&self.queue);
            }
            Err(e) => {
                warn!(destination = %self.destination, %token, error = %e, "reply not delivered locally");
                metrics::inc_errors(&self.queue, Direction::Reverse);
            }
        }
    }

    /// Relay replies until `shutdown` fires or the subscription ends.
    #[expect(
        clippy::integer_division_remainder_used,
        reason = "tokio::select! expands to modulus internally"
    )]
    pub(crate) async fn run(self, mut replies: Subscription, shutdown: CancellationToken) {
        loop {
            select! {
                biased;

                () = shutdown.cancelled() => break,
                next = replies.next() => match next {
                    Some(reply) => self.deliver(reply).await,
                    None => {
                        warn!(queue = %replies.queue(), "reply subscription ended");
                        break;
                    }
                },
            }
        }
    }
}

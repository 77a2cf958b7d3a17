//! Local request to broker message.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{PendingReplies, Route, RouterConfig};
use crate::{
    broker::{BrokerMessage, DeliveryError, Qos, RemoteBroker},
    bus::{ListenerError, MessageListener},
    correlation::{CorrelatableFrame, copy_correlation},
    message::{Message, RESPONSE_ID_HEADER},
    metrics::{self, Direction},
};

/// Listener on the local request destination of one route.
pub(crate) struct ForwardRoute {
    queue: String,
    reply_to: String,
    broker: Arc<dyn RemoteBroker>,
    config: RouterConfig,
    pending: Option<Arc<PendingReplies>>,
}

impl ForwardRoute {
    pub(crate) fn new(
        route: &Route,
        broker: Arc<dyn RemoteBroker>,
        config: RouterConfig,
        pending: Option<Arc<PendingReplies>>,
    ) -> Self {
        Self {
            queue: route.broker_request(),
            reply_to: route.broker_reply(),
            broker,
            config,
            pending,
        }
    }

    /// Build the broker message for a local request.
    pub(crate) fn translate(&self, message: &Message) -> Result<BrokerMessage, DeliveryError> {
        if message.response_id().is_none() && self.config.rejects_missing_tokens() {
            return Err(DeliveryError::MissingToken(message.destination().to_owned()));
        }
        let mut outbound = BrokerMessage::new(self.queue.clone(), message.payload().to_vec())
            .with_reply_to(self.reply_to.clone());
        copy_correlation(message, &mut outbound);
        if self.config.preserve_qos {
            outbound.qos = Qos::from_headers(message.headers());
        }
        outbound.properties = message
            .headers()
            .iter()
            .filter(|(name, _)| name.as_str() != RESPONSE_ID_HEADER)
            .filter(|(name, _)| !(self.config.preserve_qos && Qos::is_qos_header(name)))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        Ok(outbound)
    }

    async fn forward(&self, message: Message) -> Result<(), DeliveryError> {
        let outbound = self.translate(&message).inspect_err(|e| {
            warn!(queue = %self.queue, error = %e, "request refused");
            metrics::inc_errors(&self.queue, Direction::Forward);
        })?;
        let token = outbound.correlation_id().unwrap_or_default().to_owned();
        if let Some(pending) = &self.pending {
            pending.insert(&token);
        }
        match self.broker.send(outbound).await {
            Ok(()) => {
                debug!(queue = %self.queue, %token, "request forwarded");
                metrics::inc_forwarded(&self.queue);
                Ok(())
            }
            Err(e) => {
                if let Some(pending) = &self.pending {
                    pending.complete(&token);
                }
                warn!(queue = %self.queue, %token, error = %e, "request not delivered to broker");
                metrics::inc_errors(&self.queue, Direction::Forward);
                Err(e)
            }
        }
    }
}

#[async_trait]
impl MessageListener for ForwardRoute {
    async fn receive(&self, message: Message) -> Result<(), ListenerError> {
        self.forward(message).await.map_err(Into::into)
    }
}

//! Unit tests for route installation and message translation.

use std::{sync::Arc, time::Duration};

use rstest::{fixture, rstest};
use tokio::{sync::mpsc, time::timeout};
use tracing_test::traced_test;

use super::*;
use crate::{
    broker::{BrokerMessage, DeliveryError, MemoryBroker, MockRemoteBroker, Qos, Subscription},
    bus::{BusError, ChannelListener, InMemoryBus},
    message::Message,
};

const WAIT: Duration = Duration::from_secs(1);

struct Harness {
    bus: Arc<InMemoryBus>,
    broker: Arc<MemoryBroker>,
}

impl Harness {
    fn router(&self, config: RouterConfig) -> CorrelationRouter {
        CorrelationRouter::new(self.bus.clone(), self.broker.clone()).with_config(config)
    }

    fn reply_listener(&self, destination: &str) -> mpsc::UnboundedReceiver<Message> {
        let (listener, rx) = ChannelListener::new();
        self.bus
            .register_listener(destination, Arc::new(listener))
            .expect("register reply listener");
        rx
    }

    async fn next_request(&self, queue: &str) -> BrokerMessage {
        let mut sub = self.broker.subscribe(queue).await.expect("subscribe");
        timeout(WAIT, sub.next())
            .await
            .expect("request arrives in time")
            .expect("request queued")
    }
}

#[fixture]
fn harness() -> Harness {
    Harness {
        bus: Arc::new(InMemoryBus::new()),
        broker: Arc::new(MemoryBroker::new()),
    }
}

fn orders() -> Route { Route::symmetric("orders").expect("valid route") }

fn closed_subscription(queue: &str) -> Subscription {
    let (_tx, rx) = mpsc::unbounded_channel();
    Subscription::from_remote(queue, rx)
}

#[rstest]
#[tokio::test]
async fn forward_tags_request_with_token_and_reply_queue(harness: Harness) {
    let handle = harness
        .router(RouterConfig::default())
        .install(orders())
        .await
        .expect("install");

    let request = Message::new("hello")
        .with_response_id("abc-123")
        .with_header("priority", "7")
        .with_header("tenant", "acme");
    harness
        .bus
        .send("orders", request)
        .await
        .expect("forwarded");

    let sent = harness.next_request("orders").await;
    assert_eq!(sent.payload, b"hello");
    assert_eq!(sent.correlation_id.as_deref(), Some("abc-123"));
    assert_eq!(sent.reply_to.as_deref(), Some("orders.REPLY"));
    assert_eq!(sent.qos.priority, 7);
    assert_eq!(sent.properties.len(), 1);
    assert_eq!(sent.properties.get("tenant").map(String::as_str), Some("acme"));
    handle.shutdown().await;
}

#[rstest]
#[tokio::test]
async fn missing_token_is_forwarded_as_empty(harness: Harness) {
    let handle = harness
        .router(RouterConfig::default())
        .install(orders())
        .await
        .expect("install");

    harness
        .bus
        .send("orders", Message::new("hello"))
        .await
        .expect("forwarded");

    let sent = harness.next_request("orders").await;
    assert_eq!(sent.correlation_id.as_deref(), Some(""));
    handle.shutdown().await;
}

#[rstest]
#[tokio::test]
async fn qos_headers_pass_through_when_not_preserved(harness: Harness) {
    let handle = harness
        .router(RouterConfig::default().preserve_qos(false))
        .install(orders())
        .await
        .expect("install");

    harness
        .bus
        .send("orders", Message::new("x").with_header("priority", "9"))
        .await
        .expect("forwarded");

    let sent = harness.next_request("orders").await;
    assert_eq!(sent.qos, Qos::default());
    assert_eq!(sent.properties.get("priority").map(String::as_str), Some("9"));
    handle.shutdown().await;
}

#[rstest]
#[traced_test]
#[tokio::test]
async fn strict_policy_refuses_untagged_requests(harness: Harness) {
    let config = RouterConfig::default().missing_token(MissingTokenPolicy::Reject);
    let handle = harness.router(config).install(orders()).await.expect("install");

    let err = harness
        .bus
        .send("orders", Message::new("hello"))
        .await
        .expect_err("request refused");
    let BusError::Listener { source, .. } = err else {
        panic!("expected a listener failure");
    };
    let delivery = source
        .downcast_ref::<DeliveryError>()
        .expect("delivery error");
    assert!(matches!(delivery, DeliveryError::MissingToken(d) if d == "orders"));
    assert!(logs_contain("request refused"));
    handle.shutdown().await;
}

#[rstest]
#[tokio::test]
async fn reverse_restores_token_and_ignores_reply_to(harness: Harness) {
    let mut replies = harness.reply_listener("orders.REPLY");
    let handle = harness
        .router(RouterConfig::default())
        .install(orders())
        .await
        .expect("install");

    let reply = BrokerMessage::new("orders.REPLY", "HELLO")
        .with_correlation_id("abc-123")
        .with_reply_to("somewhere.else");
    harness.broker.send(reply).await.expect("reply queued");

    let delivered = timeout(WAIT, replies.recv())
        .await
        .expect("reply in time")
        .expect("reply delivered");
    assert_eq!(delivered.destination(), "orders.REPLY");
    assert_eq!(delivered.response_id(), Some("abc-123"));
    assert_eq!(delivered.payload_str(), Some("HELLO"));
    handle.shutdown().await;
}

#[rstest]
#[tokio::test]
async fn strict_policy_drops_uncorrelated_replies(harness: Harness) {
    let mut replies = harness.reply_listener("orders.REPLY");
    let config = RouterConfig::default().missing_token(MissingTokenPolicy::Reject);
    let handle = harness.router(config).install(orders()).await.expect("install");

    harness
        .broker
        .send(BrokerMessage::new("orders.REPLY", "lost"))
        .await
        .expect("queued");
    harness
        .broker
        .send(BrokerMessage::new("orders.REPLY", "kept").with_correlation_id("t-2"))
        .await
        .expect("queued");

    let delivered = timeout(WAIT, replies.recv())
        .await
        .expect("reply in time")
        .expect("reply delivered");
    assert_eq!(delivered.payload_str(), Some("kept"));
    handle.shutdown().await;
}

#[rstest]
#[tokio::test]
async fn tracked_policy_counts_pending_requests(harness: Harness) {
    let mut replies = harness.reply_listener("orders.REPLY");
    let config = RouterConfig::default().correlation(CorrelationPolicy::Tracked {
        timeout: Duration::from_secs(30),
    });
    let handle = harness.router(config).install(orders()).await.expect("install");

    harness
        .bus
        .send("orders", Message::new("hello").with_response_id("abc-123"))
        .await
        .expect("forwarded");
    assert_eq!(handle.pending_count(), 1);

    let request = harness.next_request("orders").await;
    let reply = request.reply("HELLO").expect("reply-to set");
    harness.broker.send(reply).await.expect("reply queued");
    timeout(WAIT, replies.recv())
        .await
        .expect("reply in time")
        .expect("reply delivered");
    assert_eq!(handle.pending_count(), 0);
    handle.shutdown().await;
}

#[rstest]
#[tokio::test]
async fn tracked_policy_counts_each_untagged_request(harness: Harness) {
    let mut replies = harness.reply_listener("orders.REPLY");
    let config = RouterConfig::default().correlation(CorrelationPolicy::Tracked {
        timeout: Duration::from_secs(30),
    });
    let handle = harness.router(config).install(orders()).await.expect("install");

    for body in ["first", "second"] {
        harness
            .bus
            .send("orders", Message::new(body))
            .await
            .expect("forwarded");
    }
    assert_eq!(handle.pending_count(), 2);

    let request = harness.next_request("orders").await;
    let reply = request.reply("ANSWER").expect("reply-to set");
    harness.broker.send(reply).await.expect("reply queued");
    timeout(WAIT, replies.recv())
        .await
        .expect("reply in time")
        .expect("reply delivered");
    assert_eq!(handle.pending_count(), 1);
    handle.shutdown().await;
}

#[rstest]
#[tokio::test]
async fn tracked_policy_still_delivers_unknown_tokens(harness: Harness) {
    let mut replies = harness.reply_listener("orders.REPLY");
    let config = RouterConfig::default().correlation(CorrelationPolicy::Tracked {
        timeout: Duration::from_secs(30),
    });
    let handle = harness.router(config).install(orders()).await.expect("install");

    harness
        .broker
        .send(BrokerMessage::new("orders.REPLY", "late").with_correlation_id("never-sent"))
        .await
        .expect("queued");
    let delivered = timeout(WAIT, replies.recv())
        .await
        .expect("reply in time")
        .expect("reply delivered");
    assert_eq!(delivered.response_id(), Some("never-sent"));
    handle.shutdown().await;
}

#[tokio::test]
async fn broker_failure_reaches_sender_and_clears_pending() {
    let mut broker = MockRemoteBroker::new();
    broker
        .expect_subscribe()
        .returning(|queue| Ok(closed_subscription(queue)));
    broker
        .expect_send()
        .times(1)
        .returning(|_| Err(DeliveryError::ConnectionLost));
    let bus = Arc::new(InMemoryBus::new());
    let config = RouterConfig::default().correlation(CorrelationPolicy::Tracked {
        timeout: Duration::from_secs(30),
    });
    let handle = CorrelationRouter::new(bus.clone(), Arc::new(broker))
        .with_config(config)
        .install(orders())
        .await
        .expect("install");

    let err = bus
        .send("orders", Message::new("x").with_response_id("t-1"))
        .await
        .expect_err("broker down");
    assert!(err.to_string().contains("connection lost"));
    assert_eq!(handle.pending_count(), 0);
    handle.shutdown().await;
}

#[tokio::test]
async fn subscribe_failure_aborts_install() {
    let mut broker = MockRemoteBroker::new();
    broker.expect_subscribe().returning(|queue| {
        Err(crate::transport::TransportError::SubscriptionRefused {
            queue: queue.to_owned(),
            reason: "denied".into(),
        })
    });
    let bus = Arc::new(InMemoryBus::new());
    let err = CorrelationRouter::new(bus.clone(), Arc::new(broker))
        .install(orders())
        .await
        .expect_err("install fails");
    assert!(matches!(err, RouterError::Subscribe(_)));
    assert!(!bus.has_listener("orders"));
}

#[rstest]
#[tokio::test]
async fn failed_install_rolls_back_earlier_routes(harness: Harness) {
    let _taken = harness.reply_listener("billing");
    let err = harness
        .router(RouterConfig::default())
        .install_all([orders(), Route::symmetric("billing").expect("valid route")])
        .await
        .expect_err("billing is taken");
    assert!(matches!(err, RouterError::Bus(BusError::ListenerExists(_))));
    assert!(!harness.bus.has_listener("orders"));
}

#[rstest]
#[tokio::test]
async fn routes_sharing_a_queue_are_refused(harness: Harness) {
    let err = harness
        .router(RouterConfig::default())
        .install_all([orders(), Route::new("invoices", "orders").expect("valid route")])
        .await
        .expect_err("orders queue is shared");
    assert!(matches!(err, RouterError::Duplicate(name) if name == "orders"));
    assert!(!harness.bus.has_listener("orders"));
    assert!(!harness.bus.has_listener("invoices"));
}

#[rstest]
#[tokio::test]
async fn shutdown_unregisters_listeners(harness: Harness) {
    let handle = harness
        .router(RouterConfig::default())
        .install_all([orders(), Route::new("billing", "billing.v2").expect("valid route")])
        .await
        .expect("install");
    assert_eq!(handle.routes().count(), 2);

    handle.shutdown().await;
    let err = harness
        .bus
        .send("orders", Message::new("x"))
        .await
        .expect_err("listener removed");
    assert!(matches!(err, BusError::NoListener(_)));
}

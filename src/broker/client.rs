//! Framed client for a [`super::BrokerServer`].

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use tokio::{
    select,
    sync::{mpsc, oneshot},
};
use tokio_util::{
    codec::{Framed, LengthDelimitedCodec},
    sync::CancellationToken,
    task::TaskTracker,
};
use tracing::{debug, warn};

use super::{BrokerMessage, DeliveryError, Frame, RemoteBroker, Subscription};
use crate::transport::{BrokerUri, Channel, TransportError, TransportSelector};

type ReceiptResult = Result<(), String>;

#[derive(Default)]
struct Shared {
    receipts: DashMap<u64, oneshot::Sender<ReceiptResult>>,
    subscriptions: DashMap<u64, mpsc::UnboundedSender<BrokerMessage>>,
    counter: AtomicU64,
}

impl Shared {
    fn next_id(&self) -> u64 { self.counter.fetch_add(1, Ordering::Relaxed) }

    /// Route one inbound frame. Returns a frame to write back, if any.
    fn dispatch(&self, bytes: &[u8]) -> Option<Frame> {
        match Frame::from_bytes(bytes) {
            Ok(Frame::Receipt { receipt }) => self.settle(receipt, Ok(())),
            Ok(Frame::Error { receipt, reason }) => self.settle(receipt, Err(reason)),
            Ok(Frame::Deliver {
                subscription,
                message,
            }) => {
                let undelivered = match self.subscriptions.get(&subscription) {
                    Some(tx) => tx.send(message).err().map(|e| e.0),
                    None => {
                        debug!(subscription, "delivery for unknown subscription");
                        Some(message)
                    }
                };
                if let Some(message) = undelivered {
                    self.subscriptions.remove(&subscription);
                    return Some(Frame::Release { message });
                }
            }
            Ok(other) => warn!(frame = ?other, "unexpected frame from broker"),
            Err(e) => warn!(error = %e, "undecodable frame from broker"),
        }
        None
    }

    fn settle(&self, receipt: u64, result: ReceiptResult) {
        match self.receipts.remove(&receipt) {
            Some((_, tx)) => {
                let _ = tx.send(result);
            }
            None => debug!(receipt, "receipt for unknown request"),
        }
    }

    fn fail_all(&self) {
        self.receipts.clear();
        self.subscriptions.clear();
    }
}

/// Tell the broker a subscription is gone and hand back what it never consumed.
fn release(
    shared: &Shared,
    outbound: &mpsc::UnboundedSender<Bytes>,
    subscription: u64,
    unconsumed: Vec<BrokerMessage>,
) {
    shared.subscriptions.remove(&subscription);
    let frames = std::iter::once(Frame::Unsubscribe { subscription })
        .chain(unconsumed.into_iter().map(|message| Frame::Release { message }));
    for frame in frames {
        let bytes = match frame.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(subscription, error = %e, "failed to encode release frame");
                continue;
            }
        };
        if outbound.send(Bytes::from(bytes)).is_err() {
            debug!(subscription, "connection closed before unsubscribe");
            return;
        }
    }
}

/// Connection to a remote broker.
///
/// One background task owns the channel; requests are matched to the
/// broker's receipts by number, so any number of callers may share a client.
/// When the connection drops, pending sends fail with
/// [`DeliveryError::ConnectionLost`] and every [`Subscription`] ends.
pub struct BrokerClient {
    outbound: mpsc::UnboundedSender<Bytes>,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl BrokerClient {
    /// Dial `uri` through `selector` and start the connection task.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if no channel can be opened.
    pub async fn connect(uri: &BrokerUri, selector: &TransportSelector) -> Result<Self, TransportError> {
        let channel = selector.connect(uri).await?;
        debug!(%uri, "broker connection established");
        Ok(Self::from_channel(channel))
    }

    /// Run the protocol over an already open channel.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn from_channel(channel: Channel) -> Self {
        let (outbound, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::default());
        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();
        tracker.spawn(run_connection(
            Framed::new(channel, LengthDelimitedCodec::new()),
            rx,
            Arc::clone(&shared),
            shutdown.clone(),
        ));
        tracker.close();
        Self {
            outbound,
            shared,
            shutdown,
            tracker,
        }
    }

    /// Whether the connection task has stopped.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.outbound.is_closed() }

    /// Close the connection and wait for its task to finish.
    pub async fn close(&self) {
        self.shutdown.cancel();
        self.tracker.wait().await;
    }

    fn request(&self, frame: &Frame, receipt: u64) -> Result<oneshot::Receiver<ReceiptResult>, DeliveryError> {
        let bytes = frame.to_bytes()?;
        let (tx, rx) = oneshot::channel();
        self.shared.receipts.insert(receipt, tx);
        if self.outbound.send(Bytes::from(bytes)).is_err() {
            self.shared.receipts.remove(&receipt);
            return Err(DeliveryError::ConnectionLost);
        }
        Ok(rx)
    }
}

#[async_trait]
impl RemoteBroker for BrokerClient {
    async fn send(&self, message: BrokerMessage) -> Result<(), DeliveryError> {
        let receipt = self.shared.next_id();
        let destination = message.destination.clone();
        let pending = self.request(&Frame::Send { receipt, message }, receipt)?;
        match pending.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(reason)) => Err(DeliveryError::Rejected {
                destination,
                reason,
            }),
            Err(_) => Err(DeliveryError::ConnectionLost),
        }
    }

    async fn subscribe(&self, queue: &str) -> Result<Subscription, TransportError> {
        let receipt = self.shared.next_id();
        let subscription = self.shared.next_id();
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.subscriptions.insert(subscription, tx);
        let frame = Frame::Subscribe {
            receipt,
            subscription,
            queue: queue.to_owned(),
        };
        let err = match self.request(&frame, receipt) {
            Ok(pending) => match pending.await {
                Ok(Ok(())) => {
                    let shared = Arc::clone(&self.shared);
                    let outbound = self.outbound.clone();
                    return Ok(Subscription::from_remote(queue, rx).on_release(Box::new(
                        move |unconsumed| release(&shared, &outbound, subscription, unconsumed),
                    )));
                }
                Ok(Err(reason)) => TransportError::SubscriptionRefused {
                    queue: queue.to_owned(),
                    reason,
                },
                Err(_) => TransportError::Closed,
            },
            Err(_) => TransportError::Closed,
        };
        self.shared.subscriptions.remove(&subscription);
        Err(err)
    }
}

impl Drop for BrokerClient {
    fn drop(&mut self) { self.shutdown.cancel(); }
}

impl fmt::Debug for BrokerClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerClient")
            .field("pending", &self.shared.receipts.len())
            .field("subscriptions", &self.shared.subscriptions.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[expect(
    clippy::integer_division_remainder_used,
    reason = "tokio::select! expands to modulus internally"
)]
async fn run_connection(
    framed: Framed<Channel, LengthDelimitedCodec>,
    mut outbound: mpsc::UnboundedReceiver<Bytes>,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
) {
    let (mut sink, mut inbound) = framed.split();
    loop {
        select! {
            biased;

            () = shutdown.cancelled() => break,
            Some(bytes) = outbound.recv() => {
                if let Err(e) = sink.send(bytes).await {
                    warn!(error = %e, "broker write failed");
                    break;
                }
            }
            frame = inbound.next() => match frame {
                Some(Ok(bytes)) => {
                    let Some(reply) = shared.dispatch(&bytes) else {
                        continue;
                    };
                    match reply.to_bytes() {
                        Ok(reply) => {
                            if let Err(e) = sink.send(Bytes::from(reply)).await {
                                warn!(error = %e, "broker write failed");
                                break;
                            }
                        }
                        Err(e) => warn!(error = %e, "failed to encode release frame"),
                    }
                }
                Some(Err(e)) => {
                    warn!(error = %e, "broker read failed");
                    break;
                }
                None => {
                    debug!("broker closed the connection");
                    break;
                }
            },
        }
    }
    outbound.close();
    shared.fail_all();
    let _ = sink.close().await;
}

#[cfg(test)]
mod tests {
    use tokio::io::duplex;

    use super::*;

    fn encode(frame: &Frame) -> Bytes { Bytes::from(frame.to_bytes().expect("encode frame")) }

    #[tokio::test]
    async fn send_resolves_on_receipt() {
        let (near, far) = duplex(4096);
        let client = BrokerClient::from_channel(Box::new(near));
        let mut peer = Framed::new(far, LengthDelimitedCodec::new());

        let responder = tokio::spawn(async move {
            let bytes = peer.next().await.expect("request").expect("read");
            let Frame::Send { receipt, message } = Frame::from_bytes(&bytes).expect("decode") else {
                panic!("expected a send frame");
            };
            assert_eq!(message.destination, "orders");
            peer.send(encode(&Frame::Receipt { receipt }))
                .await
                .expect("write receipt");
            peer
        });

        client
            .send(BrokerMessage::new("orders", "hello"))
            .await
            .expect("send confirmed");
        drop(responder.await.expect("responder"));
    }

    #[tokio::test]
    async fn error_frame_rejects_send() {
        let (near, far) = duplex(4096);
        let client = BrokerClient::from_channel(Box::new(near));
        let mut peer = Framed::new(far, LengthDelimitedCodec::new());

        tokio::spawn(async move {
            let bytes = peer.next().await.expect("request").expect("read");
            let Ok(Frame::Send { receipt, .. }) = Frame::from_bytes(&bytes) else {
                panic!("expected a send frame");
            };
            peer.send(encode(&Frame::Error {
                receipt,
                reason: "queue full".into(),
            }))
            .await
            .expect("write error");
            peer
        });

        let err = client
            .send(BrokerMessage::new("orders", "hello"))
            .await
            .expect_err("broker refused");
        assert!(matches!(err, DeliveryError::Rejected { reason, .. } if reason == "queue full"));
    }

    #[tokio::test]
    async fn pending_send_fails_when_connection_drops() {
        let (near, far) = duplex(4096);
        let client = BrokerClient::from_channel(Box::new(near));
        let mut peer = Framed::new(far, LengthDelimitedCodec::new());

        tokio::spawn(async move {
            let _ = peer.next().await;
            drop(peer);
        });

        let err = client
            .send(BrokerMessage::new("orders", "hello"))
            .await
            .expect_err("connection lost");
        assert!(matches!(err, DeliveryError::ConnectionLost));
    }

    #[tokio::test]
    async fn deliveries_reach_the_subscription() {
        let (near, far) = duplex(4096);
        let client = BrokerClient::from_channel(Box::new(near));
        let mut peer = Framed::new(far, LengthDelimitedCodec::new());

        tokio::spawn(async move {
            let bytes = peer.next().await.expect("request").expect("read");
            let Ok(Frame::Subscribe {
                receipt,
                subscription,
                queue,
            }) = Frame::from_bytes(&bytes)
            else {
                panic!("expected a subscribe frame");
            };
            peer.send(encode(&Frame::Receipt { receipt }))
                .await
                .expect("write receipt");
            let message = BrokerMessage::new(queue, "HELLO").with_correlation_id("abc-123");
            peer.send(encode(&Frame::Deliver {
                subscription,
                message,
            }))
            .await
            .expect("write delivery");
            peer
        });

        let mut sub = client.subscribe("orders.REPLY").await.expect("subscribed");
        let message = sub.next().await.expect("delivery");
        assert_eq!(message.correlation_id.as_deref(), Some("abc-123"));
        assert_eq!(sub.queue(), "orders.REPLY");
    }

    async fn read_frame(peer: &mut Framed<tokio::io::DuplexStream, LengthDelimitedCodec>) -> Frame {
        let bytes = peer.next().await.expect("frame").expect("read");
        Frame::from_bytes(&bytes).expect("decode")
    }

    #[tokio::test]
    async fn dropped_subscription_unsubscribes_and_releases_backlog() {
        let (near, far) = duplex(4096);
        let client = BrokerClient::from_channel(Box::new(near));
        let mut peer = Framed::new(far, LengthDelimitedCodec::new());

        let (sub, subscription) = tokio::join!(client.subscribe("orders.REPLY"), async {
            let Frame::Subscribe {
                receipt,
                subscription,
                ..
            } = read_frame(&mut peer).await
            else {
                panic!("expected a subscribe frame");
            };
            peer.send(encode(&Frame::Receipt { receipt }))
                .await
                .expect("write receipt");
            subscription
        });
        let mut sub = sub.expect("subscribed");
        for body in ["one", "two"] {
            peer.send(encode(&Frame::Deliver {
                subscription,
                message: BrokerMessage::new("orders.REPLY", body),
            }))
            .await
            .expect("write delivery");
        }

        assert_eq!(sub.next().await.expect("first delivery").payload, b"one");
        drop(sub);

        let frames = [read_frame(&mut peer).await, read_frame(&mut peer).await];
        assert!(frames.contains(&Frame::Unsubscribe { subscription }));
        assert!(frames.contains(&Frame::Release {
            message: BrokerMessage::new("orders.REPLY", "two"),
        }));
    }

    #[tokio::test]
    async fn delivery_for_unknown_subscription_is_released() {
        let (near, far) = duplex(4096);
        let _client = BrokerClient::from_channel(Box::new(near));
        let mut peer = Framed::new(far, LengthDelimitedCodec::new());

        let message = BrokerMessage::new("orders.REPLY", "stray").with_correlation_id("abc-123");
        peer.send(encode(&Frame::Deliver {
            subscription: 42,
            message: message.clone(),
        }))
        .await
        .expect("write delivery");

        assert_eq!(read_frame(&mut peer).await, Frame::Release { message });
    }

    #[tokio::test]
    async fn close_ends_subscriptions() {
        let (near, _far) = duplex(4096);
        let client = BrokerClient::from_channel(Box::new(near));
        let (tx, rx) = mpsc::unbounded_channel();
        client.shared.subscriptions.insert(7, tx);
        let mut sub = Subscription::from_remote("q", rx);

        client.close().await;
        assert!(client.is_closed());
        assert!(sub.next().await.is_none());
    }
}

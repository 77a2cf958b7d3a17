//! Serving one client connection.

use std::{collections::HashMap, net::SocketAddr, sync::Arc};

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::{net::TcpStream, select, sync::mpsc};
use tokio_rustls::TlsAcceptor;
use tokio_util::{
    codec::{Framed, LengthDelimitedCodec},
    sync::CancellationToken,
    task::TaskTracker,
};
use tracing::{debug, warn};

use crate::{
    broker::{BrokerMessage, Frame, MemoryBroker, RemoteBroker, Subscription},
    transport::Channel,
};

/// Everything a connection task needs from its server.
#[derive(Clone)]
pub(super) struct ConnectionContext {
    pub broker: Arc<MemoryBroker>,
    pub acceptor: Option<TlsAcceptor>,
    pub shutdown: CancellationToken,
}

pub(super) fn spawn_connection(
    stream: TcpStream,
    peer: SocketAddr,
    context: ConnectionContext,
    tracker: &TaskTracker,
) {
    tracker.spawn(async move {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%peer, error = %e, "failed to set TCP_NODELAY");
        }
        let Some(channel) = establish(stream, peer, &context).await else {
            return;
        };
        debug!(%peer, "broker connection accepted");
        Session::new(context.broker, context.shutdown)
            .serve(channel)
            .await;
        debug!(%peer, "broker connection closed");
    });
}

#[expect(
    clippy::integer_division_remainder_used,
    reason = "tokio::select! expands to modulus internally"
)]
async fn establish(stream: TcpStream, peer: SocketAddr, context: &ConnectionContext) -> Option<Channel> {
    let Some(acceptor) = &context.acceptor else {
        return Some(Box::new(stream));
    };
    select! {
        biased;

        () = context.shutdown.cancelled() => None,
        res = acceptor.accept(stream) => match res {
            Ok(tls) => {
                let channel: Channel = Box::new(tls);
                Some(channel)
            }
            Err(e) => {
                warn!(%peer, error = %e, "TLS handshake failed");
                None
            }
        },
    }
}

/// Per-connection protocol state.
struct Session {
    broker: Arc<MemoryBroker>,
    shutdown: CancellationToken,
    closing: CancellationToken,
    forwarders: TaskTracker,
    /// Cancels the forwarder of each live subscription.
    active: HashMap<u64, CancellationToken>,
    deliveries: mpsc::UnboundedSender<Frame>,
    pending: mpsc::UnboundedReceiver<Frame>,
}

impl Session {
    fn new(broker: Arc<MemoryBroker>, shutdown: CancellationToken) -> Self {
        let (deliveries, pending) = mpsc::unbounded_channel();
        Self {
            broker,
            closing: shutdown.child_token(),
            shutdown,
            forwarders: TaskTracker::new(),
            active: HashMap::new(),
            deliveries,
            pending,
        }
    }

    #[expect(
        clippy::integer_division_remainder_used,
        reason = "tokio::select! expands to modulus internally"
    )]
    async fn serve(mut self, channel: Channel) {
        let (mut sink, mut inbound) = Framed::new(channel, LengthDelimitedCodec::new()).split();
        loop {
            let outgoing = select! {
                biased;

                () = self.shutdown.cancelled() => break,
                Some(frame) = self.pending.recv() => frame,
                next = inbound.next() => match next {
                    Some(Ok(bytes)) => match Frame::from_bytes(&bytes) {
                        Ok(frame) => match self.handle(frame).await {
                            Some(reply) => reply,
                            None => continue,
                        },
                        Err(e) => {
                            warn!(error = %e, "undecodable frame from client");
                            break;
                        }
                    },
                    Some(Err(e)) => {
                        warn!(error = %e, "client read failed");
                        break;
                    }
                    None => break,
                },
            };
            let outgoing = match outgoing {
                Frame::Deliver {
                    subscription,
                    message,
                } if !self.active.contains_key(&subscription) => {
                    requeue(&self.broker, message);
                    continue;
                }
                other => other,
            };
            let bytes = match outgoing.to_bytes() {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(error = %e, "failed to encode frame");
                    continue;
                }
            };
            if let Err(e) = sink.send(Bytes::from(bytes)).await {
                warn!(error = %e, "client write failed");
                if let Frame::Deliver { message, .. } = outgoing {
                    requeue(&self.broker, message);
                }
                break;
            }
        }
        self.shut_down().await;
    }

    async fn handle(&mut self, frame: Frame) -> Option<Frame> {
        match frame {
            Frame::Send { receipt, message } => Some(match self.broker.send(message).await {
                Ok(()) => Frame::Receipt { receipt },
                Err(e) => Frame::Error {
                    receipt,
                    reason: e.to_string(),
                },
            }),
            Frame::Subscribe {
                receipt,
                subscription,
                queue,
            } => Some(match self.broker.subscribe(&queue).await {
                Ok(sub) => {
                    debug!(%queue, subscription, "client subscribed");
                    let cancel = self.closing.child_token();
                    if let Some(previous) = self.active.insert(subscription, cancel.clone()) {
                        previous.cancel();
                    }
                    self.forwarders.spawn(forward(
                        sub,
                        subscription,
                        self.deliveries.clone(),
                        cancel,
                        Arc::clone(&self.broker),
                    ));
                    Frame::Receipt { receipt }
                }
                Err(e) => Frame::Error {
                    receipt,
                    reason: e.to_string(),
                },
            }),
            Frame::Unsubscribe { subscription } => {
                match self.active.remove(&subscription) {
                    Some(cancel) => {
                        debug!(subscription, "client unsubscribed");
                        cancel.cancel();
                    }
                    None => debug!(subscription, "unsubscribe for unknown subscription"),
                }
                None
            }
            Frame::Release { message } => {
                debug!(queue = %message.destination, "client released a delivery");
                requeue(&self.broker, message);
                None
            }
            other => {
                warn!(frame = ?other, "unexpected frame from client");
                None
            }
        }
    }

    /// Stop the forwarders and put undelivered messages back on their queues.
    async fn shut_down(mut self) {
        self.closing.cancel();
        self.forwarders.close();
        self.forwarders.wait().await;
        self.pending.close();
        while let Ok(frame) = self.pending.try_recv() {
            if let Frame::Deliver { message, .. } = frame {
                requeue(&self.broker, message);
            }
        }
    }
}

fn requeue(broker: &MemoryBroker, message: BrokerMessage) {
    if let Err(e) = broker.enqueue(message) {
        warn!(error = %e, "failed to requeue undelivered message");
    }
}

#[expect(
    clippy::integer_division_remainder_used,
    reason = "tokio::select! expands to modulus internally"
)]
async fn forward(
    mut sub: Subscription,
    subscription: u64,
    deliveries: mpsc::UnboundedSender<Frame>,
    closing: CancellationToken,
    broker: Arc<MemoryBroker>,
) {
    loop {
        let message = select! {
            biased;

            () = closing.cancelled() => break,
            next = sub.next() => match next {
                Some(message) => message,
                None => break,
            },
        };
        if let Err(mpsc::error::SendError(Frame::Deliver { message, .. })) =
            deliveries.send(Frame::Deliver {
                subscription,
                message,
            })
        {
            requeue(&broker, message);
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::{
        io::{DuplexStream, duplex},
        task::JoinHandle,
        time::timeout,
    };

    use super::*;

    const WAIT: Duration = Duration::from_secs(1);

    type Peer = Framed<DuplexStream, LengthDelimitedCodec>;

    fn serve(broker: &Arc<MemoryBroker>) -> (Peer, JoinHandle<()>) {
        let (near, far) = duplex(4096);
        let session = Session::new(Arc::clone(broker), CancellationToken::new());
        let task = tokio::spawn(session.serve(Box::new(near)));
        (Framed::new(far, LengthDelimitedCodec::new()), task)
    }

    async fn write(peer: &mut Peer, frame: &Frame) {
        peer.send(Bytes::from(frame.to_bytes().expect("encode frame")))
            .await
            .expect("write frame");
    }

    async fn read(peer: &mut Peer) -> Frame {
        let bytes = timeout(WAIT, peer.next())
            .await
            .expect("frame arrives in time")
            .expect("connection open")
            .expect("read frame");
        Frame::from_bytes(&bytes).expect("decode frame")
    }

    async fn subscribe(peer: &mut Peer, receipt: u64, subscription: u64) {
        write(
            peer,
            &Frame::Subscribe {
                receipt,
                subscription,
                queue: "jobs".into(),
            },
        )
        .await;
        assert_eq!(read(peer).await, Frame::Receipt { receipt });
    }

    #[tokio::test]
    async fn unsubscribed_consumer_leaves_messages_for_the_next() {
        let broker = Arc::new(MemoryBroker::new());
        let (mut peer, _task) = serve(&broker);

        subscribe(&mut peer, 1, 7).await;
        write(&mut peer, &Frame::Unsubscribe { subscription: 7 }).await;
        subscribe(&mut peer, 2, 8).await;

        let message = BrokerMessage::new("jobs", "later");
        broker.enqueue(message.clone()).expect("enqueue");
        assert_eq!(
            read(&mut peer).await,
            Frame::Deliver {
                subscription: 8,
                message,
            }
        );
    }

    #[tokio::test]
    async fn released_delivery_goes_back_on_its_queue() {
        let broker = Arc::new(MemoryBroker::new());
        let (mut peer, _task) = serve(&broker);
        let message = BrokerMessage::new("jobs", "unread").with_correlation_id("c-1");

        write(
            &mut peer,
            &Frame::Release {
                message: message.clone(),
            },
        )
        .await;
        subscribe(&mut peer, 1, 3).await;

        assert_eq!(
            read(&mut peer).await,
            Frame::Deliver {
                subscription: 3,
                message,
            }
        );
    }

    #[tokio::test]
    async fn delivery_to_a_departed_client_is_requeued() {
        let broker = Arc::new(MemoryBroker::new());
        let (mut peer, task) = serve(&broker);
        subscribe(&mut peer, 1, 7).await;
        drop(peer);

        broker
            .enqueue(BrokerMessage::new("jobs", "kept"))
            .expect("enqueue");
        timeout(WAIT, task)
            .await
            .expect("session ends")
            .expect("session task");

        assert_eq!(broker.depth("jobs"), Some(1));
    }
}

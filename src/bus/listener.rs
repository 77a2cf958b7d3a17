//! Receivers attached to local bus destinations.

use std::{fmt, future::Future, marker::PhantomData};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::ListenerError;
use crate::message::Message;

/// Handles messages sent to one local destination.
#[async_trait]
pub trait MessageListener: Send + Sync {
    /// Process `message`. An error is returned to whoever sent it.
    async fn receive(&self, message: Message) -> Result<(), ListenerError>;
}

/// Adapter running an async closure for each message.
///
/// Build one with [`from_fn`].
pub struct FnListener<F, Fut> {
    f: F,
    _fut: PhantomData<fn() -> Fut>,
}

/// Wrap an async closure as a [`MessageListener`].
///
/// ```
/// use busbridge::bus::{ListenerError, MessageListener, from_fn};
/// use busbridge::message::Message;
///
/// # #[tokio::main]
/// # async fn main() {
/// let listener = from_fn(|message: Message| async move {
///     assert_eq!(message.payload_str(), Some("ping"));
///     Ok::<_, ListenerError>(())
/// });
/// listener.receive(Message::new("ping")).await.expect("handled");
/// # }
/// ```
pub fn from_fn<F, Fut>(f: F) -> FnListener<F, Fut>
where
    F: Fn(Message) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), ListenerError>> + Send,
{
    FnListener {
        f,
        _fut: PhantomData,
    }
}

#[async_trait]
impl<F, Fut> MessageListener for FnListener<F, Fut>
where
    F: Fn(Message) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), ListenerError>> + Send,
{
    async fn receive(&self, message: Message) -> Result<(), ListenerError> { (self.f)(message).await }
}

impl<F, Fut> fmt::Debug for FnListener<F, Fut> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str("FnListener") }
}

/// Forwards every message into a channel, for callers that would rather
/// pull than be called.
#[derive(Clone, Debug)]
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<Message>,
}

impl ChannelListener {
    /// Create a listener and the receiver its messages arrive on.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl MessageListener for ChannelListener {
    async fn receive(&self, message: Message) -> Result<(), ListenerError> {
        self.tx
            .send(message)
            .map_err(|_| "listener channel closed".into())
    }
}

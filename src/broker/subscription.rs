//! Consumer handles for broker queues.

use std::{fmt, sync::Arc};

use tokio::{
    sync::{Mutex, mpsc},
    time::Instant,
};
use tracing::debug;

use super::BrokerMessage;

/// A message waiting in an in-process queue.
#[derive(Debug)]
pub(crate) struct Queued {
    pub(crate) message: BrokerMessage,
    pub(crate) expires_at: Option<Instant>,
}

/// Receiving side of an in-process queue, shared by competing consumers.
pub(crate) type SharedReceiver = Arc<Mutex<mpsc::UnboundedReceiver<Queued>>>;

/// Called once when a remote subscription is dropped, with the messages it
/// had received but not yet handed out.
pub(crate) type ReleaseHook = Box<dyn FnOnce(Vec<BrokerMessage>) + Send + Sync>;

enum Source {
    Queue(SharedReceiver),
    Remote {
        receiver: mpsc::UnboundedReceiver<BrokerMessage>,
        release: Option<ReleaseHook>,
    },
}

/// A stream of messages consumed from one broker queue.
///
/// Ends when the broker or the connection carrying it goes away.
pub struct Subscription {
    queue: String,
    source: Source,
}

impl Subscription {
    pub(crate) fn from_queue(queue: &str, receiver: SharedReceiver) -> Self {
        Self {
            queue: queue.to_owned(),
            source: Source::Queue(receiver),
        }
    }

    pub(crate) fn from_remote(queue: &str, receiver: mpsc::UnboundedReceiver<BrokerMessage>) -> Self {
        Self {
            queue: queue.to_owned(),
            source: Source::Remote {
                receiver,
                release: None,
            },
        }
    }

    /// Run `hook` when this subscription is dropped.
    pub(crate) fn on_release(mut self, hook: ReleaseHook) -> Self {
        if let Source::Remote { release, .. } = &mut self.source {
            *release = Some(hook);
        }
        self
    }

    /// Queue this subscription consumes.
    #[must_use]
    pub fn queue(&self) -> &str { &self.queue }

    /// Wait for the next message.
    ///
    /// Messages whose time-to-live elapsed while queued are skipped. This
    /// future is cancel-safe.
    pub async fn next(&mut self) -> Option<BrokerMessage> {
        match &mut self.source {
            Source::Remote { receiver, .. } => receiver.recv().await,
            Source::Queue(shared) => loop {
                let queued = shared.lock().await.recv().await?;
                match queued.expires_at {
                    Some(deadline) if deadline <= Instant::now() => {
                        debug!(queue = %self.queue, "dropping expired message");
                    }
                    _ => return Some(queued.message),
                }
            },
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Source::Remote { receiver, release } = &mut self.source else {
            return;
        };
        let Some(hook) = release.take() else {
            return;
        };
        receiver.close();
        let mut unconsumed = Vec::new();
        while let Ok(message) = receiver.try_recv() {
            unconsumed.push(message);
        }
        hook(unconsumed);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

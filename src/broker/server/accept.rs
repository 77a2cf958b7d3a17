use std::{io, net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use log::warn;
use tokio::{
    net::{TcpListener, TcpStream},
    select,
    time::{Duration, sleep},
};
use tokio_util::task::TaskTracker;

use super::{
    backoff::BackoffConfig,
    connection::{ConnectionContext, spawn_connection},
};

/// Source of inbound connections for the accept loop.
///
/// Dropping a pending `accept()` future must not lose a connection.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub(super) trait AcceptListener: Send + Sync {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)>;
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl AcceptListener for TcpListener {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> { TcpListener::accept(self).await }

    fn local_addr(&self) -> io::Result<SocketAddr> { TcpListener::local_addr(self) }
}

/// Accept connections until the context's shutdown token fires.
///
/// Each connection is served on its own task registered with `tracker`.
/// Accept errors are logged and retried after a back-off delay.
pub(super) async fn accept_loop<L>(
    listener: Arc<L>,
    context: ConnectionContext,
    tracker: TaskTracker,
    backoff: BackoffConfig,
) where
    L: AcceptListener + 'static,
{
    let backoff = backoff.normalized();
    let mut delay = backoff.initial_delay;
    while let Some(next) = accept_once(&*listener, &context, &tracker, &backoff, delay).await {
        delay = next;
    }
}

#[expect(
    clippy::integer_division_remainder_used,
    reason = "tokio::select! expands to modulus internally"
)]
async fn accept_once<L: AcceptListener>(
    listener: &L,
    context: &ConnectionContext,
    tracker: &TaskTracker,
    backoff: &BackoffConfig,
    delay: Duration,
) -> Option<Duration> {
    select! {
        biased;

        () = context.shutdown.cancelled() => None,
        res = listener.accept() => Some(match res {
            Ok((stream, peer)) => {
                spawn_connection(stream, peer, context.clone(), tracker);
                backoff.initial_delay
            }
            Err(e) => {
                let local_addr = listener.local_addr().ok();
                warn!("accept error: error={e:?}, local_addr={local_addr:?}");
                sleep(delay).await;
                backoff.next(delay)
            }
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tokio::{task::yield_now, time::Instant};
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::broker::MemoryBroker;

    fn context(shutdown: &CancellationToken) -> ConnectionContext {
        ConnectionContext {
            broker: Arc::new(MemoryBroker::new()),
            acceptor: None,
            shutdown: shutdown.clone(),
        }
    }

    fn failing_listener(calls: &Arc<Mutex<Vec<Instant>>>, times: usize) -> MockAcceptListener {
        let mut listener = MockAcceptListener::new();
        let log = Arc::clone(calls);
        listener
            .expect_accept()
            .returning(move || {
                let log = Arc::clone(&log);
                Box::pin(async move {
                    log.lock().expect("lock").push(Instant::now());
                    Err(io::Error::other("mock accept failure"))
                })
            })
            .times(times);
        listener
            .expect_local_addr()
            .returning(|| Ok("127.0.0.1:0".parse().expect("addr parse")))
            .times(times);
        listener
    }

    #[tokio::test(start_paused = true)]
    async fn accept_failures_back_off_exponentially() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let listener = Arc::new(failing_listener(&calls, 4));
        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();
        let backoff = BackoffConfig {
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
        };

        tracker.spawn(accept_loop(
            listener,
            context(&shutdown),
            tracker.clone(),
            backoff,
        ));
        yield_now().await;
        for ms in [5, 10, 20] {
            tokio::time::advance(Duration::from_millis(ms)).await;
            yield_now().await;
        }
        shutdown.cancel();
        tokio::time::advance(Duration::from_millis(20)).await;
        tracker.close();
        tracker.wait().await;

        let calls = calls.lock().expect("lock");
        let gaps: Vec<_> = calls.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(
            gaps,
            [5, 10, 20].map(Duration::from_millis).to_vec(),
            "delays double up to the cap"
        );
    }

    #[tokio::test]
    async fn shutdown_stops_the_loop() {
        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();
        let listener = Arc::new(
            TcpListener::bind("127.0.0.1:0")
                .await
                .expect("bind test listener"),
        );
        tracker.spawn(accept_loop(
            listener,
            context(&shutdown),
            tracker.clone(),
            BackoffConfig::default(),
        ));
        shutdown.cancel();
        tracker.close();
        tokio::time::timeout(Duration::from_millis(500), tracker.wait())
            .await
            .expect("accept loop exits on shutdown");
    }
}

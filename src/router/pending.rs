//! Requests awaiting a reply under the tracked correlation policy.

use std::{collections::VecDeque, sync::Arc, time::Duration};

use dashmap::DashMap;
use tokio::{
    select,
    time::{Instant, MissedTickBehavior, interval},
};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::metrics;

/// Correlation tokens of forwarded requests and when they were sent.
///
/// A token may be in flight more than once, including the empty token of
/// untagged requests; each send is counted and each reply settles the oldest.
#[derive(Debug, Default)]
pub(crate) struct PendingReplies {
    entries: DashMap<String, VecDeque<Instant>>,
}

impl PendingReplies {
    pub(crate) fn insert(&self, token: &str) {
        self.entries
            .entry(token.to_owned())
            .or_default()
            .push_back(Instant::now());
    }

    /// Settle the oldest outstanding send of `token`; `false` if none was
    /// pending.
    pub(crate) fn complete(&self, token: &str) -> bool {
        let mut settled = false;
        self.entries.remove_if_mut(token, |_, sent| {
            settled = sent.pop_front().is_some();
            sent.is_empty()
        });
        settled
    }

    /// Remove every send older than `timeout`, returning its token once per
    /// expired send.
    pub(crate) fn evict_expired(&self, timeout: Duration) -> Vec<String> {
        let now = Instant::now();
        let mut expired = Vec::new();
        self.entries.retain(|token, sent| {
            while sent.front().is_some_and(|at| now.duration_since(*at) >= timeout) {
                sent.pop_front();
                expired.push(token.clone());
            }
            !sent.is_empty()
        });
        expired
    }

    pub(crate) fn len(&self) -> usize { self.entries.iter().map(|entry| entry.value().len()).sum() }
}

/// Periodically evict requests left unanswered for longer than `timeout`.
#[expect(
    clippy::integer_division_remainder_used,
    reason = "tokio::select! expands to modulus internally"
)]
pub(crate) async fn sweep(
    pending: Arc<PendingReplies>,
    timeout: Duration,
    route: String,
    shutdown: CancellationToken,
) {
    let mut ticker = interval((timeout / 2).max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        select! {
            biased;

            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let orphans = pending.evict_expired(timeout);
                if orphans.is_empty() {
                    continue;
                }
                for token in &orphans {
                    warn!(%route, %token, ?timeout, "request timed out waiting for a reply");
                }
                metrics::inc_orphaned(&route, u64::try_from(orphans.len()).unwrap_or(u64::MAX));
            }
        }
    }
}

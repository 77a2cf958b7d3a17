//! Metric helpers for `busbridge`.
//!
//! Names and small recording functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. Every series carries a `route`
//! label naming the broker queue of the route. Without the `metrics` feature
//! the helpers do nothing.

#[cfg(feature = "metrics")]
use metrics::counter;

/// Counter of requests handed to the broker.
pub const REQUESTS_FORWARDED: &str = "busbridge_requests_forwarded_total";
/// Counter of replies delivered to the local bus.
pub const REPLIES_ROUTED: &str = "busbridge_replies_routed_total";
/// Counter of tracked requests whose reply never arrived in time.
pub const ORPHANED_REQUESTS: &str = "busbridge_orphaned_requests_total";
/// Counter of failed forward or reverse deliveries.
pub const ERRORS_TOTAL: &str = "busbridge_errors_total";

/// Leg of a route on which an error happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Local bus to broker.
    Forward,
    /// Broker to local bus.
    Reverse,
}

impl Direction {
    #[cfg_attr(not(feature = "metrics"), expect(dead_code, reason = "only used as a label"))]
    fn as_str(self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Reverse => "reverse",
        }
    }
}

/// Record a request sent to the broker.
pub fn inc_forwarded(route: &str) {
    #[cfg(feature = "metrics")]
    counter!(REQUESTS_FORWARDED, "route" => route.to_owned()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = route;
}

/// Record a reply delivered locally.
pub fn inc_replies(route: &str) {
    #[cfg(feature = "metrics")]
    counter!(REPLIES_ROUTED, "route" => route.to_owned()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = route;
}

/// Record `count` requests evicted from the pending table.
pub fn inc_orphaned(route: &str, count: u64) {
    #[cfg(feature = "metrics")]
    counter!(ORPHANED_REQUESTS, "route" => route.to_owned()).increment(count);
    #[cfg(not(feature = "metrics"))]
    let _ = (route, count);
}

/// Record a failed delivery.
pub fn inc_errors(route: &str, direction: Direction) {
    #[cfg(feature = "metrics")]
    counter!(
        ERRORS_TOTAL,
        "route" => route.to_owned(),
        "direction" => direction.as_str()
    )
    .increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = (route, direction);
}

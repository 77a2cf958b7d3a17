use std::{collections::HashSet, fmt};

use super::RouterError;
use crate::destination::Destination;

/// A pairing of a local request destination with a broker queue.
///
/// Requests flow from the local destination `B` to the queue `Q`; replies
/// flow back from `Q.REPLY` to `B.REPLY`.
///
/// ```
/// use busbridge::router::Route;
///
/// let route = Route::new("orders", "orders.v1").expect("valid route");
/// assert_eq!(route.bus_reply(), "orders.REPLY");
/// assert_eq!(route.broker_reply(), "orders.v1.REPLY");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Route {
    bus: Destination,
    broker: Destination,
}

impl Route {
    /// Route local `bus` to broker queue `queue`.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError`] if either name is empty or names a reply
    /// destination.
    pub fn new(bus: &str, queue: &str) -> Result<Self, RouterError> {
        Self::between(Destination::local(bus)?, Destination::remote(queue, false)?)
    }

    /// Route a local destination to the broker queue of the same name.
    ///
    /// # Errors
    ///
    /// See [`Route::new`].
    pub fn symmetric(name: &str) -> Result<Self, RouterError> { Self::new(name, name) }

    /// Route between two already parsed destinations.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::NotLocal`] or [`RouterError::NotRemote`] when a
    /// side lives in the wrong place or is itself a reply destination.
    pub fn between(bus: Destination, broker: Destination) -> Result<Self, RouterError> {
        if bus.scheme().is_remote() || bus.is_reply() {
            return Err(RouterError::NotLocal(bus.to_string()));
        }
        if !broker.scheme().is_remote() || broker.is_reply() {
            return Err(RouterError::NotRemote(broker.to_string()));
        }
        Ok(Self { bus, broker })
    }

    #[must_use]
    pub fn bus(&self) -> &Destination { &self.bus }

    #[must_use]
    pub fn broker(&self) -> &Destination { &self.broker }

    /// Local destination the forward listener is attached to.
    #[must_use]
    pub fn bus_request(&self) -> String { self.bus.name() }

    /// Local destination replies are delivered to.
    #[must_use]
    pub fn bus_reply(&self) -> String { self.bus.reply().name() }

    /// Broker queue requests are sent to.
    #[must_use]
    pub fn broker_request(&self) -> String { self.broker.name() }

    /// Broker queue replies are consumed from.
    #[must_use]
    pub fn broker_reply(&self) -> String { self.broker.reply().name() }
}

/// Reject route sets in which a local destination or a broker queue appears
/// twice.
pub(crate) fn ensure_distinct<'a>(routes: impl IntoIterator<Item = &'a Route>) -> Result<(), RouterError> {
    let mut buses = HashSet::new();
    let mut queues = HashSet::new();
    for route in routes {
        if !buses.insert(route.bus_request()) {
            return Err(RouterError::Duplicate(route.bus_request()));
        }
        if !queues.insert(route.broker_request()) {
            return Err(RouterError::Duplicate(route.broker_request()));
        }
    }
    Ok(())
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.bus, self.broker)
    }
}

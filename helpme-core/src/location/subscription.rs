//! Subscriber registry for auto-update fan-out.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

use super::types::ResolvedLocation;

/// Callback invoked with every location broadcast to subscribers.
pub type LocationCallback = Arc<dyn Fn(&ResolvedLocation) + Send + Sync + 'static>;

/// Token identifying one subscriber registration.
///
/// Pass it to
/// [`LocationService::unsubscribe`](super::LocationService::unsubscribe)
/// to stop receiving updates. Dropping the handle does not unsubscribe.
#[derive(Debug, PartialEq, Eq, Hash)]
#[must_use = "dropping a subscription handle leaves the subscriber registered"]
pub struct SubscriptionHandle {
    id: u64,
}

impl SubscriptionHandle {
    /// The registration id, unique for the lifetime of the service.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }
}

/// Where a subscriber's updates go.
#[derive(Clone)]
pub(crate) enum Subscriber {
    /// A callback invoked in place.
    Callback(LocationCallback),
    /// A channel; the subscriber is dropped once its receiver is closed.
    Channel(UnboundedSender<ResolvedLocation>),
}

/// Ordered set of subscribers. Insertion order is the notification order.
#[derive(Default)]
pub(crate) struct SubscriberRegistry {
    next_id: u64,
    entries: Vec<(u64, Subscriber)>,
}

impl SubscriberRegistry {
    pub(crate) fn insert(&mut self, subscriber: Subscriber) -> SubscriptionHandle {
        self.next_id += 1;
        let id = self.next_id;
        self.entries.push((id, subscriber));
        SubscriptionHandle { id }
    }

    /// Removes a registration. Returns false if it was already gone.
    pub(crate) fn remove(&mut self, handle: &SubscriptionHandle) -> bool {
        self.remove_id(handle.id)
    }

    pub(crate) fn remove_id(&mut self, id: u64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clones the subscribers so they can be notified without holding a lock.
    pub(crate) fn snapshot(&self) -> Vec<(u64, Subscriber)> {
        self.entries.clone()
    }
}

/// What a broadcast reached.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Delivery {
    /// Callbacks that panicked.
    pub(crate) panicked: usize,
    /// Channel subscribers whose receiver is gone.
    pub(crate) closed: Vec<u64>,
}

/// Sends `location` to every subscriber. A panicking callback is logged
/// and does not prevent the remaining subscribers from being notified.
pub(crate) fn notify_all(
    subscribers: &[(u64, Subscriber)],
    location: &ResolvedLocation,
) -> Delivery {
    let mut delivery = Delivery::default();
    for (id, subscriber) in subscribers {
        match subscriber {
            Subscriber::Callback(callback) => {
                if catch_unwind(AssertUnwindSafe(|| callback(location))).is_err() {
                    delivery.panicked += 1;
                    tracing::error!(subscriber = id, "location update callback panicked");
                }
            }
            Subscriber::Channel(sender) => {
                if sender.send(location.clone()).is_err() {
                    delivery.closed.push(*id);
                }
            }
        }
    }
    delivery
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::Coordinate;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    fn noop() -> Subscriber {
        Subscriber::Callback(Arc::new(|_| {}))
    }

    fn counting(counter: &Arc<AtomicUsize>) -> Subscriber {
        let counter = Arc::clone(counter);
        Subscriber::Callback(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
    }

    fn location() -> ResolvedLocation {
        ResolvedLocation::from_coordinate(Coordinate::new(41.0, 29.0))
    }

    #[test]
    fn handles_are_unique() {
        let mut registry = SubscriberRegistry::default();
        let a = registry.insert(noop());
        let b = registry.insert(noop());

        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn remove_is_idempotent() {
        let mut registry = SubscriberRegistry::default();
        let handle = registry.insert(noop());

        assert!(registry.remove(&handle));
        assert!(!registry.remove(&handle));
        assert!(registry.is_empty());
    }

    #[test]
    fn notify_reaches_every_subscriber() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut registry = SubscriberRegistry::default();
        let _a = registry.insert(counting(&counter));
        let _b = registry.insert(counting(&counter));

        let delivery = notify_all(&registry.snapshot(), &location());

        assert_eq!(delivery, Delivery::default());
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn panicking_subscriber_is_isolated() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut registry = SubscriberRegistry::default();
        let _first = registry.insert(Subscriber::Callback(Arc::new(|_| panic!("subscriber bug"))));
        let _second = registry.insert(counting(&counter));

        let delivery = notify_all(&registry.snapshot(), &location());

        assert_eq!(delivery.panicked, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn closed_channels_are_reported() {
        let mut registry = SubscriberRegistry::default();
        let (open_tx, mut open_rx) = mpsc::unbounded_channel();
        let (closed_tx, closed_rx) = mpsc::unbounded_channel();
        drop(closed_rx);
        let _open = registry.insert(Subscriber::Channel(open_tx));
        let closed = registry.insert(Subscriber::Channel(closed_tx));

        let delivery = notify_all(&registry.snapshot(), &location());

        assert_eq!(delivery.closed, vec![closed.id()]);
        assert_eq!(open_rx.try_recv().ok(), Some(location()));
    }

    #[test]
    fn clear_removes_everything() {
        let mut registry = SubscriberRegistry::default();
        let _a = registry.insert(noop());
        registry.clear();
        assert!(registry.is_empty());
    }
}

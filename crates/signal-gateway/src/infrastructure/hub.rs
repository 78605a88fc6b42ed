//! In-process publish/subscribe hub.
//!
//! The hub is the broadcast side of the message bus.  Everything published
//! here (by sessions, by the relay, by anything holding an `Arc<BusHub>`) is
//! delivered to every subscriber whose topic prefix matches the envelope's
//! `to` field.
//!
//! # Delivery model
//!
//! Each subscriber owns a bounded Tokio channel of
//! [`SUBSCRIBER_QUEUE_CAPACITY`] envelopes.  Publishing walks the subscriber
//! list under a `std::sync::Mutex` and `try_send`s an `Arc<Envelope>` on each
//! match, so one payload is shared by all receivers without copying.
//!
//! A publish never waits on a slow reader.  When a subscriber's queue is
//! full the envelope is dropped for that subscriber only and a warning is
//! logged, the way a PUB socket drops at its high-water mark.
//!
//! The lock is only held while enqueuing, never across an `.await`.
//!
//! # Unsubscribing
//!
//! A [`Subscription`] removes itself from the hub when dropped.  Subscribers
//! whose receiver has already gone are pruned on the next matching publish.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use signal_bus::{topic_matches, Envelope};

use crate::application::publisher::{BusError, BusPublisher};

/// Envelopes a subscriber may have queued before new ones are dropped.
///
/// Matches ZeroMQ's default send high-water mark.
pub const SUBSCRIBER_QUEUE_CAPACITY: usize = 1000;

struct Subscriber {
    id: u64,
    prefix: String,
    tx: mpsc::Sender<Arc<Envelope>>,
}

#[derive(Default)]
struct HubInner {
    next_id: u64,
    closed: bool,
    subscribers: Vec<Subscriber>,
}

/// Shared topic-prefix broadcast hub.
///
/// # Example
///
/// ```rust
/// use signal_bus::Envelope;
/// use signal_gateway::infrastructure::BusHub;
///
/// let hub = BusHub::new();
/// let mut sub = hub.subscribe("T-abc");
///
/// hub.publish(Envelope::new("T-abc_1", "ZMQ2SIP", "0", b"{}".to_vec())).unwrap();
///
/// assert_eq!(sub.try_recv().unwrap().to, "T-abc_1");
/// ```
pub struct BusHub {
    inner: Mutex<HubInner>,
    capacity: usize,
}

impl BusHub {
    /// Creates an empty, open hub with [`SUBSCRIBER_QUEUE_CAPACITY`] per
    /// subscriber.
    pub fn new() -> Arc<Self> {
        Self::with_capacity(SUBSCRIBER_QUEUE_CAPACITY)
    }

    /// Creates an empty, open hub whose subscribers each queue at most
    /// `capacity` envelopes (at least one).
    pub fn with_capacity(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(HubInner::default()),
            capacity: capacity.max(1),
        })
    }

    /// A poisoned lock only means another thread panicked mid-publish; the
    /// subscriber list itself is still consistent.
    fn lock(&self) -> MutexGuard<'_, HubInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a subscriber for every envelope whose `to` starts with
    /// `prefix`.  An empty prefix receives everything.
    ///
    /// Subscribing to a closed hub returns a subscription that yields
    /// nothing.
    pub fn subscribe(self: &Arc<Self>, prefix: impl Into<String>) -> Subscription {
        let prefix = prefix.into();
        let (tx, rx) = mpsc::channel(self.capacity);

        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        if !inner.closed {
            inner.subscribers.push(Subscriber {
                id,
                prefix: prefix.clone(),
                tx,
            });
        }
        drop(inner);

        debug!("bus subscribe #{id} on '{prefix}'");
        Subscription {
            id,
            prefix,
            rx,
            hub: Arc::downgrade(self),
        }
    }

    /// Delivers `envelope` to every matching subscriber with room in its
    /// queue.
    ///
    /// Returns how many subscribers it was delivered to; subscribers with a
    /// full queue are skipped and not counted.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Closed`] once [`BusHub::close`] has been called.
    pub fn publish(&self, envelope: Envelope) -> Result<usize, BusError> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(BusError::Closed);
        }

        let envelope = Arc::new(envelope);
        let mut delivered = 0;
        inner.subscribers.retain(|sub| {
            if !topic_matches(&sub.prefix, &envelope.to) {
                return true;
            }
            match sub.tx.try_send(Arc::clone(&envelope)) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    warn!(
                        "bus subscriber #{} on '{}' is full, dropped envelope to '{}'",
                        sub.id, sub.prefix, envelope.to
                    );
                    true
                }
                // Receiver dropped without unsubscribing.
                Err(TrySendError::Closed(_)) => false,
            }
        });
        Ok(delivered)
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Shuts the hub down.
    ///
    /// Every subscription sees the end of its stream once it has drained
    /// what was already queued, and later publishes fail.
    pub fn close(&self) {
        let mut inner = self.lock();
        inner.closed = true;
        inner.subscribers.clear();
    }

    fn unsubscribe(&self, id: u64) {
        self.lock().subscribers.retain(|sub| sub.id != id);
    }
}

impl BusPublisher for BusHub {
    fn publish(&self, envelope: Envelope) -> Result<(), BusError> {
        BusHub::publish(self, envelope).map(|_| ())
    }
}

// ── Subscription ──────────────────────────────────────────────────────────────

/// Receiving end of one hub subscription.
///
/// Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    prefix: String,
    rx: mpsc::Receiver<Arc<Envelope>>,
    hub: Weak<BusHub>,
}

impl Subscription {
    /// Waits for the next delivered envelope.
    ///
    /// Returns `None` once the hub is closed and the queue is drained.
    /// Cancel-safe, so it can be used as a `tokio::select!` branch.
    pub async fn recv(&mut self) -> Option<Arc<Envelope>> {
        self.rx.recv().await
    }

    /// Returns the next queued envelope without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<Envelope>> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.unsubscribe(self.id);
            debug!("bus unsubscribe #{} on '{}'", self.id, self.prefix);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("prefix", &self.prefix)
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, task};

    fn env(to: &str) -> Envelope {
        Envelope::new(to, "ZMQ2SIP", "1", b"{}".to_vec())
    }

    #[test]
    fn test_publish_reaches_matching_prefix_only() {
        // Arrange
        let hub = BusHub::new();
        let mut a = hub.subscribe("T-a");
        let mut b = hub.subscribe("T-b");

        // Act
        let delivered = hub.publish(env("T-a_s1")).unwrap();

        // Assert
        assert_eq!(delivered, 1);
        assert_eq!(a.try_recv().unwrap().to, "T-a_s1");
        assert!(b.try_recv().is_none());
    }

    #[test]
    fn test_empty_prefix_receives_everything() {
        let hub = BusHub::new();
        let mut all = hub.subscribe("");

        hub.publish(env("ZMQ2SIP")).unwrap();
        hub.publish(env("T-x")).unwrap();

        assert_eq!(all.try_recv().unwrap().to, "ZMQ2SIP");
        assert_eq!(all.try_recv().unwrap().to, "T-x");
    }

    #[test]
    fn test_one_envelope_is_shared_between_subscribers() {
        let hub = BusHub::new();
        let mut a = hub.subscribe("T-");
        let mut b = hub.subscribe("T-a");

        hub.publish(env("T-a")).unwrap();

        let (x, y) = (a.try_recv().unwrap(), b.try_recv().unwrap());
        assert!(Arc::ptr_eq(&x, &y));
    }

    #[test]
    fn test_drop_unsubscribes() {
        let hub = BusHub::new();
        let sub = hub.subscribe("T-a");
        assert_eq!(hub.subscriber_count(), 1);

        drop(sub);

        assert_eq!(hub.subscriber_count(), 0);
        assert_eq!(hub.publish(env("T-a")).unwrap(), 0);
    }

    #[test]
    fn test_publish_after_close_fails() {
        let hub = BusHub::new();
        hub.close();

        assert_eq!(hub.publish(env("T-a")), Err(BusError::Closed));
    }

    #[test]
    fn test_subscribe_after_close_yields_nothing() {
        let hub = BusHub::new();
        hub.close();

        let mut sub = hub.subscribe("T-a");

        assert_eq!(hub.subscriber_count(), 0);
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn test_full_subscriber_drops_instead_of_growing() {
        // Arrange: a reader that never drains, next to one that does.
        let hub = BusHub::with_capacity(2);
        let mut stalled = hub.subscribe("T-a");
        let mut live = hub.subscribe("T-");

        // Act
        let mut delivered = Vec::new();
        for _ in 0..5 {
            delivered.push(hub.publish(env("T-a_s")).unwrap());
            assert!(live.try_recv().is_some());
        }

        // Assert: the stalled queue holds its capacity and nothing more,
        // and it stays subscribed.
        assert_eq!(delivered, vec![2, 2, 1, 1, 1]);
        assert!(stalled.try_recv().is_some());
        assert!(stalled.try_recv().is_some());
        assert!(stalled.try_recv().is_none());
        assert_eq!(hub.subscriber_count(), 2);
    }

    #[test]
    fn test_drained_subscriber_receives_again() {
        let hub = BusHub::with_capacity(1);
        let mut sub = hub.subscribe("T-a");
        hub.publish(env("T-a")).unwrap();
        assert_eq!(hub.publish(env("T-a")).unwrap(), 0);

        sub.try_recv().unwrap();

        assert_eq!(hub.publish(env("T-a")).unwrap(), 1);
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        let hub = BusHub::with_capacity(0);
        let mut sub = hub.subscribe("T-a");

        assert_eq!(hub.publish(env("T-a")).unwrap(), 1);
        assert!(sub.try_recv().is_some());
    }

    #[test]
    fn test_recv_wakes_on_publish() {
        // Arrange: a receiver parked on an empty queue.
        let hub = BusHub::new();
        let mut sub = hub.subscribe("T-a");
        let mut recv = task::spawn(sub.recv());
        assert_pending!(recv.poll());

        // Act
        hub.publish(env("T-a")).unwrap();

        // Assert
        assert!(recv.is_woken());
        let got = assert_ready!(recv.poll());
        assert_eq!(got.unwrap().to, "T-a");
    }

    #[test]
    fn test_close_ends_pending_recv() {
        let hub = BusHub::new();
        let mut sub = hub.subscribe("T-a");
        let mut recv = task::spawn(sub.recv());
        assert_pending!(recv.poll());

        hub.close();

        assert!(assert_ready!(recv.poll()).is_none());
    }

    #[test]
    fn test_subscription_outliving_hub_drops_cleanly() {
        let hub = BusHub::new();
        let sub = hub.subscribe("T-a");
        drop(hub);
        drop(sub);
    }

    #[test]
    fn test_hub_as_trait_object() {
        let hub = BusHub::new();
        let mut sub = hub.subscribe("ZMQ2SIP");
        let publisher: Arc<dyn BusPublisher> = hub.clone();

        publisher.publish(env("ZMQ2SIP")).unwrap();

        assert!(sub.try_recv().is_some());
    }
}

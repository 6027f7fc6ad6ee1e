//! In-process publish/subscribe fan-out for session events.
//!
//! Every subscriber owns an independent, unbounded FIFO queue; a
//! publish pushes the event onto every queue that exists at that
//! moment. Late subscribers never see earlier events. Blocking reads
//! return a [`Event::Timeout`] sentinel on expiry instead of failing,
//! so long-poll callers can simply retry.

use crate::events::Event;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// How long a blocking `next` waits before returning the timeout
/// sentinel. Matches the long-poll guard at the HTTP boundary.
pub const NEXT_EVENT_TIMEOUT: Duration = Duration::from_secs(120);

struct SubscriberSlot {
    id: u64,
    sender: Sender<Event>,
}

/// Handle to one subscriber queue.
///
/// Dropping the handle without calling [`EventBus::unsubscribe`] is
/// harmless: publishes to a disconnected queue are silently skipped.
pub struct Subscription {
    id: u64,
    receiver: Receiver<Event>,
}

/// Multi-subscriber event distribution bus.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<SubscriberSlot>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber with an empty queue.
    pub fn subscribe(&self) -> Subscription {
        let (sender, receiver) = unbounded();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut subs = self.lock_subscribers();
        subs.push(SubscriberSlot { id, sender });
        Subscription { id, receiver }
    }

    /// Remove a subscriber. Safe to call while publishes are in
    /// flight; a publish that already snapshotted the subscriber list
    /// delivers into the (now orphaned) queue, which is then dropped.
    pub fn unsubscribe(&self, subscription: &Subscription) {
        let mut subs = self.lock_subscribers();
        subs.retain(|slot| slot.id != subscription.id);
    }

    /// Fan the event out to every currently-subscribed queue.
    pub fn publish(&self, event: Event) {
        // Snapshot the sender list so delivery never holds the lock.
        let senders: Vec<Sender<Event>> = {
            let subs = self.lock_subscribers();
            subs.iter().map(|slot| slot.sender.clone()).collect()
        };
        for sender in senders {
            // A closed queue means the subscriber already went away.
            let _ = sender.send(event.clone());
        }
    }

    /// Block up to `timeout` for the subscriber's next event.
    pub fn next(&self, subscription: &Subscription, timeout: Duration) -> Event {
        subscription
            .receiver
            .recv_timeout(timeout)
            .unwrap_or(Event::Timeout)
    }

    /// Non-blocking read, used to drain queued events into a batch.
    pub fn try_next(&self, subscription: &Subscription) -> Option<Event> {
        subscription.receiver.try_recv().ok()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.lock_subscribers().len()
    }

    fn lock_subscribers(&self) -> std::sync::MutexGuard<'_, Vec<SubscriberSlot>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

//! Process-wide named-event broadcast.
//!
//! A minimal synchronous pub/sub primitive: subscribers register against an
//! event name and are invoked in registration order when that name is
//! emitted. Carries no payload: listeners re-read whatever state the event
//! refers to, which is always a complete snapshot because emission happens
//! only after a mutation has fully persisted.

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Identifier for an event-bus subscriber.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriberId(pub u64);

type Callback = Mutex<Box<dyn FnMut() + Send>>;

struct Subscriber {
    id: SubscriberId,
    event: String,
    callback: Arc<Callback>,
    active: Arc<AtomicBool>,
}

/// Synchronous named-event bus.
pub struct EventBus {
    subscribers: RwLock<Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a callback for `event`. The callback is not invoked until the
    /// next emission.
    pub fn subscribe(&self, event: &str, callback: impl FnMut() + Send + 'static) -> SubscriberId {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.subscribers.write().push(Subscriber {
            id,
            event: event.to_string(),
            callback: Arc::new(Mutex::new(Box::new(callback))),
            active: Arc::new(AtomicBool::new(true)),
        });
        id
    }

    /// Remove a subscriber. Idempotent; after this returns the callback is
    /// never invoked again.
    pub fn unsubscribe(&self, id: SubscriberId) {
        let mut subs = self.subscribers.write();
        if let Some(pos) = subs.iter().position(|s| s.id == id) {
            let sub = subs.remove(pos);
            sub.active.store(false, Ordering::SeqCst);
        }
    }

    /// Invoke every subscriber registered for `event`, in registration order.
    pub fn emit(&self, event: &str) {
        // Clone handles out of the lock so callbacks can subscribe or
        // unsubscribe without deadlocking.
        let matching: Vec<(Arc<Callback>, Arc<AtomicBool>)> = self
            .subscribers
            .read()
            .iter()
            .filter(|s| s.event == event)
            .map(|s| (Arc::clone(&s.callback), Arc::clone(&s.active)))
            .collect();

        for (callback, active) in matching {
            let mut cb = callback.lock();
            if active.load(Ordering::SeqCst) {
                cb();
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

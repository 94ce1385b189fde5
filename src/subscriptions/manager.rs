//! Subscription registry keyed by collection.
//!
//! A mutation to collection X re-evaluates only the subscriptions registered
//! against X; within a collection, callbacks run in registration order.
//! Delivery is synchronous: by the time a notify call returns, every live
//! subscriber has seen the new result.

use crate::query::{evaluate, Query, QuerySnapshot};
use crate::types::Document;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use super::types::{QueryCallback, SubscriptionId};

struct Subscription {
    query: Query,
    callback: Arc<Mutex<QueryCallback>>,
    /// Cleared on unsubscribe; checked under the callback lock so a removed
    /// subscriber is never invoked again.
    active: Arc<AtomicBool>,
}

#[derive(Default)]
struct Inner {
    subscriptions: HashMap<SubscriptionId, Subscription>,
    /// Registration order per collection.
    by_collection: HashMap<String, Vec<SubscriptionId>>,
}

/// Tracks active (query, callback) pairs and re-delivers results on change.
pub struct SubscriptionRegistry {
    inner: RwLock<Inner>,
    next_id: AtomicU64,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a (query, callback) pair. The initial synchronous delivery is
    /// driven by the store via [`deliver_to`](Self::deliver_to).
    pub fn register(&self, query: Query, callback: QueryCallback) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let collection = query.collection_name().to_string();

        let mut inner = self.inner.write();
        inner.subscriptions.insert(
            id,
            Subscription {
                query,
                callback: Arc::new(Mutex::new(callback)),
                active: Arc::new(AtomicBool::new(true)),
            },
        );
        inner.by_collection.entry(collection).or_default().push(id);
        id
    }

    /// Remove a subscription. Idempotent; once this returns the callback
    /// receives no further invocations.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut inner = self.inner.write();
        if let Some(sub) = inner.subscriptions.remove(&id) {
            sub.active.store(false, Ordering::SeqCst);
            let collection = sub.query.collection_name().to_string();
            if let Some(order) = inner.by_collection.get_mut(&collection) {
                order.retain(|s| *s != id);
            }
        }
    }

    /// Evaluate and deliver the current result to a single subscription.
    pub fn deliver_to(&self, id: SubscriptionId, snapshot: &[Document]) {
        let target = {
            let inner = self.inner.read();
            inner.subscriptions.get(&id).map(|sub| {
                (
                    evaluate(snapshot, &sub.query),
                    Arc::clone(&sub.callback),
                    Arc::clone(&sub.active),
                )
            })
        };

        if let Some((result, callback, active)) = target {
            Self::invoke(&callback, &active, result);
        }
    }

    /// Re-evaluate and deliver to every subscription on `collection`, in
    /// registration order.
    pub fn notify_collection(&self, collection: &str, snapshot: &[Document]) {
        // Evaluate under the read lock, invoke outside it, so a callback can
        // subscribe or unsubscribe without deadlocking.
        let deliveries: Vec<(QuerySnapshot, Arc<Mutex<QueryCallback>>, Arc<AtomicBool>)> = {
            let inner = self.inner.read();
            let Some(order) = inner.by_collection.get(collection) else {
                return;
            };
            order
                .iter()
                .filter_map(|id| inner.subscriptions.get(id))
                .map(|sub| {
                    (
                        QuerySnapshot::new(evaluate(snapshot, &sub.query)),
                        Arc::clone(&sub.callback),
                        Arc::clone(&sub.active),
                    )
                })
                .collect()
        };

        for (result, callback, active) in deliveries {
            let mut cb = callback.lock();
            if active.load(Ordering::SeqCst) {
                cb(result);
            }
        }
    }

    fn invoke(callback: &Arc<Mutex<QueryCallback>>, active: &AtomicBool, result: Vec<Document>) {
        let mut cb = callback.lock();
        if active.load(Ordering::SeqCst) {
            cb(QuerySnapshot::new(result));
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.read().subscriptions.len()
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

//! The document store facade.
//!
//! `Store` is the sole owner of all collections: it loads the durable blob at
//! creation, applies mutations through the only writer path, persists before
//! notifying, and drives live-query subscriptions.

use crate::collections::CollectionSet;
use crate::error::{Result, StoreError};
use crate::query::{evaluate, Query, QuerySnapshot};
use crate::storage::StorageBackend;
use crate::subscriptions::{SubscriptionId, SubscriptionRegistry};
use crate::types::{Document, DocumentId, DocumentRef, Fields};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Store configuration.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Backend key the collection blob is stored under.
    pub data_key: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_key: "documents".to_string(),
        }
    }
}

/// Store statistics.
#[derive(Clone, Debug, Default)]
pub struct StoreStats {
    pub collection_count: usize,
    pub document_count: usize,
    pub subscription_count: usize,
}

/// The document store.
///
/// Every mutating call runs mutate -> persist -> notify to completion under a
/// write mutex, so a listener reading storage after being notified always
/// sees the mutation, and a delivered snapshot never reflects a half-applied
/// write.
pub struct Store {
    config: StoreConfig,

    /// Durable blob storage.
    backend: Arc<dyn StorageBackend>,

    /// The single shared mutable resource; every read handed out is a copy.
    data: RwLock<CollectionSet>,

    /// Live-query subscriptions, keyed by collection.
    subscriptions: SubscriptionRegistry,

    /// Serializes the mutate -> persist -> notify sequence.
    write_lock: Mutex<()>,

    /// Held from snapshot capture through dispatch, so concurrent writers'
    /// notifications cannot cross and deliver a stale snapshot after a newer
    /// one. Reentrant: a callback may mutate the store from inside a
    /// dispatch, nesting synchronously on the same thread.
    notify_lock: ReentrantMutex<()>,

    /// Per-process counter folded into generated document ids.
    next_seq: AtomicU64,
}

impl Store {
    /// Open a store with default configuration, loading its initial state
    /// from the backend.
    pub fn open(backend: Arc<dyn StorageBackend>) -> Result<Self> {
        Self::open_with(backend, StoreConfig::default())
    }

    /// Open a store. An unreadable or malformed blob fails closed to an
    /// empty, valid store rather than propagating a crash.
    pub fn open_with(backend: Arc<dyn StorageBackend>, config: StoreConfig) -> Result<Self> {
        let data = match backend.load(&config.data_key)? {
            None => CollectionSet::new(),
            Some(blob) => match CollectionSet::from_blob(&blob) {
                Ok(set) => set,
                Err(e) => {
                    tracing::warn!(key = %config.data_key, error = %e, "malformed store blob, starting empty");
                    CollectionSet::new()
                }
            },
        };

        Ok(Self {
            config,
            backend,
            data: RwLock::new(data),
            subscriptions: SubscriptionRegistry::new(),
            write_lock: Mutex::new(()),
            notify_lock: ReentrantMutex::new(()),
            next_seq: AtomicU64::new(1),
        })
    }

    // --- Reads ---

    /// Snapshot copy of a collection. Later mutation cannot corrupt the
    /// returned documents. Unknown collections are empty.
    pub fn read(&self, collection: &str) -> Vec<Document> {
        self.data.read().snapshot(collection)
    }

    /// One-shot query evaluation against the current snapshot.
    pub fn query(&self, query: &Query) -> QuerySnapshot {
        let snapshot = self.read(query.collection_name());
        QuerySnapshot::new(evaluate(&snapshot, query))
    }

    // --- Mutations ---

    /// Create a document with a generated collision-free id. Persists the
    /// whole store synchronously, then notifies subscribers on the
    /// collection.
    pub fn create_document(&self, collection: &str, fields: Fields) -> Result<DocumentId> {
        let guard = self.write_lock.lock();

        let id = self.generate_id();
        let mut staged = self.data.read().clone();
        staged.insert(collection, Document::new(id.clone(), fields));
        self.commit(staged)?;

        let snapshot = self.read(collection);
        let notifying = self.notify_lock.lock();
        drop(guard);
        tracing::debug!(collection, %id, "document created");
        self.subscriptions.notify_collection(collection, &snapshot);
        drop(notifying);
        Ok(id)
    }

    /// Shallow-merge `patch` into the referenced document. A missing
    /// reference is an explicit error, not a silent no-op.
    pub fn update_document(&self, doc_ref: &DocumentRef, patch: Fields) -> Result<()> {
        let guard = self.write_lock.lock();

        let mut staged = self.data.read().clone();
        if !staged.merge(&doc_ref.collection, &doc_ref.id, &patch) {
            return Err(StoreError::DocumentNotFound {
                collection: doc_ref.collection.clone(),
                id: doc_ref.id.clone(),
            });
        }
        self.commit(staged)?;

        let snapshot = self.read(&doc_ref.collection);
        let notifying = self.notify_lock.lock();
        drop(guard);
        self.subscriptions
            .notify_collection(&doc_ref.collection, &snapshot);
        drop(notifying);
        Ok(())
    }

    /// Delete the referenced document. Returns whether a document was
    /// removed; deleting an absent document is an inert, reported outcome.
    pub fn delete_document(&self, doc_ref: &DocumentRef) -> Result<bool> {
        let guard = self.write_lock.lock();

        let mut staged = self.data.read().clone();
        if !staged.remove(&doc_ref.collection, &doc_ref.id) {
            return Ok(false);
        }
        self.commit(staged)?;

        let snapshot = self.read(&doc_ref.collection);
        let notifying = self.notify_lock.lock();
        drop(guard);
        tracing::debug!(doc = %doc_ref, "document deleted");
        self.subscriptions
            .notify_collection(&doc_ref.collection, &snapshot);
        drop(notifying);
        Ok(true)
    }

    /// Apply a batch of shallow merges atomically: a dangling reference
    /// aborts the whole batch with nothing written, visible, or persisted.
    /// On success the store persists once and notifies each affected
    /// collection once.
    pub fn batch_update(&self, updates: Vec<(DocumentRef, Fields)>) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }
        let guard = self.write_lock.lock();

        // Every merge lands on the staged copy; a dangling reference aborts
        // before anything is committed. Affected collections keep
        // first-touched order.
        let mut staged = self.data.read().clone();
        let mut affected: Vec<String> = Vec::new();
        for (index, (doc_ref, patch)) in updates.iter().enumerate() {
            if !staged.merge(&doc_ref.collection, &doc_ref.id, patch) {
                tracing::warn!(doc = %doc_ref, index, "batch aborted, nothing applied");
                return Err(StoreError::BatchAborted {
                    index,
                    source: Box::new(StoreError::DocumentNotFound {
                        collection: doc_ref.collection.clone(),
                        id: doc_ref.id.clone(),
                    }),
                });
            }
            if !affected.contains(&doc_ref.collection) {
                affected.push(doc_ref.collection.clone());
            }
        }
        self.commit(staged)?;

        let snapshots: Vec<(String, Vec<Document>)> = affected
            .into_iter()
            .map(|c| {
                let snap = self.read(&c);
                (c, snap)
            })
            .collect();
        let notifying = self.notify_lock.lock();
        drop(guard);
        tracing::debug!(updates = updates.len(), "batch committed");
        for (collection, snapshot) in snapshots {
            self.subscriptions.notify_collection(&collection, &snapshot);
        }
        drop(notifying);
        Ok(())
    }

    // --- Subscriptions ---

    /// Register a live query. The callback is invoked synchronously once with
    /// the current matching result before this returns, and again after every
    /// mutation to the queried collection.
    pub fn subscribe(
        &self,
        query: Query,
        callback: impl FnMut(QuerySnapshot) + Send + 'static,
    ) -> SubscriptionId {
        let collection = query.collection_name().to_string();
        let id = self.subscriptions.register(query, Box::new(callback));

        // Under the notify lock, so the initial delivery cannot land after a
        // concurrent mutation already delivered a newer result.
        let notifying = self.notify_lock.lock();
        let snapshot = self.read(&collection);
        self.subscriptions.deliver_to(id, &snapshot);
        drop(notifying);
        id
    }

    /// Cancel a subscription. Idempotent; once this returns the callback is
    /// guaranteed to receive no further invocations.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscriptions.unsubscribe(id);
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.subscription_count()
    }

    // --- Typed boundary ---

    /// Typed view over `T`'s collection.
    pub fn collection<T: crate::typed::Entity>(&self) -> crate::typed::TypedCollection<'_, T> {
        crate::typed::TypedCollection::new(self)
    }

    // --- Store operations ---

    pub fn stats(&self) -> StoreStats {
        let data = self.data.read();
        StoreStats {
            collection_count: data.collection_count(),
            document_count: data.document_count(),
            subscription_count: self.subscriptions.subscription_count(),
        }
    }

    // --- Private helpers ---

    /// Epoch microseconds plus a per-process counter; collision-free within
    /// and across sessions.
    fn generate_id(&self) -> DocumentId {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros())
            .unwrap_or(0);
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        DocumentId::new(format!("doc_{micros}_{seq}"))
    }

    /// Persist a staged collection set, then make it current. On failure the
    /// in-memory state is untouched, so reads never show a mutation the
    /// backend rejected.
    fn commit(&self, staged: CollectionSet) -> Result<()> {
        let blob = staged.to_blob()?;
        self.backend.store(&self.config.data_key, &blob)?;
        *self.data.write() = staged;
        Ok(())
    }
}

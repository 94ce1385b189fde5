//! Optimistic list reordering with debounced persistence.
//!
//! The reconciler sits between a live subscription and the mutation API. A
//! user reorder updates the displayed order immediately; a quiet period later
//! (no further reorders), the new ranks are persisted in one atomic batch.
//! Remote snapshots always win while a reorder is pending: there is no merge,
//! and an in-flight local reorder can be overwritten (with a warning logged).

use crate::query::{Query, SortDirection};
use crate::store::Store;
use crate::types::{Document, DocumentId, DocumentRef, Fields, Value};
use crossbeam_channel::{unbounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Field holding the application-level rank of a list item.
pub const RANK_FIELD: &str = "order";

/// Reconciler configuration.
#[derive(Clone, Debug)]
pub struct ReconcilerConfig {
    /// Quiet period before a pending reorder is persisted.
    pub debounce: Duration,
    /// Numeric field the rank is written to.
    pub rank_field: String,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(1),
            rank_field: RANK_FIELD.to_string(),
        }
    }
}

/// Whether the displayed order matches the last store-derived order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncState {
    Synced,
    Diverged,
}

struct ListState {
    /// Last order derived from the store.
    baseline: Vec<Document>,
    /// Displayed order, possibly ahead of the store.
    local: Vec<Document>,
    sync: SyncState,
    /// True while a reorder awaits flushing. Cleared when the flush is
    /// issued so the single pending write is never duplicated.
    dirty: bool,
}

struct Inner {
    store: Arc<Store>,
    collection: String,
    rank_field: String,
    state: Mutex<ListState>,
    /// Wakes the worker; a failed flush re-arms itself through this.
    tx: Sender<WorkerMsg>,
}

enum WorkerMsg {
    /// A reorder happened; restart the debounce window.
    Kick,
    Shutdown,
}

/// Reconciles a user-driven list order against the store.
///
/// Owns a single worker thread implementing the cancellable deferred flush:
/// every reorder restarts the quiet-period wait, and at most one flush is
/// pending at a time.
pub struct OrderingReconciler {
    inner: Arc<Inner>,
    worker: Option<JoinHandle<()>>,
}

impl OrderingReconciler {
    pub fn new(store: Arc<Store>, collection: impl Into<String>) -> Self {
        Self::with_config(store, collection, ReconcilerConfig::default())
    }

    pub fn with_config(
        store: Arc<Store>,
        collection: impl Into<String>,
        config: ReconcilerConfig,
    ) -> Self {
        let (tx, rx) = unbounded();
        let inner = Arc::new(Inner {
            store,
            collection: collection.into(),
            rank_field: config.rank_field,
            state: Mutex::new(ListState {
                baseline: Vec::new(),
                local: Vec::new(),
                sync: SyncState::Synced,
                dirty: false,
            }),
            tx,
        });

        let worker_inner = Arc::clone(&inner);
        let debounce = config.debounce;
        let worker = std::thread::spawn(move || loop {
            match rx.recv() {
                Ok(WorkerMsg::Kick) => loop {
                    match rx.recv_timeout(debounce) {
                        // Another reorder before the window closed: the
                        // pending flush is cancelled and rescheduled.
                        Ok(WorkerMsg::Kick) => continue,
                        Ok(WorkerMsg::Shutdown) => return,
                        Err(RecvTimeoutError::Timeout) => {
                            Self::flush(&worker_inner);
                            break;
                        }
                        Err(RecvTimeoutError::Disconnected) => return,
                    }
                },
                Ok(WorkerMsg::Shutdown) | Err(_) => return,
            }
        });

        Self {
            inner,
            worker: Some(worker),
        }
    }

    /// The query whose live results this reconciler consumes.
    pub fn query(&self) -> Query {
        Query::collection(self.inner.collection.clone())
            .order_by(self.inner.rank_field.clone(), SortDirection::Ascending)
    }

    /// Feed a store-derived snapshot (ordered documents) into the reconciler.
    ///
    /// While synced, the snapshot becomes both the displayed order and the
    /// baseline. While diverged, the remote order wins: if it matches the
    /// local order the pending reorder has round-tripped and the reconciler
    /// returns to synced; otherwise the pending local order is discarded.
    pub fn observe(&self, remote: Vec<Document>) {
        let mut st = self.inner.state.lock();
        if st.sync == SyncState::Diverged && !same_order(&remote, &st.local) {
            tracing::warn!(
                collection = %self.inner.collection,
                "remote order overwrites pending local reorder"
            );
        }
        st.baseline = remote.clone();
        st.local = remote;
        st.sync = SyncState::Synced;
        st.dirty = false;
    }

    /// Apply a user drag-reorder. The displayed order updates immediately;
    /// persistence happens after the debounce window with no further
    /// reorders.
    ///
    /// `ids` gives the new order; documents missing from it keep their
    /// relative position at the end.
    pub fn reorder(&self, ids: &[DocumentId]) {
        {
            let mut st = self.inner.state.lock();
            let mut remaining = std::mem::take(&mut st.local);
            let mut next: Vec<Document> = Vec::with_capacity(remaining.len());
            for id in ids {
                if let Some(pos) = remaining.iter().position(|d| &d.id == id) {
                    next.push(remaining.remove(pos));
                }
            }
            next.extend(remaining);
            st.local = next;
            st.sync = SyncState::Diverged;
            st.dirty = true;
        }
        let _ = self.inner.tx.send(WorkerMsg::Kick);
    }

    /// Current displayed order.
    pub fn current(&self) -> Vec<Document> {
        self.inner.state.lock().local.clone()
    }

    pub fn sync_state(&self) -> SyncState {
        self.inner.state.lock().sync
    }

    /// Persist a pending reorder immediately, without waiting for the quiet
    /// period. No-op when nothing is pending.
    pub fn flush_now(&self) {
        Self::flush(&self.inner);
    }

    fn flush(inner: &Inner) {
        let updates = {
            let mut st = inner.state.lock();
            if st.sync != SyncState::Diverged || !st.dirty {
                return;
            }

            // Nothing to persist if the order drifted back to the baseline.
            if same_order(&st.local, &st.baseline) {
                st.sync = SyncState::Synced;
                st.dirty = false;
                return;
            }

            st.dirty = false;
            rank_updates(&inner.collection, &inner.rank_field, &st.local)
        };

        if updates.is_empty() {
            return;
        }

        let count = updates.len();
        match inner.store.batch_update(updates) {
            Ok(()) => {
                tracing::debug!(collection = %inner.collection, count, "persisted reorder");
            }
            Err(e) => {
                // Non-fatal: stay diverged and re-arm the debounce so the
                // retry happens after the next quiet period by itself.
                tracing::warn!(collection = %inner.collection, error = %e, "reorder flush failed");
                inner.state.lock().dirty = true;
                let _ = inner.tx.send(WorkerMsg::Kick);
            }
        }
    }
}

impl Drop for OrderingReconciler {
    fn drop(&mut self) {
        let _ = self.inner.tx.send(WorkerMsg::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// One rank update per item whose rank differs from its position index.
fn rank_updates(
    collection: &str,
    rank_field: &str,
    local: &[Document],
) -> Vec<(DocumentRef, Fields)> {
    local
        .iter()
        .enumerate()
        .filter(|(index, doc)| {
            doc.get(rank_field).and_then(Value::as_f64) != Some(*index as f64)
        })
        .map(|(index, doc)| {
            let mut patch = Fields::new();
            patch.insert(rank_field.to_string(), Value::Int(index as i64));
            (
                DocumentRef::new(collection, doc.id.clone()),
                patch,
            )
        })
        .collect()
}

fn same_order(a: &[Document], b: &[Document]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.id == y.id)
}

/// Rank for a newly created item: one below the minimum existing rank
/// (missing ranks count as zero), so the item sorts first on the next
/// evaluation.
pub fn front_rank(docs: &[Document], rank_field: &str) -> f64 {
    let min = docs
        .iter()
        .map(|d| d.get(rank_field).and_then(Value::as_f64).unwrap_or(0.0))
        .fold(f64::INFINITY, f64::min);
    if min.is_finite() {
        min - 1.0
    } else {
        -1.0
    }
}

//! # Shoebox
//!
//! An embedded reactive document store: collections of open-field documents,
//! filtered and sorted live queries, and debounced optimistic list
//! reordering, all on top of local durable storage.
//!
//! ## Core Concepts
//!
//! - **Documents**: uniquely identified records with open field bags
//! - **Queries**: conjunctive equality filters plus an optional sort
//! - **Subscriptions**: live results, delivered synchronously on every change
//! - **Reconciler**: optimistic drag-reorder with debounced rank persistence
//!
//! ## Example
//!
//! ```
//! use shoebox::{MemoryBackend, Query, SortDirection, Store};
//! use std::sync::Arc;
//!
//! let store = Store::open(Arc::new(MemoryBackend::new()))?;
//!
//! let mut fields = shoebox::Fields::new();
//! fields.insert("title".into(), "buy milk".into());
//! fields.insert("order".into(), 0i64.into());
//! store.create_document("tasks", fields)?;
//!
//! let query = Query::collection("tasks").order_by("order", SortDirection::Ascending);
//! let handle = store.subscribe(query, |snapshot| {
//!     println!("{} tasks", snapshot.len());
//! });
//! store.unsubscribe(handle);
//! # Ok::<(), shoebox::StoreError>(())
//! ```

pub mod collections;
pub mod error;
pub mod query;
pub mod reorder;
pub mod session;
pub mod signal;
pub mod storage;
pub mod store;
pub mod subscriptions;
pub mod typed;
pub mod types;

// Re-exports
pub use collections::CollectionSet;
pub use error::{Result, StoreError};
pub use query::{evaluate, Query, QuerySnapshot, SortDirection};
pub use reorder::{front_rank, OrderingReconciler, ReconcilerConfig, SyncState, RANK_FIELD};
pub use session::{SessionStore, SessionUser};
pub use signal::{EventBus, SubscriberId};
pub use storage::{FileBackend, MemoryBackend, StorageBackend};
pub use store::{Store, StoreConfig, StoreStats};
pub use subscriptions::{SubscriptionId, SubscriptionRegistry};
pub use typed::{Entity, TypedCollection};
pub use types::{Document, DocumentId, DocumentRef, Fields, Timestamp, Value};

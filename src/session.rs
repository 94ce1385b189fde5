//! Session user persistence.
//!
//! The current session's user record lives in its own durable blob with its
//! own change signal, independently lifecycled from document data: signing in
//! or out never touches the collection blob and never wakes document
//! subscribers.

use crate::error::Result;
use crate::signal::{EventBus, SubscriberId};
use crate::storage::StorageBackend;
use crate::types::Timestamp;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

const AUTH_CHANGE: &str = "auth-change";

/// The signed-in user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionUser {
    pub uid: String,
    pub email: String,
    pub created_at: Timestamp,
}

/// Holds the current session user and persists it on every change.
pub struct SessionStore {
    backend: Arc<dyn StorageBackend>,
    key: String,
    current: RwLock<Option<SessionUser>>,
    bus: EventBus,
    next_seq: AtomicU64,
}

impl SessionStore {
    /// Open the session store, loading any persisted user. A malformed
    /// session blob fails closed to signed-out.
    pub fn open(backend: Arc<dyn StorageBackend>) -> Result<Self> {
        Self::open_with_key(backend, "session")
    }

    pub fn open_with_key(backend: Arc<dyn StorageBackend>, key: &str) -> Result<Self> {
        // The blob holds either a user record or `null` for signed-out.
        let current = match backend.load(key)? {
            None => None,
            Some(blob) => match serde_json::from_str::<Option<SessionUser>>(&blob) {
                Ok(user) => user,
                Err(e) => {
                    tracing::warn!(key, error = %e, "malformed session blob, starting signed out");
                    None
                }
            },
        };

        Ok(Self {
            backend,
            key: key.to_string(),
            current: RwLock::new(current),
            bus: EventBus::new(),
            next_seq: AtomicU64::new(1),
        })
    }

    /// Sign in as `email`, generating a fresh uid. Persists, then signals.
    pub fn sign_in(&self, email: &str) -> Result<SessionUser> {
        let user = SessionUser {
            uid: self.generate_uid(),
            email: email.to_string(),
            created_at: Timestamp::now(),
        };

        let blob = serde_json::to_string(&user)?;
        self.backend.store(&self.key, &blob)?;
        *self.current.write() = Some(user.clone());

        self.bus.emit(AUTH_CHANGE);
        Ok(user)
    }

    /// Sign out. Idempotent; persists the signed-out state, then signals.
    pub fn sign_out(&self) -> Result<()> {
        self.backend.store(&self.key, "null")?;
        *self.current.write() = None;
        self.bus.emit(AUTH_CHANGE);
        Ok(())
    }

    pub fn current_user(&self) -> Option<SessionUser> {
        self.current.read().clone()
    }

    /// Watch for sign-in/sign-out. The callback fires synchronously once on
    /// registration, then after every change.
    pub fn on_change(
        &self,
        mut callback: impl FnMut(Option<SessionUser>) + Send + 'static,
    ) -> SubscriberId {
        callback(self.current_user());

        // The callback cannot borrow self, so it re-reads the blob on every
        // signal; persistence completes before emission, so it always sees
        // the state the signal announced.
        let backend = Arc::clone(&self.backend);
        let key = self.key.clone();
        self.bus.subscribe(AUTH_CHANGE, move || {
            let user = backend
                .load(&key)
                .ok()
                .flatten()
                .and_then(|blob| serde_json::from_str::<Option<SessionUser>>(&blob).ok())
                .flatten();
            callback(user);
        })
    }

    /// Stop watching. Idempotent.
    pub fn unsubscribe(&self, id: SubscriberId) {
        self.bus.unsubscribe(id);
    }

    fn generate_uid(&self) -> String {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros())
            .unwrap_or(0);
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        format!("user_{micros}_{seq}")
    }
}

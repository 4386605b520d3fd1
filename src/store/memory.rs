//! In-memory realtime store.
//!
//! DESIGN
//! ======
//! One JSON tree behind a mutex, plus a version counter bumped on every
//! mutation. Transactions snapshot `(value, version)`, run the transform with
//! the lock released, and commit only if the version has not moved; otherwise
//! they re-run against the fresh value. That is the same optimistic contract
//! the hosted database offers, so client code exercised here behaves the same
//! against the real thing.
//!
//! Every mutation pushes the full value at each overlapping subscribed path.
//! Sends happen under the lock on unbounded channels, so each subscriber sees
//! snapshots in commit order and the latest one is never dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::path;
use super::push_id::PushIdGenerator;
use super::{MAX_TRANSACTION_RETRIES, RealtimeStore, Snapshot, StoreError, Subscription, TransactionOutcome, TransformFn};

// =============================================================================
// STATE
// =============================================================================

struct Subscriber {
    path: Vec<String>,
    tx: mpsc::UnboundedSender<Snapshot>,
}

#[derive(Default)]
struct Inner {
    root: Value,
    version: u64,
    offline: bool,
    next_subscriber: u64,
    subscribers: HashMap<u64, Subscriber>,
}

impl Inner {
    fn ensure_online(&self) -> Result<(), StoreError> {
        if self.offline {
            return Err(StoreError::Unavailable("memory store is offline".into()));
        }
        Ok(())
    }

    fn apply(&mut self, segs: &[String], value: Option<Value>) {
        path::set(&mut self.root, segs, value);
        self.version += 1;
        self.notify(segs);
    }

    fn notify(&mut self, changed: &[String]) {
        let root = &self.root;
        self.subscribers.retain(|id, sub| {
            if !path::overlaps(&sub.path, changed) {
                return true;
            }
            let snapshot = path::get(root, &sub.path).cloned();
            if sub.tx.send(snapshot).is_err() {
                debug!(subscriber = id, "subscriber gone; removing");
                return false;
            }
            true
        });
    }
}

/// Shared in-process store. Clones share the same tree.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    ids: Arc<PushIdGenerator>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing tree.
    #[must_use]
    pub fn with_root(root: Value) -> Self {
        let store = Self::new();
        store.lock().root = path::normalize(root).unwrap_or(Value::Null);
        store
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Make every subsequent operation fail with [`StoreError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Read the value at `path` without subscribing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidPath`] on a malformed path.
    pub fn get(&self, path: &str) -> Result<Snapshot, StoreError> {
        let segs = path::segments(path)?;
        Ok(path::get(&self.lock().root, &segs).cloned())
    }

    /// Synchronous write. Usable from inside a transform to simulate a
    /// competing client.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a malformed path or when offline.
    pub fn write_now(&self, path: &str, value: Value) -> Result<(), StoreError> {
        let segs = path::segments(path)?;
        let mut inner = self.lock();
        inner.ensure_online()?;
        inner.apply(&segs, Some(value));
        Ok(())
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }
}

fn unsubscribe(inner: &Weak<Mutex<Inner>>, id: u64) {
    let Some(inner) = inner.upgrade() else {
        return;
    };
    let mut guard = match inner.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    guard.subscribers.remove(&id);
}

#[async_trait::async_trait]
impl RealtimeStore for MemoryStore {
    async fn write(&self, path: &str, value: Value) -> Result<(), StoreError> {
        self.write_now(path, value)
    }

    async fn subscribe(&self, path: &str) -> Result<Subscription, StoreError> {
        let segs = path::segments(path)?;
        let (tx, rx) = mpsc::unbounded_channel();

        let id = {
            let mut inner = self.lock();
            inner.ensure_online()?;
            let id = inner.next_subscriber;
            inner.next_subscriber += 1;

            let _ = tx.send(path::get(&inner.root, &segs).cloned());
            inner.subscribers.insert(id, Subscriber { path: segs, tx });
            id
        };

        let weak = Arc::downgrade(&self.inner);
        Ok(Subscription::new(rx, move || unsubscribe(&weak, id)))
    }

    async fn create_child(&self, path: &str, value: Value) -> Result<String, StoreError> {
        let mut segs = path::segments(path)?;
        let key = self.ids.generate();
        segs.push(key.clone());

        let mut inner = self.lock();
        inner.ensure_online()?;
        inner.apply(&segs, Some(value));
        Ok(key)
    }

    async fn transact(&self, path: &str, transform: &TransformFn<'_>) -> Result<TransactionOutcome, StoreError> {
        let segs = path::segments(path)?;

        for attempt in 1..=MAX_TRANSACTION_RETRIES {
            let (base, version) = {
                let inner = self.lock();
                inner.ensure_online()?;
                (path::get(&inner.root, &segs).cloned(), inner.version)
            };

            let next = transform(base.clone()).and_then(path::normalize);

            {
                let mut inner = self.lock();
                inner.ensure_online()?;
                if inner.version == version {
                    if next != base {
                        inner.apply(&segs, next.clone());
                    }
                    return Ok(TransactionOutcome { snapshot: next, attempts: attempt });
                }
            }

            debug!(attempt, path = %path, "transaction base moved; retrying");
            tokio::task::yield_now().await;
        }

        warn!(path = %path, attempts = MAX_TRANSACTION_RETRIES, "transaction gave up");
        Err(StoreError::MaxRetries { attempts: MAX_TRANSACTION_RETRIES })
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;

//! Realtime store: the hosted tree database behind the vote client.
//!
//! ARCHITECTURE
//! ============
//! The client talks to the store only through [`RealtimeStore`], injected as
//! `Arc<dyn RealtimeStore>`. Two implementations exist:
//!
//! - [`memory::MemoryStore`]: in-process tree with real optimistic
//!   concurrency and snapshot fan-out. Used by tests and offline runs.
//! - [`firebase::FirebaseStore`]: the hosted database over its REST and
//!   server-sent-events interface.
//!
//! Values are JSON trees addressed by `/`-separated paths. A subscription
//! always delivers the full value at its path, never a delta; `None` means the
//! path is absent.

pub mod firebase;
pub mod memory;
pub mod path;
pub mod push_id;

use serde_json::Value;
use tokio::sync::mpsc;

/// A full-value snapshot. `None` when nothing is stored at the path.
pub type Snapshot = Option<Value>;

/// Transaction transform. Receives the current value and returns the value to
/// commit. May run several times, so it must be pure.
pub type TransformFn<'a> = dyn Fn(Option<Value>) -> Option<Value> + Send + Sync + 'a;

/// Attempts before a contended transaction gives up.
pub const MAX_TRANSACTION_RETRIES: usize = 25;

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("store responded with status {status}")]
    Api { status: u16, body: String },
    #[error("response decode failed: {0}")]
    Decode(String),
    #[error("transaction gave up after {attempts} attempts")]
    MaxRetries { attempts: usize },
}

impl crate::error::ErrorCode for StoreError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidPath(_) => "E_INVALID_PATH",
            Self::Unavailable(_) => "E_STORE_UNAVAILABLE",
            Self::Request(_) => "E_STORE_REQUEST",
            Self::Api { .. } => "E_STORE_API",
            Self::Decode(_) => "E_STORE_DECODE",
            Self::MaxRetries { .. } => "E_MAX_RETRIES",
        }
    }

    fn retryable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_) | Self::Request(_) | Self::MaxRetries { .. } | Self::Api { status: 429 | 500..=599, .. }
        )
    }
}

// =============================================================================
// TRANSACTIONS
// =============================================================================

/// Result of a committed transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionOutcome {
    /// Value at the path after commit.
    pub snapshot: Snapshot,
    /// How many times the transform ran before the commit stuck.
    pub attempts: usize,
}

// =============================================================================
// SUBSCRIPTION
// =============================================================================

/// Live feed of snapshots for one path. Dropping it unsubscribes.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Snapshot>,
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(rx: mpsc::UnboundedReceiver<Snapshot>, cancel: impl FnOnce() + Send + 'static) -> Self {
        Self { rx, cancel: Some(Box::new(cancel)) }
    }

    /// Wait for the next snapshot. `None` once the feed has ended.
    pub async fn recv(&mut self) -> Option<Snapshot> {
        self.rx.recv().await
    }

    /// Tear the feed down now.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("active", &self.cancel.is_some()).finish()
    }
}

// =============================================================================
// STORE TRAIT
// =============================================================================

/// Operations the vote client needs from the realtime database.
#[async_trait::async_trait]
pub trait RealtimeStore: Send + Sync {
    /// Unconditionally replace the value at `path`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on an invalid path or transport failure.
    async fn write(&self, path: &str, value: Value) -> Result<(), StoreError>;

    /// Subscribe to full-value snapshots at `path`. The current value is
    /// delivered first.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the feed cannot be opened.
    async fn subscribe(&self, path: &str) -> Result<Subscription, StoreError>;

    /// Append `value` under a store-generated key and return that key.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on an invalid path or transport failure.
    async fn create_child(&self, path: &str, value: Value) -> Result<String, StoreError>;

    /// Optimistic read-modify-write of the value at `path`. The transform is
    /// re-run against the latest value whenever a concurrent write wins.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MaxRetries`] when contention never settles, or a
    /// transport error.
    async fn transact(&self, path: &str, transform: &TransformFn<'_>) -> Result<TransactionOutcome, StoreError>;
}

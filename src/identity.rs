//! Client vote identity.
//!
//! DESIGN
//! ======
//! The device remembers exactly one identifier: the entry it last voted for.
//! It lives in a small key-value storage that survives restarts (the local
//! storage analog) under [`VOTE_KEY`]. It is overwritten on every committed
//! vote and never cleared.
//!
//! In memory the identity is a tagged [`VoteState`] rather than an optional
//! string, so "has voted" and "voted for what" cannot drift apart.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Storage key holding the last voted identifier.
pub const VOTE_KEY: &str = "userVote";

// =============================================================================
// VOTE STATE
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum VoteState {
    #[default]
    NoVote,
    VotedFor(String),
}

impl VoteState {
    /// Interpret a raw stored value. An empty string counts as no vote.
    #[must_use]
    pub fn from_stored(raw: Option<String>) -> Self {
        match raw {
            Some(id) if !id.is_empty() => Self::VotedFor(id),
            _ => Self::NoVote,
        }
    }

    #[must_use]
    pub fn voted_for(&self) -> Option<&str> {
        match self {
            Self::NoVote => None,
            Self::VotedFor(id) => Some(id),
        }
    }

    #[must_use]
    pub fn is_voted_for(&self, id: &str) -> bool {
        self.voted_for() == Some(id)
    }

    #[must_use]
    pub fn has_voted(&self) -> bool {
        matches!(self, Self::VotedFor(_))
    }
}

// =============================================================================
// STORAGE
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage io failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("storage file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("storage lock poisoned")]
    Poisoned,
}

impl crate::error::ErrorCode for StorageError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Io { .. } => "E_STORAGE_IO",
            Self::Corrupt(_) => "E_STORAGE_CORRUPT",
            Self::Poisoned => "E_STORAGE_POISONED",
        }
    }
}

/// Durable string key-value storage scoped to this client.
pub trait LocalStorage: Send + Sync {
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the backing medium cannot be read.
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// # Errors
    ///
    /// Returns a [`StorageError`] if the value cannot be persisted.
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// Read the persisted vote identity.
///
/// # Errors
///
/// Propagates storage read failures.
pub fn load_vote(storage: &dyn LocalStorage) -> Result<VoteState, StorageError> {
    Ok(VoteState::from_stored(storage.get_item(VOTE_KEY)?))
}

/// Overwrite the persisted vote identity.
///
/// # Errors
///
/// Propagates storage write failures.
pub fn save_vote(storage: &dyn LocalStorage, id: &str) -> Result<(), StorageError> {
    storage.set_item(VOTE_KEY, id)
}

/// In-process storage. Lost on exit; used by tests and one-shot sessions.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: Mutex<BTreeMap<String, String>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let items = self.items.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut items = self.items.lock().map_err(|_| StorageError::Poisoned)?;
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// JSON-file storage. The whole map is rewritten on each `set_item` via a
/// temp file and rename, so a crash never leaves a half-written file.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match fs::read(&self.path) {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(source) => Err(StorageError::Io { path: self.path.clone(), source }),
        }
    }

    fn write_all(&self, items: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StorageError::Io { path: parent.to_path_buf(), source })?;
        }

        let bytes = serde_json::to_vec_pretty(items)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, bytes).map_err(|source| StorageError::Io { path: tmp.clone(), source })?;
        fs::rename(&tmp, &self.path).map_err(|source| StorageError::Io { path: self.path.clone(), source })
    }
}

impl LocalStorage for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(self.read_all()?.remove(key))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().map_err(|_| StorageError::Poisoned)?;
        let mut items = self.read_all()?;
        items.insert(key.to_string(), value.to_string());
        self.write_all(&items)
    }
}

#[cfg(test)]
#[path = "identity_test.rs"]
mod tests;

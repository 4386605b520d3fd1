//! Game entries and the mirrored collection.
//!
//! DESIGN
//! ======
//! The store holds `games/{id} -> {name, votes, fixed}`. The identifier is the
//! map key, never a field. Two entries are fixed (`bgmi`, `valorant`); every
//! other entry is a community submission keyed by a store-generated push id.
//!
//! Decoding is lenient: an absent or non-object snapshot is an empty
//! collection, and individual entries that do not decode are skipped.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Identifiers of the fixed entries, in display order.
pub const FIXED_GAME_IDS: [&str; 2] = ["bgmi", "valorant"];

// =============================================================================
// GAME ENTRY
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameEntry {
    pub name: String,
    #[serde(default)]
    pub votes: u64,
    #[serde(default)]
    pub fixed: bool,
}

impl GameEntry {
    /// Build a community entry from free-text input.
    ///
    /// Returns `None` when the trimmed input is empty.
    #[must_use]
    pub fn community(input: &str) -> Option<Self> {
        let name = normalize_name(input)?;
        Some(Self { name, votes: 0, fixed: false })
    }

    /// A fixed entry with its counter at zero.
    #[must_use]
    pub fn fixed(name: &str) -> Self {
        Self { name: name.to_string(), votes: 0, fixed: true }
    }

    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({ "name": self.name, "votes": self.votes, "fixed": self.fixed })
    }
}

/// Trim and uppercase a display name. Empty after trimming means no name.
#[must_use]
pub fn normalize_name(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_uppercase())
}

/// The `(id, entry)` pairs written on every mount.
#[must_use]
pub fn fixed_seed_entries() -> [(&'static str, GameEntry); 2] {
    [("bgmi", GameEntry::fixed("BGMI")), ("valorant", GameEntry::fixed("VALORANT"))]
}

// =============================================================================
// COLLECTION
// =============================================================================

/// Local mirror of the whole collection, keyed by identifier.
///
/// Backed by a `BTreeMap` so iteration is already ascending by identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Collection {
    entries: BTreeMap<String, GameEntry>,
}

impl Collection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a full snapshot. `None`, `null` and non-objects are empty.
    #[must_use]
    pub fn from_snapshot(snapshot: Option<&serde_json::Value>) -> Self {
        let Some(serde_json::Value::Object(map)) = snapshot else {
            return Self::new();
        };

        let mut entries = BTreeMap::new();
        for (id, raw) in map {
            match serde_json::from_value::<GameEntry>(raw.clone()) {
                Ok(entry) => {
                    entries.insert(id.clone(), entry);
                }
                Err(e) => debug!(%id, error = %e, "skipping undecodable game entry"),
            }
        }
        Self { entries }
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&GameEntry> {
        self.entries.get(id)
    }

    pub fn insert(&mut self, id: impl Into<String>, entry: GameEntry) {
        self.entries.insert(id.into(), entry);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &GameEntry)> {
        self.entries.iter().map(|(id, entry)| (id.as_str(), entry))
    }

    /// Non-fixed entries, ascending by identifier.
    ///
    /// Ordering is by raw bytes, not locale collation, so `"B"` sorts before
    /// `"a"`. Push ids use an ASCII-ordered alphabet, so this is creation order.
    pub fn community(&self) -> impl Iterator<Item = (&str, &GameEntry)> {
        self.iter().filter(|(_, entry)| !entry.fixed)
    }

    /// Denominator for progress bars: the largest community vote count, never below 1.
    #[must_use]
    pub fn progress_denominator(&self) -> u64 {
        self.community()
            .map(|(_, entry)| entry.votes)
            .max()
            .unwrap_or(0)
            .max(1)
    }
}

#[cfg(test)]
#[path = "game_test.rs"]
mod tests;

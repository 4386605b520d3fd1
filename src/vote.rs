//! The vote transform.
//!
//! Runs inside the store's optimistic transaction over the whole collection
//! value, so it must be pure: it may be invoked several times against
//! different base values before one commits.
//!
//! The transform moves one vote: the previously voted entry (if it still
//! exists) loses one, floored at zero, and the target (if it exists) gains
//! one. Fixed entries get no special treatment here; keeping them out of reach
//! is the presentation layer's job.

use serde_json::{Map, Value};

/// Apply one vote to a raw collection value.
///
/// An absent collection stays absent. Entries that are not objects are left
/// untouched.
#[must_use]
pub fn apply_vote(current: Option<Value>, previous: Option<&str>, target: &str) -> Option<Value> {
    let mut current = current?;
    let Value::Object(games) = &mut current else {
        return Some(current);
    };

    if let Some(previous) = previous {
        if let Some(entry) = games.get_mut(previous).and_then(Value::as_object_mut) {
            let votes = votes_of(entry).saturating_sub(1);
            entry.insert("votes".into(), Value::from(votes));
        }
    }

    if let Some(entry) = games.get_mut(target).and_then(Value::as_object_mut) {
        let votes = votes_of(entry).saturating_add(1);
        entry.insert("votes".into(), Value::from(votes));
    }

    Some(current)
}

fn votes_of(entry: &Map<String, Value>) -> u64 {
    entry.get("votes").and_then(Value::as_u64).unwrap_or(0)
}

#[cfg(test)]
#[path = "vote_test.rs"]
mod tests;

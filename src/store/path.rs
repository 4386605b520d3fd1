//! Path parsing and JSON tree helpers shared by both store implementations.
//!
//! A tree is a `serde_json::Value` where `Null` means "nothing here". Writes
//! normalize values the way the hosted database does: nulls and empty objects
//! vanish, and a parent left empty by a deletion vanishes with them.

use serde_json::{Map, Value};

use super::StoreError;

const FORBIDDEN: [char; 5] = ['.', '#', '$', '[', ']'];

/// Split a path into segments. Empty segments (leading, trailing, doubled
/// slashes) are ignored; the empty path is the root.
///
/// # Errors
///
/// Returns [`StoreError::InvalidPath`] if a segment contains `.`, `#`, `$`, `[` or `]`.
pub fn segments(path: &str) -> Result<Vec<String>, StoreError> {
    let mut out = Vec::new();
    for seg in path.split('/').filter(|s| !s.is_empty()) {
        if seg.contains(FORBIDDEN) {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        out.push(seg.to_string());
    }
    Ok(out)
}

/// Append a child key to a parent path.
#[must_use]
pub fn child(parent: &str, key: &str) -> String {
    let parent = parent.trim_end_matches('/');
    if parent.is_empty() { key.to_string() } else { format!("{parent}/{key}") }
}

/// True when one path is an ancestor of (or equal to) the other.
#[must_use]
pub fn overlaps(a: &[String], b: &[String]) -> bool {
    a.iter().zip(b).all(|(x, y)| x == y)
}

/// Read the value at `segs`. `None` if absent.
#[must_use]
pub fn get<'a>(root: &'a Value, segs: &[String]) -> Option<&'a Value> {
    let mut node = root;
    for seg in segs {
        node = node.as_object()?.get(seg)?;
    }
    if node.is_null() { None } else { Some(node) }
}

/// Replace the value at `segs`. `None` (or a value that normalizes to
/// nothing) deletes it and prunes emptied parents.
pub fn set(root: &mut Value, segs: &[String], value: Option<Value>) {
    let value = value.and_then(normalize);
    set_inner(root, segs, value);
}

fn set_inner(node: &mut Value, segs: &[String], value: Option<Value>) {
    let Some((head, rest)) = segs.split_first() else {
        *node = value.unwrap_or(Value::Null);
        return;
    };

    if value.is_none() && !node.is_object() {
        return;
    }
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    let Value::Object(map) = node else {
        return;
    };

    let slot = map.entry(head.clone()).or_insert(Value::Null);
    set_inner(slot, rest, value);
    if slot.is_null() {
        map.remove(head);
    }
    if map.is_empty() {
        *node = Value::Null;
    }
}

/// Strip nulls and empty objects. `None` if nothing remains.
#[must_use]
pub fn normalize(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Object(map) => {
            let cleaned: Map<String, Value> =
                map.into_iter().filter_map(|(k, v)| normalize(v).map(|v| (k, v))).collect();
            if cleaned.is_empty() { None } else { Some(Value::Object(cleaned)) }
        }
        other => Some(other),
    }
}

#[cfg(test)]
#[path = "path_test.rs"]
mod tests;

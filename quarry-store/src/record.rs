//! Records and record handles.
//!
//! A record is a schema-agnostic row: identity, type tag, JSON payload,
//! store-maintained timestamps, and a version counter used for conflict
//! detection. Fetches return [`RecordRef`] handles into the owning context's
//! cell cache; fetching the same id twice through one context yields handles
//! to the same cell.
//!
//! Handles are deliberately `!Send`: a record fetched in one context cannot
//! be touched from another thread, which is the compile-time form of the
//! context-isolation rule. Cross-context access means re-fetching by
//! identity.

use quarry_types::RecordId;
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Lifecycle of a cached record cell within its context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CellState {
    /// Matches the store; no pending changes.
    Clean,
    /// Created in this context, not yet saved.
    New,
    /// Edited in this context, not yet saved.
    Dirty,
    /// Deleted in this context, not yet saved.
    PendingDelete,
    /// Deleted in the store. Handles stay valid but read as empty.
    Gone,
}

impl CellState {
    pub(crate) fn is_pending(self) -> bool {
        matches!(self, CellState::New | CellState::Dirty | CellState::PendingDelete)
    }
}

/// The cached state of one record within a context.
#[derive(Debug)]
pub(crate) struct RecordCell {
    pub(crate) id: RecordId,
    pub(crate) record_type: String,
    /// Current payload, including unsaved edits.
    pub(crate) data: Value,
    /// Payload as last fetched or saved; the base for property merges.
    pub(crate) snapshot: Value,
    pub(crate) created_at: i64,
    pub(crate) modified_at: i64,
    /// Store row version backing `snapshot`.
    pub(crate) version: i64,
    pub(crate) state: CellState,
}

/// A raw row as read from the `records` table.
#[derive(Debug)]
pub(crate) struct RawRow {
    pub(crate) id: RecordId,
    pub(crate) record_type: String,
    pub(crate) data: Value,
    pub(crate) created_at: i64,
    pub(crate) modified_at: i64,
    pub(crate) version: i64,
}

/// A cheap, clonable handle to a record cached in a context.
///
/// Accessors never panic. After the underlying record is deleted, `id()`
/// and `record_type()` keep answering with the original identity while every
/// field accessor returns `None` and `data()` returns an empty object.
#[derive(Debug, Clone)]
pub struct RecordRef {
    pub(crate) cell: Rc<RefCell<RecordCell>>,
}

impl RecordRef {
    /// The record's stable identity.
    #[must_use]
    pub fn id(&self) -> RecordId {
        self.cell.borrow().id
    }

    /// The record's type tag.
    #[must_use]
    pub fn record_type(&self) -> String {
        self.cell.borrow().record_type.clone()
    }

    /// The store row version this handle last observed. Bumps on every
    /// committed write of the record.
    #[must_use]
    pub fn version(&self) -> i64 {
        self.cell.borrow().version
    }

    /// True once the record has been deleted from the store.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.cell.borrow().state == CellState::Gone
    }

    /// True if this handle carries unsaved changes.
    #[must_use]
    pub fn has_pending_changes(&self) -> bool {
        self.cell.borrow().state.is_pending()
    }

    #[must_use]
    pub fn created_at(&self) -> i64 {
        self.cell.borrow().created_at
    }

    #[must_use]
    pub fn modified_at(&self) -> i64 {
        self.cell.borrow().modified_at
    }

    /// Returns the payload value at a dotted field path.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        get_json_path(&self.cell.borrow().data, key).cloned()
    }

    /// Returns the string value at a dotted field path.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.get(key).and_then(|v| v.as_str().map(str::to_string))
    }

    /// Returns the numeric value at a dotted field path.
    #[must_use]
    pub fn get_number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|v| v.as_f64())
    }

    /// Returns the boolean value at a dotted field path.
    #[must_use]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.as_bool())
    }

    /// A copy of the whole payload. Empty object once deleted.
    #[must_use]
    pub fn data(&self) -> Value {
        self.cell.borrow().data.clone()
    }

    /// Sets the payload value at a dotted field path, marking the record
    /// dirty in its context. No-op on a deleted record.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let mut cell = self.cell.borrow_mut();
        match cell.state {
            CellState::Gone | CellState::PendingDelete => {}
            _ => {
                set_json_path(&mut cell.data, key, value.into());
                if cell.state == CellState::Clean {
                    cell.state = CellState::Dirty;
                }
            }
        }
    }
}

/// Resolves a dotted field path against a JSON payload.
pub(crate) fn get_json_path<'a>(data: &'a Value, key: &str) -> Option<&'a Value> {
    let mut current = data;
    for segment in key.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Writes a value at a dotted field path, creating intermediate objects.
pub(crate) fn set_json_path(data: &mut Value, key: &str, value: Value) {
    if !data.is_object() {
        *data = Value::Object(serde_json::Map::new());
    }
    let mut current = data;
    let segments: Vec<&str> = key.split('.').collect();
    for (i, segment) in segments.iter().enumerate() {
        let map = current.as_object_mut().expect("object ensured above");
        if i == segments.len() - 1 {
            map.insert((*segment).to_string(), value);
            return;
        }
        let entry = map
            .entry((*segment).to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(serde_json::Map::new());
        }
        current = entry;
    }
}

/// Merges a locally edited payload with a concurrently stored one.
///
/// `base` is the payload as both sides last agreed on it, `local` carries the
/// unsaved edits, `store` is the currently committed state. Properties are
/// compared at the top level. When both sides changed a property,
/// `local_trumps` decides the winner; a property changed by only one side
/// takes that side's value.
pub(crate) fn merge_by_property(
    base: &Value,
    local: &Value,
    store: &Value,
    local_trumps: bool,
) -> Value {
    let (Some(base_map), Some(local_map), Some(store_map)) =
        (base.as_object(), local.as_object(), store.as_object())
    else {
        return if local_trumps {
            local.clone()
        } else {
            store.clone()
        };
    };

    let mut merged = store_map.clone();
    let null = Value::Null;

    let mut keys: Vec<&String> = base_map.keys().chain(local_map.keys()).collect();
    keys.sort();
    keys.dedup();
    for key in keys {
        let base_value = base_map.get(key).unwrap_or(&null);
        let local_value = local_map.get(key).unwrap_or(&null);
        if base_value == local_value {
            continue; // not locally changed
        }
        let store_value = store_map.get(key).unwrap_or(&null);
        let store_changed = store_value != base_value;
        if store_changed && !local_trumps {
            continue; // store wins this property
        }
        if local_map.contains_key(key) {
            merged.insert(key.clone(), local_value.clone());
        } else {
            merged.remove(key);
        }
    }

    Value::Object(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_json_path_nested() {
        let mut data = json!({});
        set_json_path(&mut data, "author.name", json!("Ann"));
        set_json_path(&mut data, "title", json!("T"));
        assert_eq!(data, json!({"author": {"name": "Ann"}, "title": "T"}));
    }

    #[test]
    fn merge_keeps_disjoint_changes_from_both_sides() {
        let base = json!({"a": 1, "b": 1});
        let local = json!({"a": 2, "b": 1});
        let store = json!({"a": 1, "b": 2});
        let merged = merge_by_property(&base, &local, &store, false);
        assert_eq!(merged, json!({"a": 2, "b": 2}));
    }

    #[test]
    fn merge_conflicting_property_respects_trump() {
        let base = json!({"x": 1});
        let local = json!({"x": 2});
        let store = json!({"x": 3});
        assert_eq!(
            merge_by_property(&base, &local, &store, false),
            json!({"x": 3})
        );
        assert_eq!(
            merge_by_property(&base, &local, &store, true),
            json!({"x": 2})
        );
    }

    #[test]
    fn merge_local_removal() {
        let base = json!({"x": 1, "y": 1});
        let local = json!({"y": 1});
        let store = json!({"x": 1, "y": 5});
        let merged = merge_by_property(&base, &local, &store, true);
        assert_eq!(merged, json!({"y": 5}));
    }
}

mod common;

use common::open_memory_store;
use quarry_types::{Predicate, Range, Recipe};
use serde_json::json;

fn seed_tasks(store: &quarry_store::Store) {
    let ctx = store.main_context();
    ctx.create("task", json!({"name": "a", "status": "active"}));
    ctx.create("task", json!({"name": "b", "status": "active"}));
    ctx.create("task", json!({"name": "c", "status": "done"}));
    store.save().unwrap();
}

#[test]
fn batch_update_applies_at_storage_level() {
    let store = open_memory_store();
    seed_tasks(&store);

    let mut fields = serde_json::Map::new();
    fields.insert("priority".to_string(), json!(5));
    let affected = store.batch_update(
        "task",
        &Predicate::equal("status", "active"),
        &fields,
    );
    assert_eq!(affected, 2);

    let high = Predicate::equal("priority", 5i64);
    assert_eq!(
        store.main_context().count("task", Some(&high), Range::All),
        2
    );
}

#[test]
fn batch_update_does_not_refresh_held_handles() {
    let store = open_memory_store();
    seed_tasks(&store);
    let held = store
        .main_context()
        .get("task", Some(&Predicate::equal("name", "a")))
        .unwrap();
    let version_before = held.version();

    let mut fields = serde_json::Map::new();
    fields.insert("priority".to_string(), json!(5));
    store.batch_update("task", &Predicate::equal("status", "active"), &fields);

    // Documented trade-off: the handle is stale until re-fetched.
    assert_eq!(held.get("priority"), None);
    assert_eq!(held.version(), version_before);

    let refetched = store
        .main_context()
        .get("task", Some(&Predicate::equal("name", "a")))
        .unwrap();
    assert_eq!(refetched.get("priority"), Some(json!(5)));
    assert!(refetched.version() > version_before);
}

#[test]
fn batch_update_rejects_invalid_field_keys() {
    let store = open_memory_store();
    seed_tasks(&store);
    let mut fields = serde_json::Map::new();
    fields.insert("bad key".to_string(), json!(1));
    let err = store
        .main_context()
        .try_batch_update("task", &Predicate::And(vec![]), &fields)
        .unwrap_err();
    assert!(matches!(err, quarry_store::StoreError::InvalidRequest(_)));
}

#[test]
fn batch_delete_removes_rows_and_reports_count() {
    let store = open_memory_store();
    seed_tasks(&store);
    let affected = store.batch_delete("task", &Predicate::equal("status", "active"));
    assert_eq!(affected, 2);
    assert_eq!(store.main_context().count("task", None, Range::All), 1);
    assert_eq!(
        store.batch_delete("task", &Predicate::equal("status", "active")),
        0
    );
}

#[test]
fn batch_delete_leaves_no_dangling_handles() {
    let store = open_memory_store();
    seed_tasks(&store);
    let held = store
        .main_context()
        .get("task", Some(&Predicate::equal("name", "a")))
        .unwrap();
    let id = held.id();

    store.batch_delete("task", &Predicate::equal("status", "active"));

    assert!(held.is_deleted());
    assert_eq!(held.id(), id);
    assert_eq!(held.get("name"), None);
    assert_eq!(held.data(), json!({}));
    // Edits on a deleted handle are ignored, not persisted.
    held.set("name", json!("ghost"));
    assert!(!store.main_context().has_changes());
}

#[test]
fn batch_delete_survivors_are_untouched() {
    let store = open_memory_store();
    seed_tasks(&store);
    store.batch_delete("task", &Predicate::equal("status", "active"));
    let rest = store.main_context().list("task", &Recipe::new());
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].get_str("name").as_deref(), Some("c"));
}

mod common;

use common::{open_file_store_with, open_memory_store_with};
use quarry_store::{MergePolicy, SaveOutcome};
use quarry_types::Predicate;
use serde_json::json;
use std::cell::Cell;
use std::rc::Rc;

/// Two store handles on the same file: A holds a stale edit, B commits
/// first. Returns (store_a, held record ref) with the conflict armed on
/// field "x": base 1, B committed 2, A's unsaved edit 3. B also set "y" to 9
/// while A left it alone.
fn armed_conflict(
    dir: &tempfile::TempDir,
    policy: MergePolicy,
) -> (quarry_store::Store, quarry_store::RecordRef) {
    let store_a = open_file_store_with(dir, policy);
    let store_b = open_file_store_with(dir, policy);

    let held = store_a
        .main_context()
        .create("task", json!({"name": "shared", "x": 1, "y": 1}));
    store_a.save().unwrap();

    let via_b = store_b
        .main_context()
        .get("task", Some(&Predicate::equal("name", "shared")))
        .unwrap();
    via_b.set("x", json!(2));
    via_b.set("y", json!(9));
    store_b.save().unwrap();

    held.set("x", json!(3));
    (store_a, held)
}

fn stored_value(dir: &tempfile::TempDir, key: &str) -> serde_json::Value {
    let raw = rusqlite::Connection::open(common::db_path(dir)).unwrap();
    let data: String = raw
        .query_row("SELECT data FROM records LIMIT 1", [], |r| r.get(0))
        .unwrap();
    serde_json::from_str::<serde_json::Value>(&data).unwrap()[key].clone()
}

#[test]
fn fail_on_conflict_errors_and_keeps_store_state() {
    let dir = tempfile::tempdir().unwrap();
    let (store_a, _held) = armed_conflict(&dir, MergePolicy::FailOnConflict);
    let err = store_a.save().unwrap_err();
    assert!(matches!(err, quarry_store::StoreError::Conflict { .. }));
    assert_eq!(stored_value(&dir, "x"), json!(2));
}

#[test]
fn overwrite_forces_the_local_record_wholesale() {
    let dir = tempfile::tempdir().unwrap();
    let (store_a, held) = armed_conflict(&dir, MergePolicy::Overwrite);
    store_a.save().unwrap();
    assert_eq!(stored_value(&dir, "x"), json!(3));
    // B's concurrent y-change is overwritten along with the rest.
    assert_eq!(stored_value(&dir, "y"), json!(1));
    assert!(!held.has_pending_changes());
}

#[test]
fn store_wins_merges_per_property() {
    let dir = tempfile::tempdir().unwrap();
    let (store_a, _held) = armed_conflict(&dir, MergePolicy::StoreWins);
    store_a.save().unwrap();
    // Both sides changed x: the store's value survives. Only B changed y.
    assert_eq!(stored_value(&dir, "x"), json!(2));
    assert_eq!(stored_value(&dir, "y"), json!(9));
}

#[test]
fn record_wins_merges_per_property() {
    let dir = tempfile::tempdir().unwrap();
    let (store_a, _held) = armed_conflict(&dir, MergePolicy::RecordWins);
    store_a.save().unwrap();
    // Both sides changed x: the local edit survives. Only B changed y.
    assert_eq!(stored_value(&dir, "x"), json!(3));
    assert_eq!(stored_value(&dir, "y"), json!(9));
}

#[test]
fn rollback_discards_the_local_edit() {
    let dir = tempfile::tempdir().unwrap();
    let (store_a, held) = armed_conflict(&dir, MergePolicy::Rollback);
    assert_eq!(store_a.save().unwrap(), SaveOutcome::Saved);
    assert_eq!(stored_value(&dir, "x"), json!(2));
    assert_eq!(held.get("x"), Some(json!(2)));
    assert!(!held.has_pending_changes());
}

// ── Policy applied when background writes propagate into the main
//    context while it holds concurrent unsaved edits ─────────────

fn background_write_vs_main_edit(policy: MergePolicy) -> (quarry_store::Store, quarry_store::RecordRef) {
    let store = open_memory_store_with(policy);
    let held = store
        .main_context()
        .create("task", json!({"name": "shared", "x": "base"}));
    store.save().unwrap();

    // Concurrent: background writes x, the main context holds an unsaved
    // edit to the same field.
    held.set("x", json!("main-edit"));
    let done = Rc::new(Cell::new(false));
    let done_flag = Rc::clone(&done);
    store.perform_background_task(
        move |ctx| {
            let r = ctx
                .get("task", Some(&Predicate::equal("name", "shared")))
                .unwrap();
            r.set("x", json!("background"));
        },
        move |ok| done_flag.set(ok),
    );
    store.await_background_tasks();
    assert!(done.get());
    (store, held)
}

#[test]
fn overwrite_background_write_wins_over_unsaved_main_edit() {
    let (store, held) = background_write_vs_main_edit(MergePolicy::Overwrite);
    assert_eq!(held.get("x"), Some(json!("background")));
    assert!(!store.main_context().has_changes());
    let fetched = store.main_context().get("task", None).unwrap();
    assert_eq!(fetched.get("x"), Some(json!("background")));
}

#[test]
fn record_wins_unsaved_main_edit_wins_over_background_write() {
    let (store, held) = background_write_vs_main_edit(MergePolicy::RecordWins);
    // The propagation kept the main edit and the completion-path save
    // committed it.
    assert_eq!(held.get("x"), Some(json!("main-edit")));
    assert!(!store.main_context().has_changes());
    let fetched = store.main_context().get("task", None).unwrap();
    assert_eq!(fetched.get("x"), Some(json!("main-edit")));
}

#[test]
fn store_wins_keeps_disjoint_main_edits() {
    let store = open_memory_store_with(MergePolicy::StoreWins);
    let held = store
        .main_context()
        .create("task", json!({"name": "shared", "x": "base", "note": "base"}));
    store.save().unwrap();

    held.set("note", json!("main-note"));
    store.perform_background_task(
        |ctx| {
            let r = ctx
                .get("task", Some(&Predicate::equal("name", "shared")))
                .unwrap();
            r.set("x", json!("background"));
        },
        |_| {},
    );
    store.await_background_tasks();

    // x came from the background, the untouched note edit survived and was
    // saved by the completion path.
    assert_eq!(held.get("x"), Some(json!("background")));
    assert_eq!(held.get("note"), Some(json!("main-note")));
    assert!(!store.main_context().has_changes());
}

#[test]
fn merge_policy_is_fixed_after_open() {
    let store = open_memory_store_with(MergePolicy::Overwrite);
    assert_eq!(store.merge_policy(), MergePolicy::Overwrite);
    // There is deliberately no setter; the policy a store reports never
    // changes for its lifetime.
    assert_eq!(store.merge_policy(), MergePolicy::Overwrite);
}

//! Read/write contexts.
//!
//! A context is an isolated session against the store: it owns its own
//! SQLite connection, a cache of record cells, and the set of unsaved
//! changes. The main context is long-lived and bound to the thread that
//! opened the store; background contexts are created per task and die with
//! it.
//!
//! Contexts are `!Send` by construction, so records fetched in one context
//! cannot be touched from another thread. The main context additionally
//! carries its owning thread id and asserts on it in debug builds — access
//! from the wrong thread is a caller bug, not a runtime condition.

use crate::config::MergePolicy;
use crate::error::{StoreError, StoreResult};
use crate::notify::{ChangedRecord, SaveNotification};
use crate::record::{
    merge_by_property, now_millis, CellState, RawRow, RecordCell, RecordRef,
};
use crate::store::SaveOutcome;
use quarry_types::RecordId;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::thread::{self, ThreadId};
use tracing::debug;

#[derive(Debug)]
enum ContextKind {
    Main { owner: ThreadId },
    Background,
}

/// An isolated read/write session against the store.
pub struct Context {
    kind: ContextKind,
    conn: Connection,
    policy: MergePolicy,
    cells: RefCell<HashMap<RecordId, Rc<RefCell<RecordCell>>>>,
    pending_notes: RefCell<Vec<SaveNotification>>,
}

/// Post-commit mutation planned for one cell during a save.
enum CellUpdate {
    /// The cell's current data was committed.
    Saved {
        data: Value,
        version: i64,
        modified_at: i64,
    },
    /// Conflict under `Rollback`: local edits discarded, refreshed from store.
    Refreshed { data: Value, version: i64 },
    /// The pending delete was committed, or the row vanished underneath us.
    Gone,
}

impl Context {
    pub(crate) fn new_main(conn: Connection, policy: MergePolicy) -> Self {
        Self {
            kind: ContextKind::Main {
                owner: thread::current().id(),
            },
            conn,
            policy,
            cells: RefCell::new(HashMap::new()),
            pending_notes: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn new_background(conn: Connection, policy: MergePolicy) -> Self {
        Self {
            kind: ContextKind::Background,
            conn,
            policy,
            cells: RefCell::new(HashMap::new()),
            pending_notes: RefCell::new(Vec::new()),
        }
    }

    /// True for the long-lived main context.
    #[must_use]
    pub fn is_main(&self) -> bool {
        matches!(self.kind, ContextKind::Main { .. })
    }

    /// Debug-asserts that a main context is touched only from its owning
    /// thread. `!Send` already prevents this at compile time for safe code;
    /// the assertion keeps the contract visible.
    pub(crate) fn assert_owner(&self) {
        if let ContextKind::Main { owner } = self.kind {
            debug_assert_eq!(
                thread::current().id(),
                owner,
                "main context accessed off its owning thread"
            );
        }
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Creates a record in this context. The payload should be a JSON
    /// object; it is not persisted until the context saves.
    pub fn create(&self, record_type: &str, data: Value) -> RecordRef {
        self.assert_owner();
        debug_assert!(data.is_object(), "record payloads are JSON objects");
        let now = now_millis();
        let cell = RecordCell {
            id: RecordId::new(),
            record_type: record_type.to_string(),
            data,
            snapshot: Value::Object(serde_json::Map::new()),
            created_at: now,
            modified_at: now,
            version: 0,
            state: CellState::New,
        };
        let id = cell.id;
        let rc = Rc::new(RefCell::new(cell));
        self.cells.borrow_mut().insert(id, Rc::clone(&rc));
        RecordRef { cell: rc }
    }

    /// Marks a record for deletion on the next save. Deleting a record that
    /// was created in this context and never saved simply discards it.
    pub fn delete(&self, record: &RecordRef) {
        self.assert_owner();
        let mut cell = record.cell.borrow_mut();
        match cell.state {
            CellState::New => {
                cell.state = CellState::Gone;
                cell.data = Value::Object(serde_json::Map::new());
                let id = cell.id;
                drop(cell);
                self.cells.borrow_mut().remove(&id);
            }
            CellState::Clean | CellState::Dirty => cell.state = CellState::PendingDelete,
            CellState::PendingDelete | CellState::Gone => {}
        }
    }

    /// True when this context has unsaved changes.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.cells
            .borrow()
            .values()
            .any(|c| c.borrow().state.is_pending())
    }

    /// Writes all pending changes in one transaction.
    ///
    /// Conflicts with concurrently committed writes are resolved by the
    /// store's merge policy (see [`MergePolicy`]). A record deleted
    /// underneath a pending edit stays deleted except under
    /// `FailOnConflict`, which fails the save. On error the whole
    /// transaction is rolled back and no cell is touched.
    pub(crate) fn save(&self) -> StoreResult<SaveOutcome> {
        self.assert_owner();
        let mut dirty: Vec<Rc<RefCell<RecordCell>>> = self
            .cells
            .borrow()
            .values()
            .filter(|c| c.borrow().state.is_pending())
            .cloned()
            .collect();
        if dirty.is_empty() {
            return Ok(SaveOutcome::NoChanges);
        }
        dirty.sort_by_key(|c| {
            let cell = c.borrow();
            (cell.created_at, cell.id)
        });

        let now = now_millis();
        let mut note = SaveNotification::default();
        let mut post: Vec<(Rc<RefCell<RecordCell>>, CellUpdate)> = Vec::new();

        let tx = self.conn.unchecked_transaction()?;
        for rc in &dirty {
            let cell = rc.borrow();
            match cell.state {
                CellState::New => {
                    tx.execute(
                        "INSERT INTO records (id, record_type, data, created_at, modified_at, version)
                         VALUES (?1, ?2, ?3, ?4, ?5, 1)",
                        params![
                            cell.id.to_string(),
                            cell.record_type,
                            serde_json::to_string(&cell.data)?,
                            cell.created_at,
                            now,
                        ],
                    )?;
                    note.inserted.push(ChangedRecord {
                        record_type: cell.record_type.clone(),
                        id: cell.id,
                        data: cell.data.clone(),
                        version: 1,
                        created_at: cell.created_at,
                        modified_at: now,
                    });
                    post.push((
                        Rc::clone(rc),
                        CellUpdate::Saved {
                            data: cell.data.clone(),
                            version: 1,
                            modified_at: now,
                        },
                    ));
                }
                CellState::Dirty => {
                    let row: Option<(String, i64)> = tx
                        .query_row(
                            "SELECT data, version FROM records WHERE id = ?1",
                            params![cell.id.to_string()],
                            |r| Ok((r.get(0)?, r.get(1)?)),
                        )
                        .optional()?;
                    let Some((store_json, store_version)) = row else {
                        // Deleted underneath us; the delete wins.
                        if self.policy == MergePolicy::FailOnConflict {
                            return Err(StoreError::Conflict {
                                record_type: cell.record_type.clone(),
                                id: cell.id,
                            });
                        }
                        post.push((Rc::clone(rc), CellUpdate::Gone));
                        continue;
                    };

                    let merged: Value;
                    if store_version == cell.version {
                        merged = cell.data.clone();
                    } else {
                        let store_data: Value = serde_json::from_str(&store_json)?;
                        match self.policy {
                            MergePolicy::FailOnConflict => {
                                return Err(StoreError::Conflict {
                                    record_type: cell.record_type.clone(),
                                    id: cell.id,
                                });
                            }
                            MergePolicy::Rollback => {
                                post.push((
                                    Rc::clone(rc),
                                    CellUpdate::Refreshed {
                                        data: store_data,
                                        version: store_version,
                                    },
                                ));
                                continue;
                            }
                            MergePolicy::Overwrite => merged = cell.data.clone(),
                            MergePolicy::StoreWins => {
                                merged = merge_by_property(
                                    &cell.snapshot,
                                    &cell.data,
                                    &store_data,
                                    false,
                                );
                            }
                            MergePolicy::RecordWins => {
                                merged = merge_by_property(
                                    &cell.snapshot,
                                    &cell.data,
                                    &store_data,
                                    true,
                                );
                            }
                        }
                    }
                    let new_version = store_version + 1;
                    tx.execute(
                        "UPDATE records SET data = ?1, modified_at = ?2, version = ?3 WHERE id = ?4",
                        params![
                            serde_json::to_string(&merged)?,
                            now,
                            new_version,
                            cell.id.to_string(),
                        ],
                    )?;
                    note.updated.push(ChangedRecord {
                        record_type: cell.record_type.clone(),
                        id: cell.id,
                        data: merged.clone(),
                        version: new_version,
                        created_at: cell.created_at,
                        modified_at: now,
                    });
                    post.push((
                        Rc::clone(rc),
                        CellUpdate::Saved {
                            data: merged,
                            version: new_version,
                            modified_at: now,
                        },
                    ));
                }
                CellState::PendingDelete => {
                    if self.policy == MergePolicy::FailOnConflict {
                        let store_version: Option<i64> = tx
                            .query_row(
                                "SELECT version FROM records WHERE id = ?1",
                                params![cell.id.to_string()],
                                |r| r.get(0),
                            )
                            .optional()?;
                        if let Some(v) = store_version {
                            if v != cell.version {
                                return Err(StoreError::Conflict {
                                    record_type: cell.record_type.clone(),
                                    id: cell.id,
                                });
                            }
                        }
                    }
                    tx.execute(
                        "DELETE FROM records WHERE id = ?1",
                        params![cell.id.to_string()],
                    )?;
                    note.deleted.push((cell.record_type.clone(), cell.id));
                    post.push((Rc::clone(rc), CellUpdate::Gone));
                }
                CellState::Clean | CellState::Gone => unreachable!("filtered above"),
            }
        }
        tx.commit()?;

        debug!(
            inserted = note.inserted.len(),
            updated = note.updated.len(),
            deleted = note.deleted.len(),
            "context saved"
        );

        for (rc, update) in post {
            let mut cell = rc.borrow_mut();
            match update {
                CellUpdate::Saved {
                    data,
                    version,
                    modified_at,
                } => {
                    cell.snapshot = data.clone();
                    cell.data = data;
                    cell.version = version;
                    cell.modified_at = modified_at;
                    cell.state = CellState::Clean;
                }
                CellUpdate::Refreshed { data, version } => {
                    cell.snapshot = data.clone();
                    cell.data = data;
                    cell.version = version;
                    cell.state = CellState::Clean;
                }
                CellUpdate::Gone => {
                    cell.state = CellState::Gone;
                    cell.data = Value::Object(serde_json::Map::new());
                    let id = cell.id;
                    drop(cell);
                    self.cells.borrow_mut().remove(&id);
                }
            }
        }

        self.pending_notes.borrow_mut().push(note);
        Ok(SaveOutcome::Saved)
    }

    pub(crate) fn take_notifications(&self) -> Vec<SaveNotification> {
        std::mem::take(&mut *self.pending_notes.borrow_mut())
    }

    pub(crate) fn push_notification(&self, note: SaveNotification) {
        self.pending_notes.borrow_mut().push(note);
    }

    /// Turns a fetched row into a handle, uniquing against the cell cache.
    /// Rows for records deleted in this context yield `None`; cells with
    /// unsaved edits keep their local state.
    pub(crate) fn materialize(&self, row: RawRow) -> Option<RecordRef> {
        let mut cells = self.cells.borrow_mut();
        if let Some(rc) = cells.get(&row.id) {
            {
                let mut cell = rc.borrow_mut();
                match cell.state {
                    CellState::Clean => {
                        cell.data = row.data.clone();
                        cell.snapshot = row.data;
                        cell.created_at = row.created_at;
                        cell.modified_at = row.modified_at;
                        cell.version = row.version;
                    }
                    CellState::New | CellState::Dirty => {}
                    CellState::PendingDelete | CellState::Gone => return None,
                }
            }
            return Some(RecordRef {
                cell: Rc::clone(rc),
            });
        }
        let cell = RecordCell {
            id: row.id,
            record_type: row.record_type,
            snapshot: row.data.clone(),
            data: row.data,
            created_at: row.created_at,
            modified_at: row.modified_at,
            version: row.version,
            state: CellState::Clean,
        };
        let rc = Rc::new(RefCell::new(cell));
        cells.insert(row.id, Rc::clone(&rc));
        Some(RecordRef { cell: rc })
    }

    /// Merges a committed change set from another context into this one's
    /// cache, applying the merge policy where cells carry unsaved edits.
    pub(crate) fn apply_remote(&self, note: &SaveNotification) {
        self.assert_owner();
        for changed in note.inserted.iter().chain(note.updated.iter()) {
            self.apply_changed(changed);
        }
        for (_, id) in &note.deleted {
            let rc = self.cells.borrow().get(id).cloned();
            let Some(rc) = rc else { continue };
            let mut cell = rc.borrow_mut();
            if self.policy == MergePolicy::FailOnConflict
                && cell.state == CellState::Dirty
            {
                // Leave the stale edit in place; its save reports the conflict.
                continue;
            }
            cell.state = CellState::Gone;
            cell.data = Value::Object(serde_json::Map::new());
            drop(cell);
            self.cells.borrow_mut().remove(id);
        }
    }

    fn apply_changed(&self, changed: &ChangedRecord) {
        let rc = self.cells.borrow().get(&changed.id).cloned();
        let Some(rc) = rc else { return };
        let mut cell = rc.borrow_mut();
        match cell.state {
            CellState::Clean => {
                cell.data = changed.data.clone();
                cell.snapshot = changed.data.clone();
                cell.version = changed.version;
                cell.modified_at = changed.modified_at;
            }
            CellState::Dirty => match self.policy {
                MergePolicy::FailOnConflict => {}
                MergePolicy::Overwrite | MergePolicy::Rollback => {
                    cell.data = changed.data.clone();
                    cell.snapshot = changed.data.clone();
                    cell.version = changed.version;
                    cell.modified_at = changed.modified_at;
                    cell.state = CellState::Clean;
                }
                MergePolicy::StoreWins | MergePolicy::RecordWins => {
                    let local_trumps = self.policy == MergePolicy::RecordWins;
                    let merged = merge_by_property(
                        &cell.snapshot,
                        &cell.data,
                        &changed.data,
                        local_trumps,
                    );
                    cell.data = merged;
                    cell.snapshot = changed.data.clone();
                    cell.version = changed.version;
                    cell.modified_at = changed.modified_at;
                    if cell.data == cell.snapshot {
                        cell.state = CellState::Clean;
                    }
                }
            },
            CellState::PendingDelete => {
                if self.policy != MergePolicy::FailOnConflict {
                    cell.version = changed.version;
                }
            }
            CellState::New | CellState::Gone => {}
        }
    }

    /// Flips cached cells to the deleted sentinel after a storage-level
    /// delete. Used by the batch mutator.
    pub(crate) fn mark_gone(&self, ids: &[RecordId]) {
        let mut cells = self.cells.borrow_mut();
        for id in ids {
            if let Some(rc) = cells.remove(id) {
                let mut cell = rc.borrow_mut();
                cell.state = CellState::Gone;
                cell.data = Value::Object(serde_json::Map::new());
            }
        }
    }
}

//! The store manager.
//!
//! One [`Store`] per process owns the persistent container: it opens the
//! database, holds the long-lived main context, spawns background contexts
//! for write tasks, runs the save pipeline, and routes save notifications to
//! subscribers on the main thread.
//!
//! The store is constructed once at startup and passed by reference to every
//! component that needs it; there is no ambient global. Tests construct
//! isolated stores per case.

use crate::config::{MergePolicy, StoreConfig, StoreLocation};
use crate::context::Context;
use crate::error::{StoreError, StoreResult};
use crate::notify::{SaveNotification, SaveSubscriber};
use quarry_types::Predicate;
use rusqlite::{Connection, OpenFlags};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What a save did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Pending changes were committed.
    Saved,
    /// The context had nothing to save; the store was not touched.
    NoChanges,
}

/// State shared with background worker threads.
struct Shared {
    location: StoreLocation,
    policy: MergePolicy,
    busy_timeout_ms: u64,
    in_flight: AtomicUsize,
}

/// Result of one background task, queued for the main thread.
struct TaskDone {
    task_id: u64,
    outcome: StoreResult<SaveOutcome>,
    notifications: Vec<SaveNotification>,
}

/// The persistence root: container, main context, background coordination.
///
/// Not `Send`: the store lives on the thread that opened it, which is the
/// thread every completion and observer callback runs on.
pub struct Store {
    shared: Arc<Shared>,
    main: Context,
    subscribers: RefCell<Vec<Weak<dyn SaveSubscriber>>>,
    completions: RefCell<HashMap<u64, Box<dyn FnOnce(bool)>>>,
    task_tx: Sender<TaskDone>,
    task_rx: Receiver<TaskDone>,
    next_task_id: Cell<u64>,
}

impl Store {
    /// Opens the store, creating the database and schema as needed, and
    /// binds the main context to the calling thread.
    ///
    /// This is the layer's one unrecoverable failure point: if the
    /// underlying storage cannot be opened, no screen can function, and the
    /// caller is expected to treat the error as fatal.
    pub fn open(config: StoreConfig) -> StoreResult<Store> {
        let shared = Arc::new(Shared {
            location: config.location,
            policy: config.policy,
            busy_timeout_ms: config.busy_timeout_ms,
            in_flight: AtomicUsize::new(0),
        });
        let conn = open_connection(&shared)?;
        init_schema(&conn)?;
        info!(location = ?shared.location, policy = ?shared.policy, "quarry store opened");

        let (task_tx, task_rx) = mpsc::channel();
        Ok(Store {
            main: Context::new_main(conn, shared.policy),
            shared,
            subscribers: RefCell::new(Vec::new()),
            completions: RefCell::new(HashMap::new()),
            task_tx,
            task_rx,
            next_task_id: Cell::new(0),
        })
    }

    /// The long-lived main context. Main-thread only.
    #[must_use]
    pub fn main_context(&self) -> &Context {
        &self.main
    }

    /// The process-wide merge policy, fixed at open time.
    #[must_use]
    pub fn merge_policy(&self) -> MergePolicy {
        self.shared.policy
    }

    /// Saves the main context synchronously.
    ///
    /// With no pending changes this is a no-op: it returns
    /// [`SaveOutcome::NoChanges`], leaves the store untouched, and notifies
    /// no subscriber.
    pub fn save(&self) -> StoreResult<SaveOutcome> {
        let outcome = self.main.save()?;
        for note in self.main.take_notifications() {
            self.dispatch(&note);
        }
        Ok(outcome)
    }

    /// Runs `work` with a fresh background context on its own worker thread.
    ///
    /// After `work` returns, pending changes are saved with the store's
    /// merge policy. The completion runs on the main thread — during
    /// [`drain_completions`](Self::drain_completions) or
    /// [`await_background_tasks`](Self::await_background_tasks) — strictly
    /// after the committed changes have been merged into the main context,
    /// so a caller that re-queries main-context state inside the completion
    /// always sees the write. If the background context ends up with no
    /// changes, the completion receives `false` without a main-context save.
    ///
    /// Completions fire in the order the underlying saves completed. There
    /// is no cancellation: a task, once started, runs to completion.
    pub fn perform_background_task<W, C>(&self, work: W, completion: C)
    where
        W: FnOnce(&Context) + Send + 'static,
        C: FnOnce(bool) + 'static,
    {
        let task_id = self.next_task_id.get();
        self.next_task_id.set(task_id + 1);
        self.completions
            .borrow_mut()
            .insert(task_id, Box::new(completion));
        self.shared.in_flight.fetch_add(1, Ordering::SeqCst);

        let shared = Arc::clone(&self.shared);
        let tx = self.task_tx.clone();
        std::thread::spawn(move || {
            let result = catch_unwind(AssertUnwindSafe(|| run_background(&shared, work)));
            let done = match result {
                Ok(Ok((outcome, notifications))) => TaskDone {
                    task_id,
                    outcome: Ok(outcome),
                    notifications,
                },
                Ok(Err(e)) => TaskDone {
                    task_id,
                    outcome: Err(e),
                    notifications: Vec::new(),
                },
                Err(_) => TaskDone {
                    task_id,
                    outcome: Err(StoreError::Background("task panicked".into())),
                    notifications: Vec::new(),
                },
            };
            let _ = tx.send(done);
            shared.in_flight.fetch_sub(1, Ordering::SeqCst);
        });
    }

    /// Processes every finished background task currently queued: merges
    /// committed changes into the main context, saves the main context when
    /// it has pending changes, notifies subscribers, and invokes
    /// completions. The host calls this from its event loop.
    pub fn drain_completions(&self) {
        while let Ok(done) = self.task_rx.try_recv() {
            self.finish_task(done);
        }
    }

    /// Blocks until every in-flight background task has finished and been
    /// processed. Intended for tests and shutdown paths.
    pub fn await_background_tasks(&self) {
        loop {
            if self.shared.in_flight.load(Ordering::SeqCst) == 0 {
                // All results are already in the channel at this point.
                self.drain_completions();
                return;
            }
            match self.task_rx.recv_timeout(Duration::from_millis(50)) {
                Ok(done) => self.finish_task(done),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }
    }

    /// Registers a save subscriber. The store keeps only a weak handle: the
    /// registration dies when the owning side drops its strong reference,
    /// and a dead subscriber is never called.
    pub fn subscribe(&self, subscriber: Weak<dyn SaveSubscriber>) {
        self.subscribers.borrow_mut().push(subscriber);
    }

    /// Removes a subscriber registration explicitly.
    pub fn unsubscribe(&self, subscriber: &Rc<dyn SaveSubscriber>) {
        self.subscribers.borrow_mut().retain(|weak| match weak.upgrade() {
            Some(live) => !Rc::ptr_eq(&live, subscriber),
            None => false,
        });
    }

    /// Storage-level batch update through the main context; notifies no
    /// subscriber and refreshes no cache by design.
    pub fn batch_update(
        &self,
        record_type: &str,
        predicate: &Predicate,
        fields: &serde_json::Map<String, Value>,
    ) -> usize {
        self.main.batch_update(record_type, predicate, fields)
    }

    /// Storage-level batch delete through the main context. Held handles for
    /// deleted rows flip to the deleted sentinel and subscribers observe the
    /// deletions in the same cycle.
    pub fn batch_delete(&self, record_type: &str, predicate: &Predicate) -> usize {
        let affected = self.main.batch_delete(record_type, predicate);
        for note in self.main.take_notifications() {
            self.dispatch(&note);
        }
        affected
    }

    fn finish_task(&self, done: TaskDone) {
        let success = match done.outcome {
            Ok(outcome) => {
                let changed = outcome == SaveOutcome::Saved
                    || done.notifications.iter().any(|n| !n.is_empty());
                if changed {
                    for note in &done.notifications {
                        self.main.apply_remote(note);
                    }
                    let main_ok = if self.main.has_changes() {
                        match self.main.save() {
                            Ok(_) => true,
                            Err(e) => {
                                warn!(error = %e, "main-context save during background merge failed");
                                false
                            }
                        }
                    } else {
                        true
                    };
                    let main_notes = self.main.take_notifications();
                    for note in done.notifications.iter().chain(main_notes.iter()) {
                        self.dispatch(note);
                    }
                    main_ok
                } else {
                    debug!("background task finished without changes");
                    false
                }
            }
            Err(e) => {
                warn!(error = %e, "background task failed");
                false
            }
        };
        let completion = self.completions.borrow_mut().remove(&done.task_id);
        if let Some(completion) = completion {
            completion(success);
        }
    }

    fn dispatch(&self, note: &SaveNotification) {
        if note.is_empty() {
            return;
        }
        let subscribers: Vec<Rc<dyn SaveSubscriber>> = {
            let mut list = self.subscribers.borrow_mut();
            list.retain(|weak| weak.strong_count() > 0);
            list.iter().filter_map(Weak::upgrade).collect()
        };
        for subscriber in subscribers {
            subscriber.on_save(&self.main, note);
        }
    }
}

fn run_background<W>(
    shared: &Shared,
    work: W,
) -> StoreResult<(SaveOutcome, Vec<SaveNotification>)>
where
    W: FnOnce(&Context),
{
    let conn = open_connection(shared)?;
    let ctx = Context::new_background(conn, shared.policy);
    work(&ctx);
    let outcome = if ctx.has_changes() {
        ctx.save()?
    } else {
        SaveOutcome::NoChanges
    };
    Ok((outcome, ctx.take_notifications()))
}

fn open_connection(shared: &Shared) -> StoreResult<Connection> {
    let conn = match &shared.location {
        StoreLocation::File(path) => Connection::open(path)?,
        StoreLocation::Memory(name) => Connection::open_with_flags(
            format!("file:{name}?mode=memory&cache=shared"),
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?,
    };
    conn.busy_timeout(Duration::from_millis(shared.busy_timeout_ms))?;
    // WAL keeps the one-writer-many-readers context model safe on a single
    // file; in-memory stores keep their own journal mode.
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA synchronous = NORMAL;",
    )?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS records (
            id TEXT PRIMARY KEY,
            record_type TEXT NOT NULL,
            data TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            modified_at INTEGER NOT NULL,
            version INTEGER NOT NULL DEFAULT 1
        );
        CREATE INDEX IF NOT EXISTS idx_records_type ON records(record_type);
        CREATE INDEX IF NOT EXISTS idx_records_type_created ON records(record_type, created_at);",
    )?;
    Ok(())
}

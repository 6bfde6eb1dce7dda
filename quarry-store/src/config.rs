//! Store configuration.
//!
//! A [`StoreConfig`] is built once at startup and consumed by
//! [`Store::open`](crate::Store::open). The merge policy is part of the
//! configuration on purpose: it is fixed before the store opens and there is
//! no way to change it afterwards — conflicting writes are resolved by one
//! rule for the whole process lifetime.

use std::path::PathBuf;

/// How a save combines with concurrently modified state.
///
/// The policy applies in two places: when a save finds the stored row changed
/// since it was fetched, and when a committed background write propagates
/// into a main-context record that has unsaved edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergePolicy {
    /// Any concurrent modification fails the save with
    /// [`StoreError::Conflict`](crate::StoreError::Conflict).
    #[default]
    FailOnConflict,
    /// Per property: the stored value wins where both sides changed it;
    /// local edits to untouched properties survive.
    StoreWins,
    /// Per property: the local edit wins where both sides changed it;
    /// stored changes to untouched properties survive.
    RecordWins,
    /// The incoming committed state wins wholesale; unsaved local edits to
    /// the same record are discarded.
    Overwrite,
    /// On conflict, discard the local edits and refresh from the store.
    Rollback,
}

/// Where the store file lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// A single named database file.
    File(PathBuf),
    /// A named in-memory database (SQLite shared cache), usable by the main
    /// and background contexts alike. Lives as long as the store's own
    /// connection. Intended for tests.
    Memory(String),
}

/// Configuration consumed by [`Store::open`](crate::Store::open).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub(crate) location: StoreLocation,
    pub(crate) policy: MergePolicy,
    pub(crate) busy_timeout_ms: u64,
}

impl StoreConfig {
    /// Configuration for an on-disk store at `path`.
    #[must_use]
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            location: StoreLocation::File(path.into()),
            policy: MergePolicy::default(),
            busy_timeout_ms: 5_000,
        }
    }

    /// Configuration for a named in-memory store.
    #[must_use]
    pub fn in_memory(name: impl Into<String>) -> Self {
        Self {
            location: StoreLocation::Memory(name.into()),
            policy: MergePolicy::default(),
            busy_timeout_ms: 5_000,
        }
    }

    /// Sets the merge policy. Must be decided before the store opens;
    /// the open store exposes it read-only.
    #[must_use]
    pub fn merge_policy(mut self, policy: MergePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets how long a connection waits on a locked database before its
    /// statement fails.
    #[must_use]
    pub fn busy_timeout_ms(mut self, ms: u64) -> Self {
        self.busy_timeout_ms = ms;
        self
    }
}

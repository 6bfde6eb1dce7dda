//! Save notifications.
//!
//! Every successful save produces one [`SaveNotification`] describing the
//! committed change set. The store routes notifications to the main thread,
//! reconciles the main context's cache with them, and hands them to
//! registered [`SaveSubscriber`]s (the observer bridge).

use crate::Context;
use quarry_types::RecordId;
use serde_json::Value;

/// One committed insert or update.
#[derive(Debug, Clone)]
pub struct ChangedRecord {
    pub record_type: String,
    pub id: RecordId,
    /// Payload as committed (after any merge).
    pub data: Value,
    pub version: i64,
    pub created_at: i64,
    pub modified_at: i64,
}

/// The committed change set of one save cycle.
#[derive(Debug, Clone, Default)]
pub struct SaveNotification {
    pub inserted: Vec<ChangedRecord>,
    pub updated: Vec<ChangedRecord>,
    pub deleted: Vec<(String, RecordId)>,
}

impl SaveNotification {
    /// True when the save touched nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    /// True when the change set touches the given record type.
    #[must_use]
    pub fn touches(&self, record_type: &str) -> bool {
        self.inserted.iter().any(|c| c.record_type == record_type)
            || self.updated.iter().any(|c| c.record_type == record_type)
            || self.deleted.iter().any(|(t, _)| t == record_type)
    }
}

/// A main-thread consumer of save notifications.
///
/// The store holds subscribers by non-owning handle only; the owning side
/// keeps the strong reference and the registration dies with it. Callbacks
/// run on the main thread with the main context available for re-fetching.
pub trait SaveSubscriber {
    fn on_save(&self, main: &Context, notification: &SaveNotification);
}

//! Change batches.
//!
//! A [`ChangeBatch`] is the ordered set of structural operations that
//! transforms one observed result set into the next: section inserts and
//! deletes, row inserts/deletes/updates, and row moves. It is produced once
//! per save cycle per live observer, consumed by the sink, and discarded.

use serde::{Deserialize, Serialize};

/// A row position: section index, row index within the section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowPath {
    pub section: usize,
    pub row: usize,
}

impl RowPath {
    #[must_use]
    pub const fn new(section: usize, row: usize) -> Self {
        Self { section, row }
    }
}

/// One save cycle's structural operations, in deterministic order.
///
/// Section indices refer to the old snapshot for deletes and the new
/// snapshot for inserts; row paths likewise (moves carry both). Rows inside
/// an inserted or deleted section are covered by the section operation and
/// are not reported individually.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeBatch {
    pub inserted_sections: Vec<usize>,
    pub deleted_sections: Vec<usize>,
    pub inserted_rows: Vec<RowPath>,
    pub deleted_rows: Vec<RowPath>,
    pub updated_rows: Vec<RowPath>,
    /// `(from, to)` pairs; `from` in old coordinates, `to` in new.
    pub moved_rows: Vec<(RowPath, RowPath)>,
}

impl ChangeBatch {
    /// True when the batch carries no operation.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inserted_sections.is_empty()
            && self.deleted_sections.is_empty()
            && self.inserted_rows.is_empty()
            && self.deleted_rows.is_empty()
            && self.updated_rows.is_empty()
            && self.moved_rows.is_empty()
    }

    /// The synthetic batch a reload emits: all old sections replaced by all
    /// new ones.
    #[must_use]
    pub fn full_reload(old_sections: usize, new_sections: usize) -> Self {
        Self {
            deleted_sections: (0..old_sections).collect(),
            inserted_sections: (0..new_sections).collect(),
            ..Self::default()
        }
    }
}

//! Query recipes.
//!
//! A [`Recipe`] bundles everything a read operation needs: an optional
//! predicate, an ordered sort list, a result range, and an optional distinct
//! projection. Recipes are plain values with no entity-type binding, so one
//! recipe can be shared between an observer and a one-shot fetch, or reused
//! across record types whose payloads carry the same field names.

use crate::Predicate;
use serde::{Deserialize, Serialize};

/// One sort key with direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortDescriptor {
    /// Payload field path, or one of the store-maintained fields
    /// `created_at` / `modified_at`.
    pub key: String,
    pub ascending: bool,
}

impl SortDescriptor {
    #[must_use]
    pub fn new(key: impl Into<String>, ascending: bool) -> Self {
        Self {
            key: key.into(),
            ascending,
        }
    }

    #[must_use]
    pub fn ascending(key: impl Into<String>) -> Self {
        Self::new(key, true)
    }

    #[must_use]
    pub fn descending(key: impl Into<String>) -> Self {
        Self::new(key, false)
    }
}

/// The result range of a read operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Range {
    /// All matching records.
    #[default]
    All,
    /// Only the first matching record.
    First,
    /// A window of matching records.
    Window { offset: u64, limit: u64 },
}

/// A distinct projection: the result rows are deduplicated tuples of the
/// projected fields rather than full records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistinctProjection {
    pub keys: Vec<String>,
}

/// A declarative description of a query.
///
/// Immutable once handed to an operation; equality is value-based.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Recipe {
    pub predicate: Option<Predicate>,
    pub sorts: Vec<SortDescriptor>,
    pub range: Range,
    pub distinct: Option<DistinctProjection>,
}

impl Recipe {
    /// An unrestricted recipe: every record, store default order.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the recipe to records matching `predicate`.
    #[must_use]
    pub fn filtered(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Appends a sort key.
    #[must_use]
    pub fn sorted_by(mut self, key: impl Into<String>, ascending: bool) -> Self {
        self.sorts.push(SortDescriptor::new(key, ascending));
        self
    }

    /// Restricts the result to the first matching record.
    #[must_use]
    pub fn first_only(mut self) -> Self {
        self.range = Range::First;
        self
    }

    /// Restricts the result to a window of matching records.
    #[must_use]
    pub fn window(mut self, offset: u64, limit: u64) -> Self {
        self.range = Range::Window { offset, limit };
        self
    }

    /// Projects the result onto distinct tuples of the given fields.
    #[must_use]
    pub fn distinct_on(mut self, keys: Vec<String>) -> Self {
        self.distinct = Some(DistinctProjection { keys });
        self
    }
}

//! Change-observer bridge for Quarry.
//!
//! Converts store mutations into ordered, section-aware structural
//! operations for live-updating list views:
//! - [`RecipeObserver`] — a live query (record type + recipe + optional
//!   section key) bound to a consumer
//! - [`ChangeBatch`] — the per-save-cycle set of section/row operations
//! - [`ChangeSink`] — the consumer contract
//!   (`will_change` / `apply` / `did_change`)
//!
//! Observers recompute their ordered result set on every save that touches
//! their record type, diff it against the previous snapshot by record
//! identity, and deliver the minimal structural batch. A record that merely
//! changed position is a move, never a delete plus insert.

mod batch;
mod diff;
mod observer;
mod sink;

pub use batch::{ChangeBatch, RowPath};
pub use observer::RecipeObserver;
pub use sink::ChangeSink;

//! Core value types for the Quarry persistence layer.
//!
//! This crate defines the fundamental, schema-agnostic types the store and
//! observer crates are built on:
//! - [`RecordId`] — stable record identity (UUID v7, time-ordered)
//! - [`Literal`] — the closed literal type predicates are built from
//! - [`Predicate`] — the query predicate algebra
//! - [`Recipe`] — a declarative bundle of predicate + sort + range + projection
//!
//! Everything here is a plain value: cloneable, comparable, serializable,
//! and free of any storage or threading concerns. Domain fields (what a
//! record's payload actually contains) belong to the surrounding application,
//! not here.

mod ids;
mod literal;
mod predicate;
mod recipe;

pub use ids::RecordId;
pub use literal::Literal;
pub use predicate::Predicate;
pub use recipe::{DistinctProjection, Range, Recipe, SortDescriptor};

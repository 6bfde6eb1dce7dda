//! The predicate algebra.
//!
//! Predicates are a small expression tree over record payload fields. They
//! are pure values: construction never touches storage, and compilation to
//! SQL happens in one place inside the store crate.
//!
//! Field keys are dotted paths of identifier segments (`"status"`,
//! `"author.name"`). A constructor handed a key it cannot represent returns
//! [`Predicate::Never`], the deterministic null-matching predicate, instead
//! of failing later at fetch time.

use crate::Literal;
use serde::{Deserialize, Serialize};

/// A query predicate over record payload fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    /// Field equals the literal. `Equal(key, Null)` matches missing fields.
    Equal(String, Literal),
    /// Field is present, non-null, and differs from the literal.
    NotEqual(String, Literal),
    /// Field equals one of the literals.
    In(String, Vec<Literal>),
    /// Field is present, non-null, and equals none of the literals.
    NotIn(String, Vec<Literal>),
    /// Field is a string containing the substring (ASCII case-insensitive).
    Contains(String, String),
    /// Field is a string not containing the substring (ASCII case-insensitive).
    NotContains(String, String),
    /// All subpredicates hold. `And([])` matches everything.
    And(Vec<Predicate>),
    /// Any subpredicate holds. `Or([])` matches nothing.
    Or(Vec<Predicate>),
    /// Raw native SQL fragment, inlined verbatim. Escape hatch only; not
    /// evaluable in memory and never produced by the other constructors.
    Raw(String),
    /// Matches no record.
    Never,
}

impl Predicate {
    /// `key == literal`. An invalid key yields [`Predicate::Never`].
    #[must_use]
    pub fn equal(key: impl Into<String>, literal: impl Into<Literal>) -> Self {
        Self::checked(key, |k| Predicate::Equal(k, literal.into()))
    }

    /// `key != literal` (null and missing fields do not match).
    #[must_use]
    pub fn not_equal(key: impl Into<String>, literal: impl Into<Literal>) -> Self {
        Self::checked(key, |k| Predicate::NotEqual(k, literal.into()))
    }

    /// `key ∈ literals`. An empty set yields [`Predicate::Never`].
    #[must_use]
    pub fn is_in(key: impl Into<String>, literals: Vec<Literal>) -> Self {
        if literals.is_empty() {
            return Predicate::Never;
        }
        Self::checked(key, |k| Predicate::In(k, literals))
    }

    /// `key ∉ literals`. An empty set matches everything.
    #[must_use]
    pub fn not_in(key: impl Into<String>, literals: Vec<Literal>) -> Self {
        if literals.is_empty() {
            return Predicate::And(Vec::new());
        }
        Self::checked(key, |k| Predicate::NotIn(k, literals))
    }

    /// String field at `key` contains `needle`, ASCII case-insensitively.
    #[must_use]
    pub fn contains(key: impl Into<String>, needle: impl Into<String>) -> Self {
        let needle = needle.into();
        Self::checked(key, |k| Predicate::Contains(k, needle))
    }

    /// String field at `key` does not contain `needle`. Non-string and
    /// missing fields do not match.
    #[must_use]
    pub fn not_contains(key: impl Into<String>, needle: impl Into<String>) -> Self {
        let needle = needle.into();
        Self::checked(key, |k| Predicate::NotContains(k, needle))
    }

    /// Conjunction of subpredicates.
    #[must_use]
    pub fn and(predicates: Vec<Predicate>) -> Self {
        Predicate::And(predicates)
    }

    /// Disjunction of subpredicates.
    #[must_use]
    pub fn or(predicates: Vec<Predicate>) -> Self {
        Predicate::Or(predicates)
    }

    /// Raw SQL escape hatch.
    #[must_use]
    pub fn raw(sql: impl Into<String>) -> Self {
        Predicate::Raw(sql.into())
    }

    fn checked(key: impl Into<String>, build: impl FnOnce(String) -> Self) -> Self {
        let key = key.into();
        if is_valid_key(&key) {
            build(key)
        } else {
            Predicate::Never
        }
    }

    /// Evaluates this predicate against a record payload in memory.
    ///
    /// Mirrors the store's SQL semantics, including its treatment of null
    /// and missing fields (a non-null comparison never matches them).
    /// [`Predicate::Raw`] cannot be evaluated here and matches nothing.
    #[must_use]
    pub fn matches(&self, data: &serde_json::Value) -> bool {
        match self {
            Predicate::Equal(key, literal) => match lookup(data, key) {
                Some(value) => literal.equals_json(value),
                None => literal.is_null(),
            },
            Predicate::NotEqual(key, literal) => match lookup(data, key) {
                Some(value) if value.is_null() => false,
                Some(value) => {
                    if literal.is_null() {
                        true
                    } else {
                        !literal.equals_json(value)
                    }
                }
                None => false,
            },
            Predicate::In(key, literals) => match lookup(data, key) {
                Some(value) if value.is_null() => literals.iter().any(Literal::is_null),
                Some(value) => literals.iter().any(|l| l.equals_json(value)),
                None => literals.iter().any(Literal::is_null),
            },
            Predicate::NotIn(key, literals) => match lookup(data, key) {
                Some(value) if !value.is_null() => {
                    !literals.iter().any(|l| l.equals_json(value))
                }
                _ => false,
            },
            Predicate::Contains(key, needle) => match lookup(data, key) {
                Some(serde_json::Value::String(s)) => s
                    .to_ascii_lowercase()
                    .contains(&needle.to_ascii_lowercase()),
                _ => false,
            },
            Predicate::NotContains(key, needle) => match lookup(data, key) {
                Some(serde_json::Value::String(s)) => !s
                    .to_ascii_lowercase()
                    .contains(&needle.to_ascii_lowercase()),
                _ => false,
            },
            Predicate::And(subs) => subs.iter().all(|p| p.matches(data)),
            Predicate::Or(subs) => subs.iter().any(|p| p.matches(data)),
            Predicate::Raw(_) => false,
            Predicate::Never => false,
        }
    }
}

/// Resolves a dotted field path against a JSON payload.
fn lookup<'a>(data: &'a serde_json::Value, key: &str) -> Option<&'a serde_json::Value> {
    let mut current = data;
    for segment in key.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// A valid key is a dotted path of non-empty identifier segments.
pub(crate) fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

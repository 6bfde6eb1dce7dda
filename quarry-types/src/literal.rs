//! The closed literal type for predicate values.
//!
//! Predicate literals are restricted to text, numbers, and null. The
//! restriction is decided here, at construction time, so the store's query
//! compiler never has to type-dispatch at fetch time. Callers holding other
//! value shapes (dates, enums, booleans) normalize them to one of these three
//! before building a predicate.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A scalar literal usable in a predicate comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    /// A UTF-8 string value.
    Text(String),
    /// A numeric value. Integers are widened to `f64`.
    Number(f64),
    /// The null value; `Equal(key, Null)` matches missing and null fields.
    Null,
}

impl Literal {
    /// Converts this literal into its JSON representation.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Literal::Text(s) => serde_json::Value::String(s.clone()),
            Literal::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Literal::Null => serde_json::Value::Null,
        }
    }

    /// Returns true if this literal equals the given JSON value.
    ///
    /// Numbers compare numerically regardless of integer/float
    /// representation; text compares exactly. `Null` matches JSON null.
    #[must_use]
    pub fn equals_json(&self, value: &serde_json::Value) -> bool {
        match self {
            Literal::Text(s) => value.as_str() == Some(s.as_str()),
            Literal::Number(n) => value.as_f64() == Some(*n),
            Literal::Null => value.is_null(),
        }
    }

    /// Returns true if this is the null literal.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Literal::Null)
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Text(s) => write!(f, "{s:?}"),
            Literal::Number(n) => write!(f, "{n}"),
            Literal::Null => write!(f, "null"),
        }
    }
}

impl From<&str> for Literal {
    fn from(s: &str) -> Self {
        Literal::Text(s.to_string())
    }
}

impl From<String> for Literal {
    fn from(s: String) -> Self {
        Literal::Text(s)
    }
}

impl From<f64> for Literal {
    fn from(n: f64) -> Self {
        Literal::Number(n)
    }
}

impl From<i64> for Literal {
    fn from(n: i64) -> Self {
        Literal::Number(n as f64)
    }
}

impl From<i32> for Literal {
    fn from(n: i32) -> Self {
        Literal::Number(f64::from(n))
    }
}

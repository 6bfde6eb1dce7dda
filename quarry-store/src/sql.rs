//! Compilation of predicates and recipes to SQL.
//!
//! This module is the single place recipe semantics are interpreted. Payload
//! fields are addressed with `json_extract(data, '$.path')`; the
//! store-maintained fields `id`, `created_at` and `modified_at` map to their
//! columns. Whatever the recipe says, the order clause ends with
//! `created_at ASC, id ASC` so results are always deterministically ordered.
//!
//! Null semantics follow SQL three-valued logic: a non-null comparison never
//! matches a missing or null field. `Predicate::matches` mirrors these rules
//! for in-memory evaluation.

use quarry_types::{Literal, Predicate, Range, Recipe};
use rusqlite::types::Value as SqlValue;

/// A compiled SELECT tail: `WHERE …`, `ORDER BY …`, `LIMIT …` plus the
/// positional parameters bound by the WHERE clause.
#[derive(Debug)]
pub(crate) struct CompiledQuery {
    pub(crate) where_clause: String,
    pub(crate) order_clause: String,
    pub(crate) limit_clause: String,
    pub(crate) params: Vec<SqlValue>,
}

/// Compiles the WHERE/ORDER/LIMIT tail for a record type and recipe.
pub(crate) fn compile(record_type: &str, recipe: &Recipe) -> CompiledQuery {
    let mut params: Vec<SqlValue> = vec![SqlValue::Text(record_type.to_string())];
    let mut where_clause = String::from("WHERE record_type = ?");
    if let Some(predicate) = &recipe.predicate {
        let fragment = compile_predicate(predicate, &mut params);
        where_clause.push_str(" AND ");
        where_clause.push_str(&fragment);
    }

    let mut order_terms: Vec<String> = recipe
        .sorts
        .iter()
        .filter(|s| is_valid_key(&s.key))
        .map(|s| {
            format!(
                "{} {}",
                field_expr(&s.key),
                if s.ascending { "ASC" } else { "DESC" }
            )
        })
        .collect();
    // Creation-order tie-breaker keeps list output stable for equal keys.
    order_terms.push("created_at ASC".to_string());
    order_terms.push("id ASC".to_string());
    let order_clause = format!("ORDER BY {}", order_terms.join(", "));

    let limit_clause = match recipe.range {
        Range::All => String::new(),
        Range::First => "LIMIT 1".to_string(),
        Range::Window { offset, limit } => format!("LIMIT {limit} OFFSET {offset}"),
    };

    CompiledQuery {
        where_clause,
        order_clause,
        limit_clause,
        params,
    }
}

/// Compiles a distinct projection: `SELECT DISTINCT k1, k2 … ` with the
/// recipe's WHERE and range applied.
///
/// ORDER BY terms on a DISTINCT select must appear in the result set, so the
/// order is taken from the recipe's sort keys that are themselves projected;
/// if none are, the projection orders by all projected fields ascending.
pub(crate) fn compile_distinct(
    record_type: &str,
    recipe: &Recipe,
    keys: &[String],
) -> (String, Vec<SqlValue>) {
    let compiled = compile(record_type, recipe);
    let columns: Vec<String> = keys
        .iter()
        .filter(|k| is_valid_key(k))
        .map(|k| field_expr(k))
        .collect();

    let mut order_terms: Vec<String> = recipe
        .sorts
        .iter()
        .filter(|s| keys.contains(&s.key) && is_valid_key(&s.key))
        .map(|s| {
            format!(
                "{} {}",
                field_expr(&s.key),
                if s.ascending { "ASC" } else { "DESC" }
            )
        })
        .collect();
    if order_terms.is_empty() {
        order_terms = columns.iter().map(|c| format!("{c} ASC")).collect();
    }

    let sql = format!(
        "SELECT DISTINCT {} FROM records {} ORDER BY {} {}",
        columns.join(", "),
        compiled.where_clause,
        order_terms.join(", "),
        compiled.limit_clause,
    );
    (sql, compiled.params)
}

/// Maps a field key to its SQL expression.
fn field_expr(key: &str) -> String {
    match key {
        "id" | "created_at" | "modified_at" => key.to_string(),
        _ => format!("json_extract(data, '$.{key}')"),
    }
}

/// True when the key addresses the JSON payload rather than a column.
fn is_payload_key(key: &str) -> bool {
    !matches!(key, "id" | "created_at" | "modified_at")
}

/// Compiles one predicate to a parenthesized SQL fragment, appending its
/// bound parameters.
pub(crate) fn compile_predicate(predicate: &Predicate, params: &mut Vec<SqlValue>) -> String {
    match predicate {
        Predicate::Equal(key, literal) => {
            if !is_valid_key(key) {
                return never();
            }
            let expr = field_expr(key);
            match literal {
                Literal::Null => format!("{expr} IS NULL"),
                _ => {
                    params.push(literal_param(literal));
                    format!("{expr} = ?")
                }
            }
        }
        Predicate::NotEqual(key, literal) => {
            if !is_valid_key(key) {
                return never();
            }
            let expr = field_expr(key);
            match literal {
                Literal::Null => format!("{expr} IS NOT NULL"),
                _ => {
                    params.push(literal_param(literal));
                    format!("({expr} IS NOT NULL AND {expr} <> ?)")
                }
            }
        }
        Predicate::In(key, literals) => {
            if !is_valid_key(key) || literals.is_empty() {
                return never();
            }
            let expr = field_expr(key);
            let non_null: Vec<&Literal> =
                literals.iter().filter(|l| !l.is_null()).collect();
            let has_null = literals.len() != non_null.len();
            let membership = if non_null.is_empty() {
                None
            } else {
                for literal in &non_null {
                    params.push(literal_param(literal));
                }
                let placeholders = vec!["?"; non_null.len()].join(", ");
                Some(format!("{expr} IN ({placeholders})"))
            };
            match (membership, has_null) {
                (Some(m), true) => format!("({m} OR {expr} IS NULL)"),
                (Some(m), false) => m,
                (None, true) => format!("{expr} IS NULL"),
                (None, false) => never(),
            }
        }
        Predicate::NotIn(key, literals) => {
            if !is_valid_key(key) {
                return never();
            }
            let expr = field_expr(key);
            // Null literals can never equal a non-null value; drop them.
            let non_null: Vec<&Literal> =
                literals.iter().filter(|l| !l.is_null()).collect();
            if non_null.is_empty() {
                return format!("{expr} IS NOT NULL");
            }
            for literal in &non_null {
                params.push(literal_param(literal));
            }
            let placeholders = vec!["?"; non_null.len()].join(", ");
            format!("({expr} IS NOT NULL AND {expr} NOT IN ({placeholders}))")
        }
        Predicate::Contains(key, needle) => {
            contains_fragment(key, needle, params, false)
        }
        Predicate::NotContains(key, needle) => {
            contains_fragment(key, needle, params, true)
        }
        Predicate::And(subs) => {
            if subs.is_empty() {
                return "1 = 1".to_string();
            }
            let parts: Vec<String> =
                subs.iter().map(|p| compile_predicate(p, params)).collect();
            format!("({})", parts.join(" AND "))
        }
        Predicate::Or(subs) => {
            if subs.is_empty() {
                return never();
            }
            let parts: Vec<String> =
                subs.iter().map(|p| compile_predicate(p, params)).collect();
            format!("({})", parts.join(" OR "))
        }
        Predicate::Raw(sql) => format!("({sql})"),
        Predicate::Never => never(),
    }
}

/// Substring match against a text payload field. SQLite's LIKE is ASCII
/// case-insensitive by default, which matches the in-memory evaluation.
fn contains_fragment(
    key: &str,
    needle: &str,
    params: &mut Vec<SqlValue>,
    negated: bool,
) -> String {
    // Substring search only makes sense on payload text fields.
    if !is_valid_key(key) || !is_payload_key(key) {
        return never();
    }
    let expr = field_expr(key);
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    params.push(SqlValue::Text(escaped));
    let op = if negated { "NOT LIKE" } else { "LIKE" };
    format!(
        "(json_type(data, '$.{key}') = 'text' AND {expr} {op} '%' || ? || '%' ESCAPE '\\')"
    )
}

fn literal_param(literal: &Literal) -> SqlValue {
    match literal {
        Literal::Text(s) => SqlValue::Text(s.clone()),
        Literal::Number(n) => SqlValue::Real(*n),
        Literal::Null => SqlValue::Null,
    }
}

fn never() -> String {
    "0 = 1".to_string()
}

/// A valid key is a dotted path of non-empty identifier segments. Re-checked
/// here because predicates can arrive deserialized, bypassing the validating
/// constructors; an invalid key compiles to the null-matching fragment.
pub(crate) fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

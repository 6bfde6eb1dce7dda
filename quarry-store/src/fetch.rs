//! The fetch engine.
//!
//! Four read operations — `get`, `list`, `count`, `list_distinct` — plus
//! their fallible `try_` forms, all executed against a context.
//!
//! The plain forms implement the layer's read error policy: a storage-level
//! failure is logged at `warn` and surfaces as an empty result (`None`,
//! empty vec, zero) because the consuming screen has no meaningful recovery
//! action. Callers that do need to distinguish a failed fetch from a truly
//! empty one — the observer bridge is one — use the `try_` forms.
//!
//! With no sort in the recipe, results come back in store default order:
//! `created_at ASC, id ASC`.

use crate::error::{StoreError, StoreResult};
use crate::record::{RawRow, RecordRef};
use crate::sql;
use crate::Context;
use quarry_types::{Predicate, Range, Recipe, RecordId};
use serde_json::Value;
use tracing::warn;

impl Context {
    /// Returns the first record matching the predicate, or `None`.
    #[must_use]
    pub fn get(&self, record_type: &str, predicate: Option<&Predicate>) -> Option<RecordRef> {
        self.try_get(record_type, predicate).unwrap_or_else(|e| {
            warn!(record_type, error = %e, "get failed; returning none");
            None
        })
    }

    /// Fallible form of [`get`](Self::get).
    pub fn try_get(
        &self,
        record_type: &str,
        predicate: Option<&Predicate>,
    ) -> StoreResult<Option<RecordRef>> {
        let recipe = Recipe {
            predicate: predicate.cloned(),
            range: Range::First,
            ..Recipe::default()
        };
        Ok(self.try_list(record_type, &recipe)?.into_iter().next())
    }

    /// Returns all records matching the recipe, ordered per its sort keys.
    #[must_use]
    pub fn list(&self, record_type: &str, recipe: &Recipe) -> Vec<RecordRef> {
        self.try_list(record_type, recipe).unwrap_or_else(|e| {
            warn!(record_type, error = %e, "list failed; returning empty result");
            Vec::new()
        })
    }

    /// Fallible form of [`list`](Self::list).
    pub fn try_list(&self, record_type: &str, recipe: &Recipe) -> StoreResult<Vec<RecordRef>> {
        self.assert_owner();
        let rows = self.select_rows(record_type, recipe)?;
        Ok(rows
            .into_iter()
            .filter_map(|row| self.materialize(row))
            .collect())
    }

    /// Counts records matching the predicate within the range.
    #[must_use]
    pub fn count(&self, record_type: &str, predicate: Option<&Predicate>, range: Range) -> usize {
        self.try_count(record_type, predicate, range)
            .unwrap_or_else(|e| {
                warn!(record_type, error = %e, "count failed; returning zero");
                0
            })
    }

    /// Fallible form of [`count`](Self::count).
    pub fn try_count(
        &self,
        record_type: &str,
        predicate: Option<&Predicate>,
        range: Range,
    ) -> StoreResult<usize> {
        self.assert_owner();
        let recipe = Recipe {
            predicate: predicate.cloned(),
            range,
            ..Recipe::default()
        };
        let compiled = sql::compile(record_type, &recipe);
        let query = match range {
            Range::All => format!(
                "SELECT COUNT(*) FROM records {}",
                compiled.where_clause
            ),
            _ => format!(
                "SELECT COUNT(*) FROM (SELECT id FROM records {} {} {})",
                compiled.where_clause, compiled.order_clause, compiled.limit_clause
            ),
        };
        let count: i64 = self.conn().query_row(
            &query,
            rusqlite::params_from_iter(compiled.params),
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Returns deduplicated projected tuples for a recipe with a distinct
    /// projection, one JSON object per tuple. Used for category/group
    /// enumeration without materializing full records.
    #[must_use]
    pub fn list_distinct(&self, record_type: &str, recipe: &Recipe) -> Vec<Value> {
        self.try_list_distinct(record_type, recipe)
            .unwrap_or_else(|e| {
                warn!(record_type, error = %e, "distinct list failed; returning empty result");
                Vec::new()
            })
    }

    /// Fallible form of [`list_distinct`](Self::list_distinct).
    pub fn try_list_distinct(
        &self,
        record_type: &str,
        recipe: &Recipe,
    ) -> StoreResult<Vec<Value>> {
        self.assert_owner();
        let Some(projection) = &recipe.distinct else {
            return Err(StoreError::InvalidRequest(
                "list_distinct requires a recipe with a distinct projection".into(),
            ));
        };
        let keys: Vec<String> = projection
            .keys
            .iter()
            .filter(|k| sql::is_valid_key(k))
            .cloned()
            .collect();
        if keys.is_empty() {
            return Err(StoreError::InvalidRequest(
                "distinct projection has no valid keys".into(),
            ));
        }

        let (query, params) = sql::compile_distinct(record_type, recipe, &keys);
        let mut stmt = self.conn().prepare(&query)?;
        let mut rows = stmt.query(rusqlite::params_from_iter(params))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut object = serde_json::Map::new();
            for (i, key) in keys.iter().enumerate() {
                let value: rusqlite::types::Value = row.get(i)?;
                object.insert(key.clone(), sql_value_to_json(value));
            }
            out.push(Value::Object(object));
        }
        Ok(out)
    }

    fn select_rows(&self, record_type: &str, recipe: &Recipe) -> StoreResult<Vec<RawRow>> {
        let compiled = sql::compile(record_type, recipe);
        let query = format!(
            "SELECT id, record_type, data, created_at, modified_at, version
             FROM records {} {} {}",
            compiled.where_clause, compiled.order_clause, compiled.limit_clause
        );
        let mut stmt = self.conn().prepare(&query)?;
        let mut rows = stmt.query(rusqlite::params_from_iter(compiled.params))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            let data_json: String = row.get(2)?;
            out.push(RawRow {
                id: RecordId::parse(&id)?,
                record_type: row.get(1)?,
                data: serde_json::from_str(&data_json)?,
                created_at: row.get(3)?,
                modified_at: row.get(4)?,
                version: row.get(5)?,
            });
        }
        Ok(out)
    }
}

fn sql_value_to_json(value: rusqlite::types::Value) -> Value {
    use rusqlite::types::Value as Sql;
    match value {
        Sql::Null => Value::Null,
        Sql::Integer(i) => Value::Number(i.into()),
        Sql::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Sql::Text(s) => Value::String(s),
        Sql::Blob(_) => Value::Null,
    }
}

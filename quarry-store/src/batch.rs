//! The batch mutator.
//!
//! Direct storage-level update and delete, bypassing per-record
//! materialization. The trade-off is explicit: batch operations are for
//! throughput, and they interact with context caches as little as possible.
//!
//! - `batch_update` refreshes no cache at all. A caller holding live handles
//!   for affected rows must re-fetch by identity; the handles keep serving
//!   their pre-update values until then.
//! - `batch_delete` does reconcile: held handles for deleted rows flip to the
//!   deleted sentinel instead of dangling, and a deletion notification flows
//!   to the main thread so observers and the main cache catch up.

use crate::error::{StoreError, StoreResult};
use crate::notify::SaveNotification;
use crate::sql;
use crate::Context;
use quarry_types::{Predicate, RecordId};
use rusqlite::types::Value as SqlValue;
use serde_json::Value;
use tracing::{debug, warn};

impl Context {
    /// Applies field values to every matching record directly in storage.
    /// Returns the number of affected rows; failures are logged and
    /// surface as zero.
    pub fn batch_update(
        &self,
        record_type: &str,
        predicate: &Predicate,
        fields: &serde_json::Map<String, Value>,
    ) -> usize {
        self.try_batch_update(record_type, predicate, fields)
            .unwrap_or_else(|e| {
                warn!(record_type, error = %e, "batch update failed");
                0
            })
    }

    /// Fallible form of [`batch_update`](Self::batch_update).
    pub fn try_batch_update(
        &self,
        record_type: &str,
        predicate: &Predicate,
        fields: &serde_json::Map<String, Value>,
    ) -> StoreResult<usize> {
        self.assert_owner();
        if fields.is_empty() {
            return Ok(0);
        }
        if let Some(bad) = fields.keys().find(|k| !sql::is_valid_key(k)) {
            return Err(StoreError::InvalidRequest(format!(
                "invalid batch update field key: {bad:?}"
            )));
        }

        let mut params: Vec<SqlValue> = Vec::new();
        let mut set_terms = String::from("data = json_set(data");
        for (key, value) in fields {
            set_terms.push_str(&format!(", '$.{key}', json(?)"));
            params.push(SqlValue::Text(serde_json::to_string(value)?));
        }
        set_terms.push(')');
        params.push(SqlValue::Integer(crate::record::now_millis()));
        params.push(SqlValue::Text(record_type.to_string()));
        let fragment = sql::compile_predicate(predicate, &mut params);

        let query = format!(
            "UPDATE records SET {set_terms}, modified_at = ?, version = version + 1
             WHERE record_type = ? AND {fragment}"
        );
        let affected = self
            .conn()
            .execute(&query, rusqlite::params_from_iter(params))?;
        debug!(record_type, affected, "batch update applied");
        Ok(affected)
    }

    /// Deletes every matching record directly in storage, then flips this
    /// context's cached handles for those rows to the deleted sentinel.
    /// Returns the number of deleted rows; failures are logged and surface
    /// as zero.
    pub fn batch_delete(&self, record_type: &str, predicate: &Predicate) -> usize {
        self.try_batch_delete(record_type, predicate)
            .unwrap_or_else(|e| {
                warn!(record_type, error = %e, "batch delete failed");
                0
            })
    }

    /// Fallible form of [`batch_delete`](Self::batch_delete).
    pub fn try_batch_delete(
        &self,
        record_type: &str,
        predicate: &Predicate,
    ) -> StoreResult<usize> {
        self.assert_owner();
        let mut params: Vec<SqlValue> = vec![SqlValue::Text(record_type.to_string())];
        let fragment = sql::compile_predicate(predicate, &mut params);
        let where_clause = format!("WHERE record_type = ? AND {fragment}");

        let tx = self.conn().unchecked_transaction()?;
        let ids: Vec<RecordId> = {
            let mut stmt =
                tx.prepare(&format!("SELECT id FROM records {where_clause}"))?;
            let mut rows = stmt.query(rusqlite::params_from_iter(params.clone()))?;
            let mut ids = Vec::new();
            while let Some(row) = rows.next()? {
                let id: String = row.get(0)?;
                ids.push(RecordId::parse(&id)?);
            }
            ids
        };
        if ids.is_empty() {
            return Ok(0);
        }
        let affected = tx.execute(
            &format!("DELETE FROM records {where_clause}"),
            rusqlite::params_from_iter(params),
        )?;
        tx.commit()?;

        self.mark_gone(&ids);
        let note = SaveNotification {
            deleted: ids
                .into_iter()
                .map(|id| (record_type.to_string(), id))
                .collect(),
            ..SaveNotification::default()
        };
        self.push_notification(note);
        debug!(record_type, affected, "batch delete applied");
        Ok(affected)
    }
}

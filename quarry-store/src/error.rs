//! Error types for the store layer.

use quarry_types::RecordId;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error (file system).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored identifier failed to parse.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] uuid::Error),

    /// A save hit a concurrent modification under the fail-on-conflict
    /// merge policy. The whole save is rolled back.
    #[error("save conflict on {record_type} record {id}")]
    Conflict { record_type: String, id: RecordId },

    /// A background task failed outside its own save path.
    #[error("background task failed: {0}")]
    Background(String),

    /// An operation was handed arguments it cannot execute
    /// (e.g. `list_distinct` without a distinct projection).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

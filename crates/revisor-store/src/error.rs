// ABOUTME: Error type shared by the SQLite store modules.
// ABOUTME: Wraps driver, codec, configuration and snapshot failures and flags retryable version races.

use revisor_core::{CodecError, ConfigError, SnapshotError, Value};
use thiserror::Error;

/// Errors that can occur while reading or writing versioned tables.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("timestamp error: {0}")]
    Timestamp(#[from] chrono::ParseError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("version {version_id} of {model} {foreign_key:?} was already written by a concurrent save")]
    VersionConflict {
        model: String,
        foreign_key: Value,
        version_id: i64,
    },

    #[error("version store {store} has no column {column}")]
    UnknownVersionColumn { store: String, column: String },

    #[error("{table} has no record with key {key:?}")]
    RecordNotFound { table: String, key: Value },
}

impl StoreError {
    /// Whether retrying the whole save may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::VersionConflict { .. })
    }
}

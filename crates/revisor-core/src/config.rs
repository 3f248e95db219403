// ABOUTME: Behavior configuration for versioning an owning table.
// ABOUTME: Validated once against the table schema; invalid setups fail before any save or read.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::ColumnKind;

/// Setup-time configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("version table name must not be empty")]
    EmptyVersionTable,

    #[error("table {0} has no primary key")]
    MissingPrimaryKey(String),

    #[error("table {table} has a composite primary key ({columns}); composite keys are not supported")]
    CompositePrimaryKey { table: String, columns: String },

    #[error("tracked field {field} is not a column of {table}")]
    UnknownField { table: String, field: String },

    #[error("filter field {field} is not a column of {table}")]
    UnknownFilterField { table: String, field: String },

    #[error("version field {field} is not a column of {table}")]
    UnknownVersionField { table: String, field: String },

    #[error("{0} is a reserved version store column")]
    ReservedColumn(String),

    #[error("version store {store} does not match configured version table {configured}")]
    VersionTableMismatch { store: String, configured: String },

    #[error("version store {store} has no column {column}")]
    MissingVersionColumn { store: String, column: String },
}

/// Columns every version store has; extra columns may not reuse them.
pub const RESERVED_COLUMNS: &[&str] = &[
    "id",
    "version_id",
    "model",
    "foreign_key",
    "field",
    "content",
    "created",
];

/// How an owning table is versioned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionConfig {
    /// Name of the version store table.
    pub version_table: String,
    /// Optional owning column mirroring the current version number.
    pub version_field: Option<String>,
    /// Optional allow-list of tracked fields. `None` tracks every column.
    pub fields: Option<Vec<String>>,
    /// Discriminator columns copied into every snapshot and used to scope reads.
    pub filter_fields: Vec<String>,
    /// Extra version store columns, e.g. `user_id`. Filled from the entity
    /// when it holds a value of that name; interceptors may set or override
    /// them.
    pub additional_fields: Vec<(String, ColumnKind)>,
    /// Snapshot only fields changed since the record was loaded.
    pub only_dirty: bool,
}

impl Default for VersionConfig {
    fn default() -> Self {
        Self {
            version_table: "version".to_string(),
            version_field: None,
            fields: None,
            filter_fields: Vec::new(),
            additional_fields: Vec::new(),
            only_dirty: false,
        }
    }
}

impl VersionConfig {
    pub fn version_table(mut self, table: impl Into<String>) -> Self {
        self.version_table = table.into();
        self
    }

    pub fn version_field(mut self, field: impl Into<String>) -> Self {
        self.version_field = Some(field.into());
        self
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn filter_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn additional_field(mut self, column: impl Into<String>, kind: ColumnKind) -> Self {
        self.additional_fields.push((column.into(), kind));
        self
    }

    pub fn only_dirty(mut self, only_dirty: bool) -> Self {
        self.only_dirty = only_dirty;
        self
    }
}

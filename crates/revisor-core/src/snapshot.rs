// ABOUTME: Version snapshot rows: one field's value at one version point of one owning record.
// ABOUTME: VersionRow is a row waiting to be written; StoredSnapshot is a row read back from the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// A snapshot row built during a save and queued for insertion.
///
/// `extra` carries the values for the version store's additional columns:
/// filter fields copied from the owning record plus anything an interceptor
/// adds (e.g. `user_id`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionRow {
    pub version_id: i64,
    pub model: String,
    pub foreign_key: Value,
    pub field: String,
    pub content: Value,
    pub created: DateTime<Utc>,
    pub extra: Vec<(String, Value)>,
}

impl VersionRow {
    pub fn extra_value(&self, column: &str) -> Option<&Value> {
        self.extra.iter().find(|(k, _)| k == column).map(|(_, v)| v)
    }

    /// Set an extra column value, replacing any previous one.
    pub fn set_extra(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        match self.extra.iter_mut().find(|(k, _)| *k == column) {
            Some(slot) => slot.1 = value,
            None => self.extra.push((column, value)),
        }
    }
}

/// A snapshot row as persisted in the version store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSnapshot {
    pub id: i64,
    pub version_id: i64,
    pub model: String,
    pub foreign_key: Value,
    pub field: String,
    pub content: Value,
    pub created: DateTime<Utc>,
    pub extra: Vec<(String, Value)>,
}

impl StoredSnapshot {
    pub fn extra_value(&self, column: &str) -> Option<&Value> {
        self.extra.iter().find(|(k, _)| k == column).map(|(_, v)| v)
    }
}

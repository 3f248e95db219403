// ABOUTME: Connection setup and small SQL helpers shared by the store modules.
// ABOUTME: Converts between revisor values and SQLite values and quotes identifiers.

use std::path::Path;
use std::time::Duration;

use revisor_core::{ColumnKind, Value};
use rusqlite::Connection;
use rusqlite::types::{Value as SqlValue, ValueRef};

use crate::error::StoreError;

/// Open or create a database file with WAL journaling and foreign keys on.
/// Writers queue on the database lock for up to five seconds.
pub fn open_database(path: &Path) -> Result<Connection, StoreError> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

/// Open a private in-memory database.
pub fn open_in_memory() -> Result<Connection, StoreError> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

/// Quote an identifier for interpolation into SQL.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `?, ?, ?` with `count` placeholders.
pub(crate) fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

pub(crate) fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(i) => SqlValue::Integer(*i),
        Value::Real(f) => SqlValue::Real(*f),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Blob(bytes) => SqlValue::Blob(bytes.clone()),
    }
}

/// Read a stored value back. `kind` restores booleans, which SQLite keeps
/// as integers; `None` takes the stored type as is.
pub(crate) fn from_sql(value: ValueRef<'_>, kind: Option<ColumnKind>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) if kind == Some(ColumnKind::Bool) => Value::Bool(i != 0),
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Real(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    }
}

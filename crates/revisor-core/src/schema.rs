// ABOUTME: Describes the shape of an owning table: its name, typed columns, and primary key.
// ABOUTME: Consumed by the versioning setup to resolve tracked fields and by the store to build SQL.

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Storage class of a column. Drives SQL column types and how stored values
/// are read back into [`crate::Value`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Integer,
    Real,
    Text,
    Bool,
    Blob,
}

impl ColumnKind {
    /// SQL type name used when creating a column of this kind.
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnKind::Integer | ColumnKind::Bool => "INTEGER",
            ColumnKind::Real => "REAL",
            ColumnKind::Text => "TEXT",
            ColumnKind::Blob => "BLOB",
        }
    }

    /// Convert `value` the way SQLite's affinity for this kind would store
    /// it. Values the affinity would keep as they are pass through.
    pub fn coerce(&self, value: Value) -> Value {
        match (self, value) {
            (ColumnKind::Integer, Value::Text(s)) => match s.trim().parse::<i64>() {
                Ok(i) => Value::Integer(i),
                Err(_) => Value::Text(s),
            },
            (ColumnKind::Integer, Value::Real(f))
                if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 =>
            {
                Value::Integer(f as i64)
            }
            (ColumnKind::Real, Value::Integer(i)) => Value::Real(i as f64),
            (ColumnKind::Text, Value::Integer(i)) => Value::Text(i.to_string()),
            (_, value) => value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

/// Schema of an owning table. Built with the chained helpers:
///
/// ```
/// use revisor_core::{ColumnKind, TableSchema};
///
/// let schema = TableSchema::new("articles")
///     .column("id", ColumnKind::Integer)
///     .column("title", ColumnKind::Text)
///     .primary_key(["id"]);
/// assert_eq!(schema.column_names(), vec!["id", "title"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    name: String,
    columns: Vec<Column>,
    primary_key: Vec<String>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
        }
    }

    /// Append a column. Re-declaring an existing name replaces its kind.
    pub fn column(mut self, name: impl Into<String>, kind: ColumnKind) -> Self {
        let name = name.into();
        match self.columns.iter_mut().find(|c| c.name == name) {
            Some(existing) => existing.kind = kind,
            None => self.columns.push(Column { name, kind }),
        }
        self
    }

    pub fn primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Column names in declaration order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column_kind(&self, name: &str) -> Option<ColumnKind> {
        self.columns.iter().find(|c| c.name == name).map(|c| c.kind)
    }

    pub fn primary_key_columns(&self) -> &[String] {
        &self.primary_key
    }
}

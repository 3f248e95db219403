// ABOUTME: The append-only version store table: one row per field per version per owning record.
// ABOUTME: Owns the schema (with extra filter columns), inserts, scoped lookups and cascade deletes.

use chrono::{DateTime, Utc};
use revisor_core::{Column, ColumnKind, StoredSnapshot, Value, VersionRow, Versioning};
use rusqlite::{Connection, ErrorCode, params, params_from_iter};

use crate::db::{from_sql, placeholders, quote_ident, to_sql};
use crate::error::StoreError;

/// Handle on a version store table. Several owning tables may share one
/// store; rows are told apart by `model`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionStore {
    table: String,
    columns: Vec<Column>,
}

/// Which snapshot rows to read. Empty lists mean "no restriction".
#[derive(Debug, Clone, Default)]
pub struct SnapshotFilter {
    pub model: String,
    pub fields: Vec<String>,
    pub foreign_keys: Vec<Value>,
    pub version_ids: Vec<i64>,
    /// Extra-column conditions, compared with IS so NULL matches NULL.
    pub scope: Vec<(String, Value)>,
}

impl VersionStore {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
        }
    }

    /// Declare an extra column, e.g. a filter field or `user_id`.
    pub fn with_column(mut self, name: impl Into<String>, kind: ColumnKind) -> Self {
        let name = name.into();
        if !self.has_column(&name) {
            self.columns.push(Column { name, kind });
        }
        self
    }

    /// Store handle shaped for a versioning setup: its configured table, its
    /// filter fields typed after the owning schema, and its additional fields.
    pub fn for_versioning(versioning: &Versioning) -> Self {
        let schema = versioning.schema();
        let config = versioning.config();
        let mut store = Self::new(config.version_table.clone());
        for field in &config.filter_fields {
            let kind = schema.column_kind(field).unwrap_or(ColumnKind::Text);
            store = store.with_column(field.clone(), kind);
        }
        for (name, kind) in &config.additional_fields {
            store = store.with_column(name.clone(), *kind);
        }
        store
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    fn check_column(&self, name: &str) -> Result<(), StoreError> {
        if self.has_column(name) {
            Ok(())
        } else {
            Err(StoreError::UnknownVersionColumn {
                store: self.table.clone(),
                column: name.to_string(),
            })
        }
    }

    /// Create the table and its lookup index if missing, and add any extra
    /// column an existing table lacks.
    pub fn install(&self, conn: &Connection) -> Result<(), StoreError> {
        let table = quote_ident(&self.table);
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                version_id INTEGER NOT NULL,
                model TEXT NOT NULL,
                foreign_key NOT NULL,
                field TEXT NOT NULL,
                content TEXT NOT NULL,
                created TEXT NOT NULL,
                UNIQUE (model, foreign_key, field, version_id)
            );

            CREATE INDEX IF NOT EXISTS {index} ON {table} (model, foreign_key, version_id);",
            index = quote_ident(&format!("{}_lookup", self.table)),
        ))?;

        let existing = self.existing_columns(conn)?;
        for column in &self.columns {
            if existing.iter().any(|c| *c == column.name) {
                continue;
            }
            conn.execute_batch(&format!(
                "ALTER TABLE {table} ADD COLUMN {} {}",
                quote_ident(&column.name),
                column.kind.sql_type()
            ))?;
            tracing::info!("added column {} to version store {}", column.name, self.table);
        }

        tracing::info!("version store {} ready", self.table);
        Ok(())
    }

    fn existing_columns(&self, conn: &Connection) -> Result<Vec<String>, StoreError> {
        let mut stmt = conn.prepare(&format!(
            "PRAGMA table_info({})",
            quote_ident(&self.table)
        ))?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;

        let mut columns = Vec::new();
        for row in rows {
            columns.push(row?);
        }
        Ok(columns)
    }

    /// Append one snapshot row. A duplicate (model, foreign_key, field,
    /// version_id) means another save claimed the same version first.
    pub fn insert(&self, conn: &Connection, row: &VersionRow) -> Result<i64, StoreError> {
        let mut columns = vec![
            "version_id".to_string(),
            "model".to_string(),
            "foreign_key".to_string(),
            "field".to_string(),
            "content".to_string(),
            "created".to_string(),
        ];
        let mut values = vec![
            to_sql(&Value::Integer(row.version_id)),
            to_sql(&Value::Text(row.model.clone())),
            to_sql(&row.foreign_key),
            to_sql(&Value::Text(row.field.clone())),
            to_sql(&Value::Text(row.content.encode()?)),
            to_sql(&Value::Text(row.created.to_rfc3339())),
        ];
        for (column, value) in &row.extra {
            self.check_column(column)?;
            columns.push(column.clone());
            values.push(to_sql(value));
        }

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(&self.table),
            columns
                .iter()
                .map(|c| quote_ident(c))
                .collect::<Vec<_>>()
                .join(", "),
            placeholders(values.len()),
        );

        match conn.execute(&sql, params_from_iter(values.iter())) {
            Ok(_) => Ok(conn.last_insert_rowid()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation
                    && err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                tracing::warn!(
                    "version {} of {} {:?} already exists",
                    row.version_id,
                    row.model,
                    row.foreign_key
                );
                Err(StoreError::VersionConflict {
                    model: row.model.clone(),
                    foreign_key: row.foreign_key.clone(),
                    version_id: row.version_id,
                })
            }
            Err(e) => Err(StoreError::Sqlite(e)),
        }
    }

    /// Highest version_id recorded for a record, or None if it has no history.
    pub fn latest_version_id(
        &self,
        conn: &Connection,
        model: &str,
        foreign_key: &Value,
    ) -> Result<Option<i64>, StoreError> {
        let sql = format!(
            "SELECT version_id FROM {} WHERE model = ?1 AND foreign_key = ?2
             ORDER BY version_id DESC LIMIT 1",
            quote_ident(&self.table)
        );
        let result = conn.query_row(&sql, params![model, to_sql(foreign_key)], |row| row.get(0));

        match result {
            Ok(version_id) => Ok(Some(version_id)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Sqlite(e)),
        }
    }

    /// Newest captured content of one field of one record.
    pub fn latest_value(
        &self,
        conn: &Connection,
        model: &str,
        foreign_key: &Value,
        field: &str,
    ) -> Result<Option<Value>, StoreError> {
        let sql = format!(
            "SELECT content FROM {} WHERE model = ?1 AND foreign_key = ?2 AND field = ?3
             ORDER BY version_id DESC LIMIT 1",
            quote_ident(&self.table)
        );
        let result = conn.query_row(
            &sql,
            params![model, to_sql(foreign_key), field],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(raw) => Ok(Some(Value::decode(&raw)?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Sqlite(e)),
        }
    }

    /// Read the snapshot rows matching `filter`, in insertion order.
    pub fn find(
        &self,
        conn: &Connection,
        filter: &SnapshotFilter,
    ) -> Result<Vec<StoredSnapshot>, StoreError> {
        let mut conditions = vec!["model = ?".to_string()];
        let mut values = vec![to_sql(&Value::Text(filter.model.clone()))];

        if !filter.fields.is_empty() {
            conditions.push(format!("field IN ({})", placeholders(filter.fields.len())));
            values.extend(filter.fields.iter().map(|f| to_sql(&Value::Text(f.clone()))));
        }
        if !filter.foreign_keys.is_empty() {
            conditions.push(format!(
                "foreign_key IN ({})",
                placeholders(filter.foreign_keys.len())
            ));
            values.extend(filter.foreign_keys.iter().map(to_sql));
        }
        if !filter.version_ids.is_empty() {
            conditions.push(format!(
                "version_id IN ({})",
                placeholders(filter.version_ids.len())
            ));
            values.extend(filter.version_ids.iter().map(|v| to_sql(&Value::Integer(*v))));
        }
        for (column, value) in &filter.scope {
            self.check_column(column)?;
            conditions.push(format!("{} IS ?", quote_ident(column)));
            values.push(to_sql(value));
        }

        let extra_select: String = self
            .columns
            .iter()
            .map(|c| format!(", {}", quote_ident(&c.name)))
            .collect();
        let sql = format!(
            "SELECT id, version_id, model, foreign_key, field, content, created{extra_select}
             FROM {} WHERE {} ORDER BY id",
            quote_ident(&self.table),
            conditions.join(" AND "),
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
            let mut extra = Vec::with_capacity(self.columns.len());
            for (offset, column) in self.columns.iter().enumerate() {
                let value = from_sql(row.get_ref(7 + offset)?, Some(column.kind));
                extra.push((column.name.clone(), value));
            }
            Ok(RawSnapshot {
                id: row.get(0)?,
                version_id: row.get(1)?,
                model: row.get(2)?,
                foreign_key: from_sql(row.get_ref(3)?, None),
                field: row.get(4)?,
                content: row.get(5)?,
                created: row.get(6)?,
                extra,
            })
        })?;

        let mut snapshots = Vec::new();
        for row in rows {
            snapshots.push(row?.decode()?);
        }
        Ok(snapshots)
    }

    /// Remove every snapshot of a record. Returns the number of rows deleted.
    pub fn delete_for(
        &self,
        conn: &Connection,
        model: &str,
        foreign_key: &Value,
    ) -> Result<usize, StoreError> {
        let sql = format!(
            "DELETE FROM {} WHERE model = ?1 AND foreign_key = ?2",
            quote_ident(&self.table)
        );
        Ok(conn.execute(&sql, params![model, to_sql(foreign_key)])?)
    }

    /// Number of snapshot rows held for a record.
    pub fn count_for(
        &self,
        conn: &Connection,
        model: &str,
        foreign_key: &Value,
    ) -> Result<i64, StoreError> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE model = ?1 AND foreign_key = ?2",
            quote_ident(&self.table)
        );
        Ok(conn.query_row(&sql, params![model, to_sql(foreign_key)], |row| row.get(0))?)
    }
}

/// A row as read from SQLite, before content and timestamp decoding.
struct RawSnapshot {
    id: i64,
    version_id: i64,
    model: String,
    foreign_key: Value,
    field: String,
    content: String,
    created: String,
    extra: Vec<(String, Value)>,
}

impl RawSnapshot {
    fn decode(self) -> Result<StoredSnapshot, StoreError> {
        Ok(StoredSnapshot {
            id: self.id,
            version_id: self.version_id,
            model: self.model,
            foreign_key: self.foreign_key,
            field: self.field,
            content: Value::decode(&self.content)?,
            created: DateTime::parse_from_rfc3339(&self.created)?.with_timezone(&Utc),
            extra: self.extra,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use chrono::Utc;

    fn make_row(version_id: i64, foreign_key: i64, field: &str, content: Value) -> VersionRow {
        VersionRow {
            version_id,
            model: "articles".to_string(),
            foreign_key: Value::Integer(foreign_key),
            field: field.to_string(),
            content,
            created: Utc::now(),
            extra: Vec::new(),
        }
    }

    fn filter_for(foreign_key: i64) -> SnapshotFilter {
        SnapshotFilter {
            model: "articles".to_string(),
            foreign_keys: vec![Value::Integer(foreign_key)],
            ..SnapshotFilter::default()
        }
    }

    #[test]
    fn install_is_idempotent() {
        let conn = open_in_memory().unwrap();
        let store = VersionStore::new("version");

        store.install(&conn).unwrap();
        store.install(&conn).unwrap();

        assert_eq!(
            store
                .count_for(&conn, "articles", &Value::Integer(1))
                .unwrap(),
            0
        );
    }

    #[test]
    fn install_adds_missing_extra_columns() {
        let conn = open_in_memory().unwrap();
        VersionStore::new("version").install(&conn).unwrap();

        let store = VersionStore::new("version").with_column("locale", ColumnKind::Text);
        store.install(&conn).unwrap();

        let mut row = make_row(1, 1, "title", Value::from("A"));
        row.set_extra("locale", "fr");
        store.insert(&conn, &row).unwrap();

        let found = store.find(&conn, &filter_for(1)).unwrap();
        assert_eq!(found[0].extra_value("locale"), Some(&Value::from("fr")));
    }

    #[test]
    fn insert_and_find_round_trip_typed_content() {
        let conn = open_in_memory().unwrap();
        let store = VersionStore::new("version");
        store.install(&conn).unwrap();

        store
            .insert(&conn, &make_row(1, 1, "views", Value::Integer(10)))
            .unwrap();
        store
            .insert(&conn, &make_row(1, 1, "code", Value::from("10")))
            .unwrap();
        store
            .insert(&conn, &make_row(1, 2, "views", Value::Integer(99)))
            .unwrap();

        let found = store.find(&conn, &filter_for(1)).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].content, Value::Integer(10));
        assert_eq!(found[1].content, Value::from("10"));
        assert_eq!(found[0].foreign_key, Value::Integer(1));
        assert!(found[0].id < found[1].id);
    }

    #[test]
    fn duplicate_version_is_a_conflict() {
        let conn = open_in_memory().unwrap();
        let store = VersionStore::new("version");
        store.install(&conn).unwrap();

        store
            .insert(&conn, &make_row(1, 1, "title", Value::from("A")))
            .unwrap();
        let err = store
            .insert(&conn, &make_row(1, 1, "title", Value::from("B")))
            .unwrap_err();

        assert!(err.is_retryable());
        assert!(matches!(
            err,
            StoreError::VersionConflict { version_id: 1, .. }
        ));
    }

    #[test]
    fn insert_rejects_undeclared_extra_column() {
        let conn = open_in_memory().unwrap();
        let store = VersionStore::new("version");
        store.install(&conn).unwrap();

        let mut row = make_row(1, 1, "title", Value::from("A"));
        row.set_extra("user_id", 3_i64);

        let err = store.insert(&conn, &row).unwrap_err();
        assert!(matches!(err, StoreError::UnknownVersionColumn { .. }));
    }

    #[test]
    fn latest_version_id_and_value() {
        let conn = open_in_memory().unwrap();
        let store = VersionStore::new("version");
        store.install(&conn).unwrap();
        let key = Value::Integer(1);

        assert_eq!(store.latest_version_id(&conn, "articles", &key).unwrap(), None);
        assert_eq!(
            store.latest_value(&conn, "articles", &key, "title").unwrap(),
            None
        );

        store
            .insert(&conn, &make_row(1, 1, "title", Value::from("A")))
            .unwrap();
        store
            .insert(&conn, &make_row(2, 1, "title", Value::from("B")))
            .unwrap();
        store
            .insert(&conn, &make_row(3, 1, "body", Value::from("x")))
            .unwrap();

        assert_eq!(
            store.latest_version_id(&conn, "articles", &key).unwrap(),
            Some(3)
        );
        assert_eq!(
            store.latest_value(&conn, "articles", &key, "title").unwrap(),
            Some(Value::from("B"))
        );
    }

    #[test]
    fn find_narrows_by_field_version_and_scope() {
        let conn = open_in_memory().unwrap();
        let store = VersionStore::new("version").with_column("locale", ColumnKind::Text);
        store.install(&conn).unwrap();

        let mut untranslated = make_row(1, 1, "title", Value::from("A"));
        untranslated.set_extra("locale", Value::Null);
        store.insert(&conn, &untranslated).unwrap();

        let mut french = make_row(2, 1, "title", Value::from("Le A"));
        french.set_extra("locale", "fr");
        store.insert(&conn, &french).unwrap();

        store
            .insert(&conn, &make_row(2, 1, "body", Value::from("x")))
            .unwrap();

        let mut filter = filter_for(1);
        filter.scope = vec![("locale".to_string(), Value::Null)];
        let found = store.find(&conn, &filter).unwrap();
        // IS NULL matches the untranslated row and the body row without a locale.
        assert_eq!(found.len(), 2);

        let mut filter = filter_for(1);
        filter.fields = vec!["title".to_string()];
        filter.version_ids = vec![2];
        let found = store.find(&conn, &filter).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].content, Value::from("Le A"));
    }

    #[test]
    fn find_rejects_scope_on_unknown_column() {
        let conn = open_in_memory().unwrap();
        let store = VersionStore::new("version");
        store.install(&conn).unwrap();

        let mut filter = filter_for(1);
        filter.scope = vec![("tenant".to_string(), Value::Integer(1))];

        assert!(matches!(
            store.find(&conn, &filter),
            Err(StoreError::UnknownVersionColumn { .. })
        ));
    }

    #[test]
    fn delete_for_only_touches_one_record() {
        let conn = open_in_memory().unwrap();
        let store = VersionStore::new("version");
        store.install(&conn).unwrap();

        store
            .insert(&conn, &make_row(1, 1, "title", Value::from("A")))
            .unwrap();
        store
            .insert(&conn, &make_row(1, 2, "title", Value::from("B")))
            .unwrap();

        let removed = store
            .delete_for(&conn, "articles", &Value::Integer(1))
            .unwrap();

        assert_eq!(removed, 1);
        assert_eq!(
            store.count_for(&conn, "articles", &Value::Integer(2)).unwrap(),
            1
        );
    }

    #[test]
    fn text_and_integer_keys_do_not_collide() {
        let conn = open_in_memory().unwrap();
        let store = VersionStore::new("version");
        store.install(&conn).unwrap();

        let mut row = make_row(1, 0, "title", Value::from("A"));
        row.foreign_key = Value::from("1");
        store.insert(&conn, &row).unwrap();

        assert_eq!(
            store
                .latest_version_id(&conn, "articles", &Value::Integer(1))
                .unwrap(),
            None
        );
        assert_eq!(
            store
                .latest_version_id(&conn, "articles", &Value::from("1"))
                .unwrap(),
            Some(1)
        );
    }
}

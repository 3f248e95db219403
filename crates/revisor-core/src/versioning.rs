// ABOUTME: The versioning behavior attached to one owning table: validated config plus interceptors.
// ABOUTME: Builds the snapshot rows for a save and stamps the version field on the owning record.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::config::{ConfigError, RESERVED_COLUMNS, VersionConfig};
use crate::entity::Entity;
use crate::interceptor::InterceptorChain;
use crate::schema::TableSchema;
use crate::snapshot::VersionRow;
use crate::value::Value;

/// Errors raised while building the snapshot rows of a save.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("record of {table} has no value for primary key {column}")]
    MissingPrimaryKey { table: String, column: String },

    #[error("snapshot of {table}.{field} was rejected by an interceptor")]
    Rejected { table: String, field: String },
}

/// Versioning behavior for one owning table.
#[derive(Debug)]
pub struct Versioning {
    schema: TableSchema,
    config: VersionConfig,
    primary_key: String,
    tracked: Vec<String>,
    interceptors: InterceptorChain,
}

impl Versioning {
    /// Validate `config` against `schema` and resolve the tracked fields.
    ///
    /// Tracked fields are the schema's columns, in schema order, narrowed to
    /// the allow-list when one is configured.
    pub fn new(schema: TableSchema, config: VersionConfig) -> Result<Self, ConfigError> {
        if config.version_table.trim().is_empty() {
            return Err(ConfigError::EmptyVersionTable);
        }

        let primary_key = match schema.primary_key_columns() {
            [] => return Err(ConfigError::MissingPrimaryKey(schema.name().to_string())),
            [single] => single.clone(),
            many => {
                return Err(ConfigError::CompositePrimaryKey {
                    table: schema.name().to_string(),
                    columns: many.join(", "),
                });
            }
        };

        if let Some(allowed) = &config.fields
            && let Some(unknown) = allowed.iter().find(|f| !schema.has_column(f))
        {
            return Err(ConfigError::UnknownField {
                table: schema.name().to_string(),
                field: unknown.clone(),
            });
        }

        if let Some(unknown) = config.filter_fields.iter().find(|f| !schema.has_column(f)) {
            return Err(ConfigError::UnknownFilterField {
                table: schema.name().to_string(),
                field: unknown.clone(),
            });
        }

        if let Some(field) = &config.version_field
            && !schema.has_column(field)
        {
            return Err(ConfigError::UnknownVersionField {
                table: schema.name().to_string(),
                field: field.clone(),
            });
        }

        let extra_names = config
            .filter_fields
            .iter()
            .chain(config.additional_fields.iter().map(|(name, _)| name));
        for name in extra_names {
            if RESERVED_COLUMNS.contains(&name.as_str()) {
                return Err(ConfigError::ReservedColumn(name.clone()));
            }
        }

        let tracked = schema
            .column_names()
            .into_iter()
            .filter(|c| match &config.fields {
                Some(allowed) => allowed.iter().any(|a| a == c),
                None => true,
            })
            .map(str::to_string)
            .collect();

        Ok(Self {
            schema,
            config,
            primary_key,
            tracked,
            interceptors: InterceptorChain::new(),
        })
    }

    /// Register a pre-write interceptor.
    pub fn intercept<F>(mut self, interceptor: F) -> Self
    where
        F: Fn(&Entity, VersionRow) -> Option<VersionRow> + Send + Sync + 'static,
    {
        self.interceptors.push(interceptor);
        self
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn config(&self) -> &VersionConfig {
        &self.config
    }

    /// Name recorded in the `model` column of every snapshot.
    pub fn model(&self) -> &str {
        self.schema.name()
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn tracked_fields(&self) -> &[String] {
        &self.tracked
    }

    pub fn filter_fields(&self) -> &[String] {
        &self.config.filter_fields
    }

    /// Tracked fields that produce snapshot rows: everything but the primary
    /// key and the version field.
    pub fn snapshot_fields(&self) -> Vec<&str> {
        self.tracked
            .iter()
            .map(String::as_str)
            .filter(|f| *f != self.primary_key && Some(*f) != self.config.version_field.as_deref())
            .collect()
    }

    /// The entity's primary key value, if it has a non-null one, normalized
    /// with [`Versioning::normalize_key`].
    pub fn key_of(&self, entity: &Entity) -> Option<Value> {
        entity
            .get(&self.primary_key)
            .filter(|v| !v.is_null())
            .map(|v| self.normalize_key(v))
    }

    /// Convert a key to the form the owning table stores it in, so `"1"` and
    /// `1` name the same record of an integer-keyed table and its snapshots.
    pub fn normalize_key(&self, key: &Value) -> Value {
        match self.schema.column_kind(&self.primary_key) {
            Some(kind) => kind.coerce(key.clone()),
            None => key.clone(),
        }
    }

    /// Build one snapshot row per snapshot field, all carrying `version_id`,
    /// the entity's filter field values and whichever additional fields the
    /// entity holds, each passed through the interceptors.
    ///
    /// Interceptors may change content and extra columns. The row's identity
    /// (`version_id`, `model`, `foreign_key`, `field`) is restored after they
    /// run.
    pub fn build_snapshots(
        &self,
        entity: &Entity,
        version_id: i64,
        created: DateTime<Utc>,
    ) -> Result<Vec<VersionRow>, SnapshotError> {
        let foreign_key = self
            .key_of(entity)
            .ok_or_else(|| SnapshotError::MissingPrimaryKey {
                table: self.model().to_string(),
                column: self.primary_key.clone(),
            })?;

        let fields = self.snapshot_fields();
        let values = if self.config.only_dirty && !entity.is_new() {
            entity.extract_dirty(&fields)
        } else {
            entity.extract(&fields)
        };
        let mut extra = entity.extract(&self.config.filter_fields);
        for (name, _) in &self.config.additional_fields {
            if let Some(value) = entity.get(name)
                && !extra.iter().any(|(k, _)| k == name)
            {
                extra.push((name.clone(), value.clone()));
            }
        }

        let mut rows = Vec::with_capacity(values.len());
        for (field, content) in values {
            let row = VersionRow {
                version_id,
                model: self.model().to_string(),
                foreign_key: foreign_key.clone(),
                field: field.clone(),
                content,
                created,
                extra: extra.clone(),
            };
            match self.interceptors.apply(entity, row) {
                Some(mut row) => {
                    row.version_id = version_id;
                    row.model = self.model().to_string();
                    row.foreign_key = foreign_key.clone();
                    row.field = field;
                    rows.push(row);
                }
                None => {
                    return Err(SnapshotError::Rejected {
                        table: self.model().to_string(),
                        field,
                    });
                }
            }
        }

        Ok(rows)
    }

    /// Build the snapshots for a save, queue them on the entity as pending
    /// snapshots, and mirror `version_id` into the version field when it is
    /// tracked. Returns the number of rows queued.
    ///
    /// A save that captures no rows does not use `version_id`, so the version
    /// field is left alone.
    pub fn prepare_save(
        &self,
        entity: &mut Entity,
        version_id: i64,
        created: DateTime<Utc>,
    ) -> Result<usize, SnapshotError> {
        let rows = self.build_snapshots(entity, version_id, created)?;
        let count = rows.len();
        entity.set_pending_snapshots(rows);

        if count > 0
            && let Some(field) = &self.config.version_field
            && self.tracked.contains(field)
        {
            entity.set(field.clone(), version_id);
        }

        tracing::debug!(
            "queued {} snapshots for {} at version {}",
            count,
            self.model(),
            version_id
        );
        Ok(count)
    }
}

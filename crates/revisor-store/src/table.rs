// ABOUTME: A versioned owning table: saves capture snapshots atomically with the owning row.
// ABOUTME: Deletes cascade to the record's snapshots; lookups expose per-field latest values.

use chrono::Utc;
use revisor_core::{ConfigError, Entity, SnapshotError, Value, Versioning};
use rusqlite::{Connection, TransactionBehavior};

use crate::assigner::next_version_id;
use crate::error::StoreError;
use crate::owning;
use crate::version_store::VersionStore;

/// An owning table with versioning attached. The version store handle is
/// injected; several tables may share one.
#[derive(Debug)]
pub struct VersionedTable {
    pub(crate) versioning: Versioning,
    pub(crate) store: VersionStore,
}

impl VersionedTable {
    /// Attach `versioning` to `store`. Fails if the store is not the
    /// configured version table or lacks a column for a filter or additional
    /// field.
    pub fn new(versioning: Versioning, store: VersionStore) -> Result<Self, ConfigError> {
        let configured = &versioning.config().version_table;
        if store.table() != configured {
            return Err(ConfigError::VersionTableMismatch {
                store: store.table().to_string(),
                configured: configured.clone(),
            });
        }

        let config = versioning.config();
        let required = config
            .filter_fields
            .iter()
            .chain(config.additional_fields.iter().map(|(name, _)| name));
        for column in required {
            if !store.has_column(column) {
                return Err(ConfigError::MissingVersionColumn {
                    store: store.table().to_string(),
                    column: column.clone(),
                });
            }
        }

        Ok(Self { versioning, store })
    }

    pub fn versioning(&self) -> &Versioning {
        &self.versioning
    }

    pub fn store(&self) -> &VersionStore {
        &self.store
    }

    fn model(&self) -> &str {
        self.versioning.model()
    }

    /// Create the owning table and the version store if they are missing.
    pub fn install(&self, conn: &Connection) -> Result<(), StoreError> {
        owning::create_table(
            conn,
            self.versioning.schema(),
            self.versioning.primary_key(),
        )?;
        self.store.install(conn)
    }

    /// Save the entity and snapshot its tracked fields under a new version.
    ///
    /// The owning row and every snapshot row commit in one IMMEDIATE
    /// transaction. On failure nothing is written and the entity is restored
    /// to its state before the call. On success the pending snapshots are
    /// cleared and the entity is marked persisted and clean.
    ///
    /// Returns the record's version id after the save. A save that captures
    /// nothing (an unchanged record with `only_dirty`) assigns no version and
    /// returns the current one, 0 for a record without history.
    pub fn save(&self, conn: &mut Connection, entity: &mut Entity) -> Result<i64, StoreError> {
        let original = entity.clone();
        match self.save_in_transaction(conn, entity) {
            Ok(version_id) => {
                entity.take_pending_snapshots();
                entity.set_new(false);
                entity.clean();
                Ok(version_id)
            }
            Err(e) => {
                *entity = original;
                Err(e)
            }
        }
    }

    fn save_in_transaction(
        &self,
        conn: &mut Connection,
        entity: &mut Entity,
    ) -> Result<i64, StoreError> {
        let schema = self.versioning.schema();
        let pk = self.versioning.primary_key();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        // Keys generated by the database are only known after the insert.
        let mut inserted = false;
        if entity.is_new() && self.versioning.key_of(entity).is_none() {
            let key = owning::insert(&tx, schema, pk, entity)?;
            entity.set(pk, key);
            inserted = true;
        }

        let key = self
            .versioning
            .key_of(entity)
            .ok_or_else(|| SnapshotError::MissingPrimaryKey {
                table: self.model().to_string(),
                column: pk.to_string(),
            })?;

        let version_id = next_version_id(&self.store, &tx, self.model(), &key)?;
        let captured = self.versioning.prepare_save(entity, version_id, Utc::now())?;

        if entity.is_new() && !inserted {
            owning::insert(&tx, schema, pk, entity)?;
        } else {
            owning::update(&tx, schema, pk, &key, entity)?;
        }

        for row in entity.pending_snapshots() {
            self.store.insert(&tx, row)?;
        }

        tx.commit()?;
        tracing::debug!(
            "saved {} {:?} at version {} with {} snapshots",
            self.model(),
            key,
            version_id,
            captured
        );
        Ok(if captured == 0 { version_id - 1 } else { version_id })
    }

    /// Delete the owning row and all of its snapshots. Returns false when no
    /// row had the key.
    pub fn delete(&self, conn: &mut Connection, key: &Value) -> Result<bool, StoreError> {
        let key = &self.versioning.normalize_key(key);
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let removed = owning::delete(
            &tx,
            self.versioning.schema(),
            self.versioning.primary_key(),
            key,
        )?;
        if removed > 0 {
            let snapshots = self.store.delete_for(&tx, self.model(), key)?;
            tracing::debug!(
                "deleted {} {:?} and {} snapshots",
                self.model(),
                key,
                snapshots
            );
        }
        tx.commit()?;
        Ok(removed > 0)
    }

    pub fn get(&self, conn: &Connection, key: &Value) -> Result<Option<Entity>, StoreError> {
        Ok(self.find(conn, std::slice::from_ref(key))?.pop())
    }

    /// Load the records with the given keys, in key order.
    pub fn find(&self, conn: &Connection, keys: &[Value]) -> Result<Vec<Entity>, StoreError> {
        let keys: Vec<Value> = keys
            .iter()
            .map(|k| self.versioning.normalize_key(k))
            .collect();
        owning::select(
            conn,
            self.versioning.schema(),
            self.versioning.primary_key(),
            Some(keys.as_slice()),
        )
    }

    pub fn all(&self, conn: &Connection) -> Result<Vec<Entity>, StoreError> {
        owning::select(
            conn,
            self.versioning.schema(),
            self.versioning.primary_key(),
            None,
        )
    }

    /// Newest snapshotted value of one field of a record, or None when the
    /// field was never captured.
    pub fn latest_value(
        &self,
        conn: &Connection,
        key: &Value,
        field: &str,
    ) -> Result<Option<Value>, StoreError> {
        let key = self.versioning.normalize_key(key);
        self.store.latest_value(conn, self.model(), &key, field)
    }

    /// Highest version id recorded for a record.
    pub fn current_version(&self, conn: &Connection, key: &Value) -> Result<Option<i64>, StoreError> {
        let key = self.versioning.normalize_key(key);
        self.store.latest_version_id(conn, self.model(), &key)
    }
}

// ABOUTME: Version history reads: attach reconstructed versions to already-fetched owning records.
// ABOUTME: Builds one scoped snapshot query for all targets, then groups rows per record and version.

use revisor_core::history::belongs_to;
use revisor_core::{Entity, Value, VersionHistory, group_snapshots};
use rusqlite::Connection;

use crate::error::StoreError;
use crate::table::VersionedTable;
use crate::version_store::SnapshotFilter;

/// Options for a versions fetch.
///
/// Target keys come from the explicit entity if one is given, else from the
/// explicit key list, else from the records being decorated. Version ids and
/// conditions narrow the result further.
#[derive(Debug, Clone, Default)]
pub struct VersionQuery {
    entity: Option<Entity>,
    foreign_keys: Vec<Value>,
    version_ids: Vec<i64>,
    conditions: Vec<(String, Value)>,
}

impl VersionQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Target one record. Its filter field values become implicit conditions.
    pub fn for_entity(mut self, entity: &Entity) -> Self {
        self.entity = Some(entity.clone());
        self
    }

    pub fn foreign_keys<I, V>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.foreign_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn version_ids<I>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = i64>,
    {
        self.version_ids = ids.into_iter().collect();
        self
    }

    /// Restrict to snapshots whose extra column IS `value`.
    pub fn condition(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((column.into(), value.into()));
        self
    }
}

impl VersionedTable {
    /// Decorate `records` with their version histories.
    ///
    /// Every record gets a history, empty when nothing matched, and is left
    /// clean: it was decorated, not modified.
    pub fn find_versions(
        &self,
        conn: &Connection,
        mut records: Vec<Entity>,
        query: &VersionQuery,
    ) -> Result<Vec<Entity>, StoreError> {
        let versioning = &self.versioning;

        let keys: Vec<Value> = match &query.entity {
            Some(entity) => versioning.key_of(entity).into_iter().collect(),
            None if !query.foreign_keys.is_empty() => query
                .foreign_keys
                .iter()
                .map(|k| versioning.normalize_key(k))
                .collect(),
            None => records.iter().filter_map(|r| versioning.key_of(r)).collect(),
        };

        let mut scope = query.conditions.clone();
        if let Some(entity) = &query.entity {
            for field in versioning.filter_fields() {
                if scope.iter().any(|(c, _)| c == field) {
                    continue;
                }
                if let Some(value) = entity.get(field) {
                    scope.push((field.clone(), value.clone()));
                }
            }
        }

        let snapshots = if keys.is_empty() {
            Vec::new()
        } else {
            let filter = SnapshotFilter {
                model: versioning.model().to_string(),
                fields: versioning.tracked_fields().to_vec(),
                foreign_keys: keys,
                version_ids: query.version_ids.clone(),
                scope,
            };
            self.store.find(conn, &filter)?
        };

        // Filter fields not pinned by an explicit condition must match each
        // record's own values.
        let implicit: Vec<&str> = versioning
            .filter_fields()
            .iter()
            .map(String::as_str)
            .filter(|f| !query.conditions.iter().any(|(c, _)| c == f))
            .collect();

        for record in &mut records {
            let history = match versioning.key_of(record) {
                Some(key) => group_snapshots(
                    snapshots
                        .iter()
                        .filter(|s| belongs_to(s, &key, record, &implicit)),
                ),
                None => VersionHistory::new(),
            };
            tracing::debug!(
                "attached {} versions to {} {:?}",
                history.len(),
                versioning.model(),
                versioning.key_of(record)
            );
            record.set_versions(history);
            record.clean();
        }

        Ok(records)
    }

    /// Load one record with its full history attached.
    pub fn get_with_versions(
        &self,
        conn: &Connection,
        key: &Value,
    ) -> Result<Option<Entity>, StoreError> {
        let Some(record) = self.get(conn, key)? else {
            return Ok(None);
        };
        let query = VersionQuery::new().for_entity(&record);
        Ok(self.find_versions(conn, vec![record], &query)?.pop())
    }

    /// Reconstruct a single version of a record.
    pub fn version(
        &self,
        conn: &Connection,
        key: &Value,
        version_id: i64,
    ) -> Result<Option<Entity>, StoreError> {
        let Some(record) = self.get(conn, key)? else {
            return Ok(None);
        };
        let query = VersionQuery::new()
            .for_entity(&record)
            .version_ids([version_id]);
        let mut decorated = self.find_versions(conn, vec![record], &query)?;

        Ok(decorated
            .pop()
            .and_then(|r| r.versions().and_then(|h| h.get(&version_id).cloned())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::version_store::VersionStore;
    use revisor_core::{ColumnKind, TableSchema, VersionConfig, Versioning};

    fn articles() -> TableSchema {
        TableSchema::new("articles")
            .column("id", ColumnKind::Integer)
            .column("title", ColumnKind::Text)
            .column("body", ColumnKind::Text)
            .column("locale", ColumnKind::Text)
            .primary_key(["id"])
    }

    fn setup(config: VersionConfig) -> (Connection, VersionedTable) {
        let conn = open_in_memory().unwrap();
        let versioning = Versioning::new(articles(), config).unwrap();
        let store = VersionStore::for_versioning(&versioning);
        let table = VersionedTable::new(versioning, store).unwrap();
        table.install(&conn).unwrap();
        (conn, table)
    }

    #[test]
    fn two_saves_reconstruct_two_versions() {
        let (mut conn, table) = setup(VersionConfig::default().fields(["id", "title", "body"]));
        let mut article = Entity::new().with("title", "A").with("body", "x");
        table.save(&mut conn, &mut article).unwrap();
        article.set("title", "B");
        table.save(&mut conn, &mut article).unwrap();

        let record = table
            .get_with_versions(&conn, &Value::Integer(1))
            .unwrap()
            .unwrap();
        let history = record.versions().unwrap();

        assert_eq!(history.len(), 2);
        assert_eq!(history[&1].get("title"), Some(&Value::from("A")));
        assert_eq!(history[&1].get("body"), Some(&Value::from("x")));
        assert_eq!(history[&2].get("title"), Some(&Value::from("B")));
        assert_eq!(history[&2].get("body"), Some(&Value::from("x")));
        assert!(!record.has_changes());
    }

    #[test]
    fn record_without_history_gets_empty_mapping() {
        let (conn, table) = setup(VersionConfig::default());
        conn.execute("INSERT INTO articles (id, title) VALUES (7, 'raw')", [])
            .unwrap();

        let record = table
            .get_with_versions(&conn, &Value::Integer(7))
            .unwrap()
            .unwrap();

        assert_eq!(record.versions(), Some(&VersionHistory::new()));
    }

    #[test]
    fn decorates_many_records_with_their_own_histories() {
        let (mut conn, table) = setup(VersionConfig::default());
        let mut first = Entity::new().with("title", "first");
        let mut second = Entity::new().with("title", "second");
        table.save(&mut conn, &mut first).unwrap();
        table.save(&mut conn, &mut second).unwrap();
        second.set("title", "second again");
        table.save(&mut conn, &mut second).unwrap();

        let records = table.all(&conn).unwrap();
        let records = table
            .find_versions(&conn, records, &VersionQuery::new())
            .unwrap();

        assert_eq!(records[0].versions().unwrap().len(), 1);
        let second_history = records[1].versions().unwrap();
        assert_eq!(second_history.len(), 2);
        assert_eq!(
            second_history[&2].get("title"),
            Some(&Value::from("second again"))
        );
    }

    #[test]
    fn explicit_keys_and_version_ids_narrow_the_fetch() {
        let (mut conn, table) = setup(VersionConfig::default());
        let mut article = Entity::new().with("title", "A");
        for title in ["A", "B", "C"] {
            article.set("title", title);
            table.save(&mut conn, &mut article).unwrap();
        }
        let mut other = Entity::new().with("title", "Z");
        table.save(&mut conn, &mut other).unwrap();

        let records = table.find(&conn, &[Value::Integer(1)]).unwrap();
        let query = VersionQuery::new().foreign_keys([1_i64]).version_ids([1, 3]);
        let records = table.find_versions(&conn, records, &query).unwrap();

        let history = records[0].versions().unwrap();
        assert_eq!(history.keys().copied().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(history[&3].get("title"), Some(&Value::from("C")));
    }

    #[test]
    fn untracked_fields_never_appear_in_versions() {
        let (mut conn, table) = setup(VersionConfig::default().fields(["id", "title"]));
        let mut article = Entity::new().with("title", "A").with("body", "x");
        table.save(&mut conn, &mut article).unwrap();

        assert_eq!(
            table
                .store()
                .count_for(&conn, "articles", &Value::Integer(1))
                .unwrap(),
            1
        );
        let version = table.version(&conn, &Value::Integer(1), 1).unwrap().unwrap();
        assert_eq!(version.get("title"), Some(&Value::from("A")));
        assert!(version.get("body").is_none());
        assert!(table.version(&conn, &Value::Integer(1), 2).unwrap().is_none());
    }

    #[test]
    fn filter_fields_scope_histories() {
        let (mut conn, table) = setup(
            VersionConfig::default()
                .fields(["id", "title", "locale"])
                .filter_fields(["locale"]),
        );
        let mut article = Entity::new().with("title", "Hello").with("locale", "en");
        table.save(&mut conn, &mut article).unwrap();
        article.set("title", "Bonjour");
        article.set("locale", "fr");
        table.save(&mut conn, &mut article).unwrap();

        // The record is now French; only French snapshots belong to it.
        let record = table
            .get_with_versions(&conn, &Value::Integer(1))
            .unwrap()
            .unwrap();
        let history = record.versions().unwrap();
        assert_eq!(history.keys().copied().collect::<Vec<_>>(), vec![2]);

        // An explicit condition overrides the record's own locale.
        let query = VersionQuery::new().condition("locale", "en");
        let records = table
            .find_versions(&conn, vec![record], &query)
            .unwrap();
        let history = records[0].versions().unwrap();
        assert_eq!(history.keys().copied().collect::<Vec<_>>(), vec![1]);
        assert_eq!(history[&1].get("title"), Some(&Value::from("Hello")));
    }

    #[test]
    fn null_filter_values_match_with_is() {
        let (mut conn, table) = setup(
            VersionConfig::default()
                .fields(["id", "title", "locale"])
                .filter_fields(["locale"]),
        );
        let mut article = Entity::new().with("title", "Untranslated");
        table.save(&mut conn, &mut article).unwrap();

        let record = table
            .get_with_versions(&conn, &Value::Integer(1))
            .unwrap()
            .unwrap();

        assert_eq!(record.get("locale"), Some(&Value::Null));
        assert_eq!(record.versions().unwrap().len(), 1);
    }

    #[test]
    fn tables_sharing_a_store_keep_histories_apart() {
        let mut conn = open_in_memory().unwrap();
        let pages_schema = TableSchema::new("pages")
            .column("id", ColumnKind::Integer)
            .column("title", ColumnKind::Text)
            .primary_key(["id"]);

        let articles = {
            let versioning = Versioning::new(articles(), VersionConfig::default()).unwrap();
            let store = VersionStore::for_versioning(&versioning);
            VersionedTable::new(versioning, store).unwrap()
        };
        let pages = {
            let versioning = Versioning::new(pages_schema, VersionConfig::default()).unwrap();
            VersionedTable::new(versioning, VersionStore::new("version")).unwrap()
        };
        articles.install(&conn).unwrap();
        pages.install(&conn).unwrap();

        let mut article = Entity::new().with("title", "article");
        let mut page = Entity::new().with("title", "page");
        articles.save(&mut conn, &mut article).unwrap();
        pages.save(&mut conn, &mut page).unwrap();
        pages.save(&mut conn, &mut page).unwrap();

        // Both records have key 1.
        let key = Value::Integer(1);
        let article = articles.get_with_versions(&conn, &key).unwrap().unwrap();
        let page = pages.get_with_versions(&conn, &key).unwrap().unwrap();

        assert_eq!(article.versions().unwrap().len(), 1);
        assert_eq!(
            article.versions().unwrap()[&1].get("title"),
            Some(&Value::from("article"))
        );
        assert_eq!(page.versions().unwrap().len(), 2);
    }

    #[test]
    fn missing_record_yields_none() {
        let (conn, table) = setup(VersionConfig::default());

        assert!(table
            .get_with_versions(&conn, &Value::Integer(404))
            .unwrap()
            .is_none());
        assert!(table.version(&conn, &Value::Integer(404), 1).unwrap().is_none());
    }
}

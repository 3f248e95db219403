// ABOUTME: Reassembles flat (field, content, version_id) snapshot rows into per-version records.
// ABOUTME: Grouping does not depend on row order; each version becomes a clean, persisted Entity.

use std::collections::BTreeMap;

use crate::entity::Entity;
use crate::snapshot::StoredSnapshot;
use crate::value::Value;

/// Reconstructed versions of one owning record, keyed by `version_id`.
pub type VersionHistory = BTreeMap<i64, Entity>;

/// Group snapshot rows by `version_id` and fold each group's
/// (field, content) pairs into one reconstructed record.
///
/// Rows are expected to belong to a single owning record. Within a group,
/// fields keep the order in which rows arrive. If a field repeats within a
/// version, the later row wins.
pub fn group_snapshots<'a, I>(snapshots: I) -> VersionHistory
where
    I: IntoIterator<Item = &'a StoredSnapshot>,
{
    let mut grouped: BTreeMap<i64, Vec<(String, Value)>> = BTreeMap::new();
    for snapshot in snapshots {
        let fields = grouped.entry(snapshot.version_id).or_default();
        match fields.iter_mut().find(|(f, _)| *f == snapshot.field) {
            Some(slot) => slot.1 = snapshot.content.clone(),
            None => fields.push((snapshot.field.clone(), snapshot.content.clone())),
        }
    }

    grouped
        .into_iter()
        .map(|(version_id, fields)| (version_id, Entity::hydrate(fields)))
        .collect()
}

/// Whether a snapshot belongs to the given owning record: same key, and every
/// filter field the record holds matches by IS semantics (NULL matches NULL).
pub fn belongs_to<S: AsRef<str>>(
    snapshot: &StoredSnapshot,
    foreign_key: &Value,
    owner: &Entity,
    filter_fields: &[S],
) -> bool {
    if &snapshot.foreign_key != foreign_key {
        return false;
    }
    filter_fields.iter().all(|field| {
        let field = field.as_ref();
        match owner.get(field) {
            Some(expected) => snapshot.extra_value(field).unwrap_or(&Value::Null) == expected,
            None => true,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn snap(id: i64, version_id: i64, field: &str, content: &str) -> StoredSnapshot {
        StoredSnapshot {
            id,
            version_id,
            model: "articles".to_string(),
            foreign_key: Value::Integer(1),
            field: field.to_string(),
            content: Value::from(content),
            created: Utc::now(),
            extra: Vec::new(),
        }
    }

    #[test]
    fn groups_two_saves_into_two_versions() {
        let rows = vec![
            snap(1, 1, "title", "A"),
            snap(2, 1, "body", "x"),
            snap(3, 2, "title", "B"),
            snap(4, 2, "body", "x"),
        ];

        let history = group_snapshots(&rows);

        assert_eq!(history.len(), 2);
        assert_eq!(history[&1].get("title"), Some(&Value::from("A")));
        assert_eq!(history[&1].get("body"), Some(&Value::from("x")));
        assert_eq!(history[&2].get("title"), Some(&Value::from("B")));
        assert_eq!(history[&2].get("body"), Some(&Value::from("x")));
    }

    #[test]
    fn grouping_ignores_row_order() {
        let rows = vec![
            snap(4, 2, "body", "x"),
            snap(1, 1, "title", "A"),
            snap(3, 2, "title", "B"),
            snap(2, 1, "body", "x"),
        ];

        let history = group_snapshots(&rows);

        assert_eq!(history.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(history[&2].get("title"), Some(&Value::from("B")));
        // Within a version, fields follow arrival order.
        let fields: Vec<&str> = history[&2].fields().map(|(f, _)| f).collect();
        assert_eq!(fields, vec!["body", "title"]);
    }

    #[test]
    fn reconstructed_versions_are_clean_and_not_new() {
        let history = group_snapshots(&[snap(1, 1, "title", "A")]);

        let version = &history[&1];
        assert!(!version.is_new());
        assert!(!version.has_changes());
    }

    #[test]
    fn no_rows_yields_empty_history() {
        let history = group_snapshots(&Vec::<StoredSnapshot>::new());
        assert!(history.is_empty());
    }

    #[test]
    fn belongs_to_matches_null_filters() {
        let mut row = snap(1, 1, "title", "A");
        row.extra.push(("locale".to_string(), Value::Null));

        let untranslated = Entity::hydrate([("id", Value::Integer(1)), ("locale", Value::Null)]);
        let french = Entity::hydrate([("id", Value::Integer(1)), ("locale", Value::from("fr"))]);

        assert!(belongs_to(&row, &Value::Integer(1), &untranslated, &["locale"]));
        assert!(!belongs_to(&row, &Value::Integer(1), &french, &["locale"]));
        assert!(!belongs_to(&row, &Value::Integer(2), &untranslated, &["locale"]));
    }
}

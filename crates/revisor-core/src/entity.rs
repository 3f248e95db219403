// ABOUTME: In-memory record of an owning table row with dirty tracking and new/clean state.
// ABOUTME: Also carries save-time scratch snapshots and the reconstructed history attached by reads.

use std::collections::BTreeSet;

use crate::history::VersionHistory;
use crate::snapshot::VersionRow;
use crate::value::Value;

/// A record of an owning table.
///
/// Field order follows insertion order. Reconstructed versions are entities
/// too: built with [`Entity::hydrate`], not new and clean.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entity {
    values: Vec<(String, Value)>,
    dirty: BTreeSet<String>,
    new: bool,
    pending_snapshots: Vec<VersionRow>,
    versions: Option<VersionHistory>,
}

impl Entity {
    /// Create a new, unsaved entity with no fields.
    pub fn new() -> Self {
        Self {
            new: true,
            ..Self::default()
        }
    }

    /// Build a persisted, clean entity from canonical values, bypassing
    /// dirty tracking.
    pub fn hydrate<I, K>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut entity = Self::default();
        for (field, value) in values {
            entity.put(field.into(), value);
        }
        entity
    }

    /// Chained setter for building entities in one expression.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.iter().find(|(k, _)| k == field).map(|(_, v)| v)
    }

    pub fn has(&self, field: &str) -> bool {
        self.values.iter().any(|(k, _)| k == field)
    }

    /// Set a field. The field is marked dirty only when the value changes.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        let field = field.into();
        let value = value.into();
        if self.get(&field) == Some(&value) {
            return;
        }
        self.dirty.insert(field.clone());
        self.put(field, value);
    }

    fn put(&mut self, field: String, value: Value) {
        match self.values.iter_mut().find(|(k, _)| *k == field) {
            Some(slot) => slot.1 = value,
            None => self.values.push((field, value)),
        }
    }

    /// Values for the given fields, in the order requested. Fields the
    /// entity does not hold come back as [`Value::Null`].
    pub fn extract<S: AsRef<str>>(&self, fields: &[S]) -> Vec<(String, Value)> {
        fields
            .iter()
            .map(|f| {
                let f = f.as_ref();
                (f.to_string(), self.get(f).cloned().unwrap_or(Value::Null))
            })
            .collect()
    }

    /// Like [`Entity::extract`], limited to fields changed since the last save.
    pub fn extract_dirty<S: AsRef<str>>(&self, fields: &[S]) -> Vec<(String, Value)> {
        fields
            .iter()
            .filter(|f| self.dirty.contains(f.as_ref()))
            .map(|f| {
                let f = f.as_ref();
                (f.to_string(), self.get(f).cloned().unwrap_or(Value::Null))
            })
            .collect()
    }

    /// Iterate fields in insertion order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_new(&self) -> bool {
        self.new
    }

    pub fn set_new(&mut self, new: bool) {
        self.new = new;
    }

    pub fn is_dirty(&self, field: &str) -> bool {
        self.dirty.contains(field)
    }

    pub fn has_changes(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Forget all pending changes.
    pub fn clean(&mut self) {
        self.dirty.clear();
    }

    pub fn pending_snapshots(&self) -> &[VersionRow] {
        &self.pending_snapshots
    }

    pub fn set_pending_snapshots(&mut self, rows: Vec<VersionRow>) {
        self.pending_snapshots = rows;
    }

    pub fn take_pending_snapshots(&mut self) -> Vec<VersionRow> {
        std::mem::take(&mut self.pending_snapshots)
    }

    /// Reconstructed history attached by a versions fetch, if any.
    pub fn versions(&self) -> Option<&VersionHistory> {
        self.versions.as_ref()
    }

    pub fn set_versions(&mut self, versions: VersionHistory) {
        self.versions = Some(versions);
    }

    /// Plain JSON object of the entity's fields, with an `_versions` key when
    /// a history is attached.
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (field, value) in self.fields() {
            map.insert(field.to_string(), value.to_json());
        }
        if let Some(versions) = &self.versions {
            let history: serde_json::Map<_, _> = versions
                .iter()
                .map(|(version_id, version)| (version_id.to_string(), version.to_json()))
                .collect();
            map.insert("_versions".to_string(), serde_json::Value::Object(history));
        }
        serde_json::Value::Object(map)
    }
}

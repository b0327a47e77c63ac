//! Object store: every fetched record kept once, keyed by identity.

use std::collections::HashMap;

use serde::Serialize;

use crate::domain::error::FetchError;
use crate::domain::{Record, RecordId};

/// Fetch state of a single record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "error", rename_all = "snake_case")]
pub enum ObjectStatus {
    /// Unknown to the store.
    #[default]
    Pending,
    Loading,
    Loaded,
    Failed(FetchError),
}

/// Record plus its fetch state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ObjectEntry {
    pub record: Option<Record>,
    pub status: ObjectStatus,
}

static PENDING_ENTRY: ObjectEntry = ObjectEntry {
    record: None,
    status: ObjectStatus::Pending,
};

impl ObjectEntry {
    pub fn should_load(&self) -> bool {
        matches!(self.status, ObjectStatus::Pending)
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.status, ObjectStatus::Loading)
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.status, ObjectStatus::Loaded)
    }

    pub fn is_error(&self) -> bool {
        matches!(self.status, ObjectStatus::Failed(_))
    }

    pub fn error(&self) -> Option<&FetchError> {
        match &self.status {
            ObjectStatus::Failed(error) => Some(error),
            _ => None,
        }
    }
}

/// Identity-keyed record arena shared by every result window.
#[derive(Debug, Clone, Default)]
pub struct ObjectStore {
    entries: HashMap<RecordId, ObjectEntry>,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `id` as in flight. Returns `false` if it already was.
    pub fn start_load(&mut self, id: &RecordId) -> bool {
        let entry = self.entries.entry(id.clone()).or_default();
        if entry.is_loading() {
            return false;
        }
        entry.status = ObjectStatus::Loading;
        true
    }

    /// Assign `record` over any cached copy and mark it loaded.
    pub fn complete_load(&mut self, record: Record) {
        let entry = self.entries.entry(record.id.clone()).or_default();
        match entry.record.as_mut() {
            Some(existing) => existing.assign(record),
            None => entry.record = Some(record),
        }
        entry.status = ObjectStatus::Loaded;
    }

    /// Record a failed fetch; a previously loaded copy is kept.
    pub fn fail_load(&mut self, id: &RecordId, error: FetchError) {
        self.entries.entry(id.clone()).or_default().status = ObjectStatus::Failed(error);
    }

    pub fn delete(&mut self, id: &RecordId) -> Option<ObjectEntry> {
        self.entries.remove(id)
    }

    /// Store every record of a list page, whichever window fetched it.
    pub fn ingest_list_page<I>(&mut self, records: I) -> usize
    where
        I: IntoIterator<Item = Record>,
    {
        let mut count = 0;
        for record in records {
            self.complete_load(record);
            count += 1;
        }
        count
    }

    pub fn get(&self, id: &RecordId) -> Option<&ObjectEntry> {
        self.entries.get(id)
    }

    /// Entry for `id`, or a shared `Pending` placeholder for unknown ids.
    pub fn entry(&self, id: &RecordId) -> &ObjectEntry {
        self.entries.get(id).unwrap_or(&PENDING_ENTRY)
    }

    pub fn record(&self, id: &RecordId) -> Option<&Record> {
        self.entries.get(id).and_then(|entry| entry.record.as_ref())
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.record(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RecordId, &ObjectEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::domain::RecordKind;

    fn entity(id: &str, name: &str) -> Record {
        Record::new(id, RecordKind::Entity).with_field("name", name)
    }

    #[test]
    fn unknown_ids_read_as_pending_without_mutation() {
        let store = ObjectStore::new();
        let entry = store.entry(&RecordId::from("ghost"));

        assert!(entry.should_load());
        assert!(entry.record.is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn start_load_suppresses_duplicates() {
        let mut store = ObjectStore::new();
        let id = RecordId::from("e1");

        assert!(store.start_load(&id));
        assert!(!store.start_load(&id));
        let entry = store.entry(&id);
        assert!(entry.is_loading());
        assert!(!entry.should_load());
    }

    #[test]
    fn complete_load_is_idempotent() {
        let mut store = ObjectStore::new();
        store.complete_load(entity("e1", "Alice"));
        let once = store.entry(&RecordId::from("e1")).clone();

        store.complete_load(entity("e1", "Alice"));
        assert_eq!(store.entry(&RecordId::from("e1")), &once);
        assert!(once.is_loaded());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn complete_load_merges_over_partial_record() {
        let mut store = ObjectStore::new();
        store.complete_load(entity("e1", "Alice").with_field("country", "de"));
        store.complete_load(entity("e1", "Alice B."));

        let record = store.record(&RecordId::from("e1")).expect("record cached");
        assert_eq!(record.field("name"), Some(&json!("Alice B.")));
        assert_eq!(record.field("country"), Some(&json!("de")));
    }

    #[test]
    fn failure_keeps_the_loaded_copy() {
        let mut store = ObjectStore::new();
        let id = RecordId::from("e1");
        store.complete_load(entity("e1", "Alice"));
        store.fail_load(&id, FetchError::http(500, "boom"));

        let entry = store.entry(&id);
        assert!(entry.is_error());
        assert_eq!(entry.error().map(|e| e.status), Some(Some(500)));
        assert!(entry.record.is_some());
    }

    #[test]
    fn ingest_then_delete() {
        let mut store = ObjectStore::new();
        let ingested = store.ingest_list_page(vec![entity("a", "A"), entity("b", "B")]);
        assert_eq!(ingested, 2);
        assert!(store.contains(&RecordId::from("a")));

        assert!(store.delete(&RecordId::from("a")).is_some());
        assert!(!store.contains(&RecordId::from("a")));
        assert!(store.entry(&RecordId::from("a")).should_load());
        assert!(store.delete(&RecordId::from("a")).is_none());
    }
}

use crate::error::StoreError;
use crate::models::{ChangeMeta, Record, RecordId};
use crate::options::Options;
use crate::store::{OptionStore, RecordStore};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[derive(Debug, Default)]
pub struct MemoryOptionStore {
    options: Mutex<Options>,
    saves: Mutex<usize>,
}

impl MemoryOptionStore {
    pub fn new(options: Options) -> Self {
        Self {
            options: Mutex::new(options),
            saves: Mutex::new(0),
        }
    }

    pub fn snapshot(&self) -> Options {
        lock(&self.options).clone()
    }

    pub fn save_count(&self) -> usize {
        *lock(&self.saves)
    }
}

#[async_trait::async_trait]
impl OptionStore for MemoryOptionStore {
    async fn load(&self) -> Result<Options, StoreError> {
        Ok(self.snapshot())
    }

    async fn save(&self, options: &Options) -> Result<(), StoreError> {
        *lock(&self.options) = options.clone();
        *lock(&self.saves) += 1;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedChange {
    pub record: RecordId,
    pub author: String,
    pub field: String,
    pub old: String,
    pub new: String,
}

/// Record store backed by a map, with failure injection: `fail_on` breaks
/// `open`, `fail_save_on` breaks `save` and `fail_lookup` breaks
/// `find_by_label` for one label.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: Mutex<BTreeMap<RecordId, BTreeMap<String, String>>>,
    log: Mutex<Vec<LoggedChange>>,
    failing: Mutex<BTreeSet<RecordId>>,
    failing_saves: Mutex<BTreeSet<RecordId>>,
    failing_lookups: Mutex<BTreeSet<String>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: RecordId, fields: &[(&str, &str)]) {
        let fields = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        lock(&self.records).insert(id, fields);
    }

    pub fn fail_on(&self, id: RecordId) {
        lock(&self.failing).insert(id);
    }

    pub fn fail_save_on(&self, id: RecordId) {
        lock(&self.failing_saves).insert(id);
    }

    pub fn fail_lookup(&self, label: &str) {
        lock(&self.failing_lookups).insert(label.to_string());
    }

    pub fn field(&self, id: RecordId, field: &str) -> Option<String> {
        lock(&self.records)
            .get(&id)
            .map(|f| f.get(field).cloned().unwrap_or_default())
    }

    pub fn log(&self) -> Vec<LoggedChange> {
        lock(&self.log).clone()
    }
}

#[async_trait::async_trait]
impl RecordStore for MemoryRecordStore {
    async fn find_by_label(&self, field: &str, label: &str) -> Result<Vec<RecordId>, StoreError> {
        if lock(&self.failing_lookups).contains(label) {
            return Err(StoreError::Backend(format!("lookup of '{}' timed out", label)));
        }
        Ok(lock(&self.records)
            .iter()
            .filter(|(_, fields)| fields.get(field).is_some_and(|v| v.contains(label)))
            .map(|(id, _)| *id)
            .collect())
    }

    async fn open(&self, id: RecordId) -> Result<Record, StoreError> {
        if lock(&self.failing).contains(&id) {
            return Err(StoreError::Backend(format!("record #{} is locked", id)));
        }
        lock(&self.records)
            .get(&id)
            .map(|fields| Record::new(id, fields.clone()))
            .ok_or(StoreError::RecordNotFound(id))
    }

    async fn save(&self, record: &Record, change: &ChangeMeta) -> Result<(), StoreError> {
        if lock(&self.failing_saves).contains(&record.id()) {
            return Err(StoreError::Backend(format!(
                "transaction for record #{} rolled back",
                record.id()
            )));
        }
        let mut records = lock(&self.records);
        let stored = records
            .get_mut(&record.id())
            .ok_or(StoreError::RecordNotFound(record.id()))?;
        let mut log = lock(&self.log);
        for (field, old, new) in record.changes() {
            stored.insert(field.to_string(), new.to_string());
            log.push(LoggedChange {
                record: record.id(),
                author: change.author.clone(),
                field: field.to_string(),
                old: old.to_string(),
                new: new.to_string(),
            });
        }
        Ok(())
    }

    async fn create(&self, fields: BTreeMap<String, String>) -> Result<RecordId, StoreError> {
        let mut records = lock(&self.records);
        let id = records.keys().next_back().copied().unwrap_or(0) + 1;
        records.insert(id, fields);
        Ok(id)
    }
}

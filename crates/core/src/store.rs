use crate::error::StoreError;
use crate::models::{ChangeMeta, Record, RecordId};
use crate::options::Options;
use std::collections::BTreeMap;

#[async_trait::async_trait]
pub trait OptionStore: Send + Sync {
    async fn load(&self) -> Result<Options, StoreError>;

    /// Replaces the whole namespace in one transaction.
    async fn save(&self, options: &Options) -> Result<(), StoreError>;
}

#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    /// Records whose `field` contains `label` as a substring. Callers must
    /// still check the parsed label set.
    async fn find_by_label(&self, field: &str, label: &str) -> Result<Vec<RecordId>, StoreError>;

    async fn open(&self, id: RecordId) -> Result<Record, StoreError>;

    /// Persists the changed fields of `record` and their change-log entries
    /// atomically. Nothing is written on error.
    async fn save(&self, record: &Record, change: &ChangeMeta) -> Result<(), StoreError>;

    async fn create(&self, fields: BTreeMap<String, String>) -> Result<RecordId, StoreError>;
}

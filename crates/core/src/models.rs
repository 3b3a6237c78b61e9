use crate::error::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type RecordId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Add,
    Copy,
    Delete,
    Edit,
    Move,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFile {
    pub path: String,
    #[serde(default = "default_kind")]
    pub kind: ChangeKind,
}

fn default_kind() -> ChangeKind {
    ChangeKind::Edit
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub author: String,
    #[serde(default)]
    pub message: String,
    #[serde(default = "Utc::now")]
    pub time: DateTime<Utc>,
    pub changes: Vec<ChangedFile>,
}

impl ChangeEvent {
    pub fn paths(&self) -> Vec<&str> {
        self.changes.iter().map(|c| c.path.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeMeta {
    pub author: String,
    pub comment: String,
    pub time: DateTime<Utc>,
}

impl ChangeMeta {
    pub fn now(author: &str, comment: &str) -> Self {
        Self {
            author: author.to_string(),
            comment: comment.to_string(),
            time: Utc::now(),
        }
    }
}

/// In-memory copy of a downstream record, opened for a single change.
///
/// Field writes are tracked against the values the record was opened with so
/// stores can persist only what moved and log the old values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    id: RecordId,
    fields: BTreeMap<String, String>,
    original: BTreeMap<String, String>,
}

impl Record {
    pub fn new(id: RecordId, fields: BTreeMap<String, String>) -> Self {
        Self {
            id,
            fields,
            original: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn get_field(&self, name: &str) -> &str {
        self.fields.get(name).map(String::as_str).unwrap_or("")
    }

    pub fn set_field(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        let previous = self.get_field(name).to_string();
        if previous == value {
            return;
        }
        let original = self.original.entry(name.to_string()).or_insert(previous);
        if *original == value {
            self.original.remove(name);
        }
        self.fields.insert(name.to_string(), value);
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    pub fn is_dirty(&self) -> bool {
        !self.original.is_empty()
    }

    /// `(field, old, new)` for every field whose value differs from when the record was opened.
    pub fn changes(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.original
            .iter()
            .map(|(name, old)| (name.as_str(), old.as_str(), self.get_field(name)))
    }
}

#[derive(Debug)]
pub enum RecordStatus {
    Updated,
    Unchanged,
    Failed(StoreError),
}

#[derive(Debug)]
pub struct RecordOutcome {
    pub record: RecordId,
    pub status: RecordStatus,
}

/// Per-record results of a batch. A failed record never aborts the batch.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<RecordOutcome>,
    /// Labels whose record lookup failed, so none of their records were visited.
    pub failed_lookups: Vec<(String, StoreError)>,
}

impl BatchReport {
    pub fn push(&mut self, record: RecordId, status: RecordStatus) {
        self.outcomes.push(RecordOutcome { record, status });
    }

    pub fn merge(&mut self, other: BatchReport) {
        self.outcomes.extend(other.outcomes);
        self.failed_lookups.extend(other.failed_lookups);
    }

    pub fn updated(&self) -> usize {
        self.count(|s| matches!(s, RecordStatus::Updated))
    }

    pub fn unchanged(&self) -> usize {
        self.count(|s| matches!(s, RecordStatus::Unchanged))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, RecordStatus::Failed(_)))
    }

    pub fn updated_records(&self) -> Vec<RecordId> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, RecordStatus::Updated))
            .map(|o| o.record)
            .collect()
    }

    fn count(&self, pred: impl Fn(&RecordStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }
}

use crate::error::StoreError;
use crate::labels::LabelField;
use crate::models::{BatchReport, ChangeEvent, ChangeMeta, RecordId, RecordStatus};
use crate::options::split_list;
use crate::rules::{RuleSet, Triggered};
use crate::store::RecordStore;
use std::sync::Arc;
use tracing::{debug, error, info};

#[derive(Clone)]
pub struct EventHandler {
    records: Arc<dyn RecordStore>,
    label_field: String,
    cc_field: String,
}

impl EventHandler {
    pub fn new(records: Arc<dyn RecordStore>, label_field: &str, cc_field: &str) -> Self {
        Self {
            records,
            label_field: label_field.to_string(),
            cc_field: cc_field.to_string(),
        }
    }

    /// Labels every target record with the rules `event` triggers.
    ///
    /// Which records a commit may touch is decided by the caller. Records
    /// are saved only when a field actually changed, so redelivering an
    /// event is a no-op.
    pub async fn handle(
        &self,
        rules: &RuleSet,
        event: &ChangeEvent,
        targets: &[RecordId],
    ) -> (Triggered, BatchReport) {
        let triggered = rules.triggered(&event.paths());
        let mut report = BatchReport::default();
        if triggered.is_empty() {
            debug!("no rule triggered by commit from {}", event.author);
            return (triggered, report);
        }
        info!(
            rules = triggered.len(),
            records = targets.len(),
            "labelling records for commit by {}",
            event.author
        );
        let change = ChangeMeta {
            author: event.author.clone(),
            comment: String::new(),
            time: event.time,
        };
        for &id in targets {
            let status = match self.label_record(id, &triggered, &change).await {
                Ok(true) => RecordStatus::Updated,
                Ok(false) => RecordStatus::Unchanged,
                Err(e) => {
                    error!("unexpected error while processing record #{}: {}", id, e);
                    RecordStatus::Failed(e)
                }
            };
            report.push(id, status);
        }
        (triggered, report)
    }

    async fn label_record(
        &self,
        id: RecordId,
        triggered: &Triggered,
        change: &ChangeMeta,
    ) -> Result<bool, StoreError> {
        let mut record = self.records.open(id).await?;
        if let Some(cc) = merge_recipients(record.get_field(&self.cc_field), triggered) {
            record.set_field(&self.cc_field, cc);
        }
        LabelField::new(&mut record, &self.label_field).add(triggered.names());
        if !record.is_dirty() {
            return Ok(false);
        }
        self.records.save(&record, change).await?;
        Ok(true)
    }
}

/// Appends recipients missing from a comma-separated list. `None` when nothing is new.
fn merge_recipients(current: &str, triggered: &Triggered) -> Option<String> {
    let mut list = split_list(current);
    let before = list.len();
    for user in triggered.recipients() {
        if !list.iter().any(|u| u == user) {
            list.push(user.to_string());
        }
    }
    (list.len() != before).then(|| list.join(", "))
}

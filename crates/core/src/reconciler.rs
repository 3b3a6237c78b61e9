//! Keeps the label registry and every record's label field consistent with
//! rule names when rules are added, renamed or removed.

use crate::error::StoreError;
use crate::labels::{LabelField, LabelRegistry};
use crate::models::{BatchReport, ChangeMeta, RecordId, RecordStatus};
use crate::options::Options;
use crate::store::{OptionStore, RecordStore};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Clone, Copy)]
enum Relabel<'a> {
    Rename { old: &'a str, new: &'a str },
    Remove(&'a str),
}

impl Relabel<'_> {
    fn label(&self) -> &str {
        match self {
            Relabel::Rename { old, .. } => old,
            Relabel::Remove(label) => label,
        }
    }

    fn apply(&self, field: &mut LabelField<'_>) {
        match *self {
            Relabel::Rename { old, new } => field.rename(old, new),
            Relabel::Remove(label) => field.remove(label),
        }
    }
}

/// Propagates registry changes to records.
///
/// Each `on_*` call takes the staged option namespace (usually carrying the
/// admin's rule edits too), updates the registry in it and saves it in one
/// write before any record is touched. Records are then relabelled one at a
/// time, each in its own transaction; a failing record is reported and
/// skipped.
#[derive(Clone)]
pub struct LabelReconciler {
    options: Arc<dyn OptionStore>,
    records: Arc<dyn RecordStore>,
    field: String,
}

impl LabelReconciler {
    pub fn new(options: Arc<dyn OptionStore>, records: Arc<dyn RecordStore>, field: &str) -> Self {
        Self {
            options,
            records,
            field: field.to_string(),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub async fn on_rule_added(&self, staged: &mut Options, name: &str) -> Result<bool, StoreError> {
        let added = LabelRegistry::new(staged).add(name);
        self.options.save(staged).await?;
        Ok(added)
    }

    pub async fn on_rule_renamed(
        &self,
        staged: &mut Options,
        old: &str,
        new: &str,
        change: &ChangeMeta,
    ) -> Result<BatchReport, StoreError> {
        let renamed = old != new && LabelRegistry::new(staged).rename(old, new);
        self.options.save(staged).await?;
        if !renamed {
            return Ok(BatchReport::default());
        }
        info!("renaming label '{}' to '{}' on records", old, new);
        Ok(self.propagate(Relabel::Rename { old, new }, change).await)
    }

    pub async fn on_rules_removed<S: AsRef<str>>(
        &self,
        staged: &mut Options,
        names: &[S],
        change: &ChangeMeta,
    ) -> Result<BatchReport, StoreError> {
        let mut registry = LabelRegistry::new(staged);
        let removed: Vec<&str> = names
            .iter()
            .map(S::as_ref)
            .filter(|name| registry.remove(name))
            .collect();
        self.options.save(staged).await?;

        let mut report = BatchReport::default();
        for name in removed {
            info!("removing label '{}' from records", name);
            report.merge(self.propagate(Relabel::Remove(name), change).await);
        }
        Ok(report)
    }

    async fn propagate(&self, op: Relabel<'_>, change: &ChangeMeta) -> BatchReport {
        let mut report = BatchReport::default();
        let label = op.label();
        let ids = match self.records.find_by_label(&self.field, label).await {
            Ok(ids) => ids,
            Err(e) => {
                error!("failed to look up records labelled '{}': {}", label, e);
                report.failed_lookups.push((label.to_string(), e));
                return report;
            }
        };
        for id in ids {
            let status = match self.relabel(id, op, change).await {
                Ok(true) => RecordStatus::Updated,
                Ok(false) => RecordStatus::Unchanged,
                Err(e) => {
                    error!(
                        "failed to update label field of record #{} ({:?}) by {}: {}",
                        id, op, change.author, e
                    );
                    RecordStatus::Failed(e)
                }
            };
            report.push(id, status);
        }
        report
    }

    async fn relabel(
        &self,
        id: RecordId,
        op: Relabel<'_>,
        change: &ChangeMeta,
    ) -> Result<bool, StoreError> {
        let mut record = self.records.open(id).await?;
        let mut field = LabelField::new(&mut record, &self.field);
        op.apply(&mut field);
        if !field.is_updated() {
            return Ok(false);
        }
        self.records.save(&record, change).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::REGISTRY_KEY;
    use crate::memory::{MemoryOptionStore, MemoryRecordStore};

    const FIELD: &str = "filebiff";

    struct Fixture {
        options: Arc<MemoryOptionStore>,
        records: Arc<MemoryRecordStore>,
        reconciler: LabelReconciler,
    }

    fn fixture(registry: &str, records: &[(RecordId, &str)]) -> Fixture {
        let mut staged = Options::new();
        staged.set(REGISTRY_KEY, registry);
        let options = Arc::new(MemoryOptionStore::new(staged));
        let store = Arc::new(MemoryRecordStore::new());
        for (id, labels) in records {
            store.insert(*id, &[(FIELD, labels)]);
        }
        let reconciler = LabelReconciler::new(options.clone(), store.clone(), FIELD);
        Fixture {
            options,
            records: store,
            reconciler,
        }
    }

    fn change() -> ChangeMeta {
        ChangeMeta::now("admin", "Updated label field by administrator")
    }

    #[tokio::test]
    async fn rename_reaches_every_labelled_record_and_no_other() {
        let fx = fixture("build docs infra", &[(1, "build docs"), (2, "infra"), (3, "build")]);
        let mut staged = fx.options.snapshot();
        let report = fx
            .reconciler
            .on_rule_renamed(&mut staged, "build", "backend", &change())
            .await
            .unwrap();

        assert_eq!(fx.records.field(1, FIELD).unwrap(), "backend docs");
        assert_eq!(fx.records.field(2, FIELD).unwrap(), "infra");
        assert_eq!(fx.records.field(3, FIELD).unwrap(), "backend");
        assert_eq!(report.updated_records(), vec![1, 3]);
        assert_eq!(
            fx.options.snapshot().get(REGISTRY_KEY),
            Some("backend docs infra")
        );
    }

    #[tokio::test]
    async fn substring_candidates_are_left_unchanged() {
        let fx = fixture("build", &[(1, "rebuild"), (2, "build")]);
        let mut staged = fx.options.snapshot();
        let report = fx
            .reconciler
            .on_rule_renamed(&mut staged, "build", "backend", &change())
            .await
            .unwrap();
        assert_eq!(report.updated(), 1);
        assert_eq!(report.unchanged(), 1);
        assert_eq!(fx.records.field(1, FIELD).unwrap(), "rebuild");
        assert_eq!(fx.records.log().len(), 1);
    }

    #[tokio::test]
    async fn rename_of_unregistered_label_touches_no_record() {
        let fx = fixture("docs", &[(1, "build")]);
        let mut staged = fx.options.snapshot();
        let report = fx
            .reconciler
            .on_rule_renamed(&mut staged, "build", "backend", &change())
            .await
            .unwrap();
        assert!(report.outcomes.is_empty());
        assert_eq!(fx.records.field(1, FIELD).unwrap(), "build");
        assert_eq!(fx.options.save_count(), 1);
    }

    #[tokio::test]
    async fn remove_clears_label_and_registry() {
        let fx = fixture(
            "backend docs infra",
            &[(1, "backend docs"), (2, "infra"), (3, "backend")],
        );
        let mut staged = fx.options.snapshot();
        let report = fx
            .reconciler
            .on_rules_removed(&mut staged, &["infra"], &change())
            .await
            .unwrap();

        assert_eq!(report.updated_records(), vec![2]);
        assert_eq!(fx.records.field(1, FIELD).unwrap(), "backend docs");
        assert_eq!(fx.records.field(2, FIELD).unwrap(), "");
        assert_eq!(fx.records.field(3, FIELD).unwrap(), "backend");
        assert_eq!(fx.options.snapshot().get(REGISTRY_KEY), Some("backend docs"));
    }

    #[tokio::test]
    async fn failing_record_does_not_stop_the_batch() {
        let fx = fixture("build", &[(1, "build"), (2, "build"), (3, "build")]);
        fx.records.fail_on(2);
        let mut staged = fx.options.snapshot();
        let report = fx
            .reconciler
            .on_rules_removed(&mut staged, &["build", "unknown"], &change())
            .await
            .unwrap();

        assert_eq!(report.updated_records(), vec![1, 3]);
        assert_eq!(report.failed(), 1);
        assert!(matches!(
            report.outcomes[1].status,
            RecordStatus::Failed(StoreError::Backend(_))
        ));
        assert_eq!(fx.records.field(2, FIELD).unwrap(), "build");
        assert_eq!(fx.options.snapshot().get(REGISTRY_KEY), Some(""));
    }

    #[tokio::test]
    async fn failed_lookup_skips_only_that_label() {
        let fx = fixture("a b c", &[(1, "a b"), (2, "b c")]);
        fx.records.fail_lookup("a");
        let mut staged = fx.options.snapshot();
        let report = fx
            .reconciler
            .on_rules_removed(&mut staged, &["a", "b"], &change())
            .await
            .unwrap();

        assert_eq!(report.failed_lookups.len(), 1);
        assert_eq!(report.failed_lookups[0].0, "a");
        assert_eq!(report.updated_records(), vec![1, 2]);
        assert_eq!(fx.records.field(1, FIELD).unwrap(), "a");
        assert_eq!(fx.records.field(2, FIELD).unwrap(), "c");
        assert_eq!(fx.options.snapshot().get(REGISTRY_KEY), Some("c"));
    }

    #[tokio::test]
    async fn registry_is_saved_before_lookups_run() {
        let fx = fixture("a b", &[(1, "a")]);
        fx.records.fail_lookup("a");
        fx.records.fail_lookup("b");
        let mut staged = fx.options.snapshot();
        let report = fx
            .reconciler
            .on_rules_removed(&mut staged, &["a", "b"], &change())
            .await
            .unwrap();

        assert_eq!(report.failed_lookups.len(), 2);
        assert!(report.outcomes.is_empty());
        assert_eq!(fx.options.save_count(), 1);
        assert_eq!(fx.options.snapshot().get(REGISTRY_KEY), Some(""));
        assert_eq!(fx.records.field(1, FIELD).unwrap(), "a");
    }

    #[tokio::test]
    async fn failed_save_leaves_record_untouched_and_continues() {
        let fx = fixture("build", &[(1, "build docs"), (2, "build")]);
        fx.records.fail_save_on(1);
        let mut staged = fx.options.snapshot();
        let report = fx
            .reconciler
            .on_rule_renamed(&mut staged, "build", "backend", &change())
            .await
            .unwrap();

        assert!(matches!(
            report.outcomes[0].status,
            RecordStatus::Failed(StoreError::Backend(_))
        ));
        assert_eq!(report.updated_records(), vec![2]);
        assert_eq!(fx.records.field(1, FIELD).unwrap(), "build docs");
        assert_eq!(fx.records.field(2, FIELD).unwrap(), "backend");
        assert!(fx.records.log().iter().all(|c| c.record == 2));
    }

    #[tokio::test]
    async fn added_names_are_registered_once() {
        let fx = fixture("", &[]);
        let mut staged = fx.options.snapshot();
        assert!(fx.reconciler.on_rule_added(&mut staged, "ui").await.unwrap());
        assert!(!fx.reconciler.on_rule_added(&mut staged, "ui").await.unwrap());
        assert_eq!(fx.options.snapshot().get(REGISTRY_KEY), Some("ui"));
    }
}

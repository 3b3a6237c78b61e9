use biff_core::models::{BatchReport, RecordId, RecordStatus};
use biff_core::rules::Rule;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct RuleView {
    pub id: String,
    pub name: String,
    pub cc: String,
    pub filename: String,
}

impl From<&Rule> for RuleView {
    fn from(rule: &Rule) -> Self {
        Self {
            id: rule.id.clone(),
            name: rule.name.clone(),
            cc: rule.cc.join(", "),
            filename: rule.filename_patterns.join(", "),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OutcomeView {
    pub record: RecordId,
    pub status: &'static str,
    pub error: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct ReportView {
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub records: Vec<OutcomeView>,
    pub failed_lookups: Vec<String>,
}

impl From<&BatchReport> for ReportView {
    fn from(report: &BatchReport) -> Self {
        let records = report
            .outcomes
            .iter()
            .map(|o| {
                let (status, error) = match &o.status {
                    RecordStatus::Updated => ("updated", None),
                    RecordStatus::Unchanged => ("unchanged", None),
                    RecordStatus::Failed(e) => ("failed", Some(e.to_string())),
                };
                OutcomeView {
                    record: o.record,
                    status,
                    error,
                }
            })
            .collect();
        Self {
            updated: report.updated(),
            unchanged: report.unchanged(),
            failed: report.failed(),
            records,
            failed_lookups: report
                .failed_lookups
                .iter()
                .map(|(label, e)| format!("{}: {}", label, e))
                .collect(),
        }
    }
}

impl ReportView {
    pub fn print(&self, json: bool) -> anyhow::Result<()> {
        if json {
            println!("{}", serde_json::to_string_pretty(self)?);
            return Ok(());
        }
        println!(
            "records: updated={}, unchanged={}, failed={}",
            self.updated, self.unchanged, self.failed
        );
        for r in self.records.iter().filter(|r| r.error.is_some()) {
            println!("  #{}: {}", r.record, r.error.as_deref().unwrap_or(""));
        }
        for l in &self.failed_lookups {
            println!("  lookup failed for {}", l);
        }
        Ok(())
    }
}

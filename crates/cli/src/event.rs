use crate::app::App;
use crate::views::ReportView;
use anyhow::{Context, Result};
use biff_core::models::{ChangeEvent, RecordId};
use serde::Serialize;
use std::io::Read;
use std::path::Path;

#[derive(Debug, Serialize)]
pub struct EventSummary {
    pub triggered: Vec<String>,
    pub recipients: Vec<String>,
    pub report: ReportView,
}

/// Reads a change event as JSON from a file, or from stdin when `path` is `-`.
pub fn load_event(path: &Path) -> Result<ChangeEvent> {
    let raw = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(path).with_context(|| format!("read event {:?}", path))?
    };
    serde_json::from_str(&raw).context("parse change event")
}

pub async fn run_event(app: &App, event: &ChangeEvent, targets: &[RecordId]) -> Result<EventSummary> {
    let rules = app.rule_set().await?;
    let (triggered, report) = app.handler.handle(&rules, event, targets).await;
    Ok(EventSummary {
        triggered: triggered.names().map(str::to_string).collect(),
        recipients: triggered
            .recipients()
            .into_iter()
            .map(str::to_string)
            .collect(),
        report: ReportView::from(&report),
    })
}

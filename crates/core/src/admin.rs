use crate::error::AdminError;
use crate::labels::LabelRegistry;
use crate::matcher::PatternMatcher;
use crate::models::{BatchReport, ChangeMeta};
use crate::options::Options;
use crate::reconciler::LabelReconciler;
use crate::rules::{self, Rule, RuleBook, RuleDraft, RuleId};
use crate::store::OptionStore;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

const RELABEL_COMMENT: &str = "Updated label field value by administrator";

#[derive(Clone)]
pub struct RuleAdmin {
    options: Arc<dyn OptionStore>,
    reconciler: LabelReconciler,
    known_users: Vec<String>,
    matcher: PatternMatcher,
}

impl RuleAdmin {
    pub fn new(
        options: Arc<dyn OptionStore>,
        reconciler: LabelReconciler,
        known_users: Vec<String>,
    ) -> Self {
        Self {
            options,
            reconciler,
            known_users,
            matcher: PatternMatcher::default(),
        }
    }

    pub fn with_matcher(mut self, matcher: PatternMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub async fn rules(&self) -> Result<Vec<Rule>, AdminError> {
        let mut options = self.options.load().await?;
        Ok(RuleBook::new(&mut options).list())
    }

    pub async fn labels(&self) -> Result<BTreeSet<String>, AdminError> {
        let mut options = self.options.load().await?;
        Ok(LabelRegistry::new(&mut options).labels())
    }

    pub async fn add(&self, draft: &RuleDraft) -> Result<RuleId, AdminError> {
        let mut options = self.options.load().await?;
        let mut book = RuleBook::new(&mut options);
        rules::validate(draft, &book.list(), &self.known_users)?;
        rules::check_patterns(draft, &self.matcher)?;
        let id = RuleBook::next_id();
        book.put(&id, draft);
        self.reconciler.on_rule_added(&mut options, &draft.name).await?;
        info!("added rule '{}' ({})", draft.name, id);
        Ok(id)
    }

    pub async fn update(
        &self,
        actor: &str,
        id: &str,
        draft: &RuleDraft,
    ) -> Result<BatchReport, AdminError> {
        let mut options = self.options.load().await?;
        let mut book = RuleBook::new(&mut options);
        let current = book
            .get(id)
            .ok_or_else(|| AdminError::UnknownRule(id.to_string()))?;
        let others = book.list().into_iter().filter(|r| r.id != id).collect::<Vec<_>>();
        rules::validate(draft, &others, &self.known_users)?;
        rules::check_patterns(draft, &self.matcher)?;
        book.put(id, draft);

        let change = ChangeMeta::now(actor, RELABEL_COMMENT);
        let report = self
            .reconciler
            .on_rule_renamed(&mut options, &current.name, &draft.name, &change)
            .await?;
        info!(
            updated = report.updated(),
            failed = report.failed(),
            "updated rule '{}' ({})",
            draft.name,
            id
        );
        Ok(report)
    }

    pub async fn remove<S: AsRef<str>>(
        &self,
        actor: &str,
        ids: &[S],
    ) -> Result<BatchReport, AdminError> {
        let mut options: Options = self.options.load().await?;
        let mut book = RuleBook::new(&mut options);
        let mut names = Vec::new();
        for id in ids.iter().map(S::as_ref) {
            match book.delete(id) {
                Some(rule) => names.push(rule.name),
                None => warn!("rule id not found: {}", id),
            }
        }
        let change = ChangeMeta::now(actor, RELABEL_COMMENT);
        let report = self
            .reconciler
            .on_rules_removed(&mut options, &names, &change)
            .await?;
        info!(rules = names.len(), updated = report.updated(), "removed rules");
        Ok(report)
    }
}

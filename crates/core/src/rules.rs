use crate::error::ValidationError;
use crate::matcher::{CompiledPatterns, MatcherError, PatternMatcher};
use crate::options::{split_list, Options};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

pub type RuleId = String;

const RULE_IDS: &str = "rule_ids";

/// A named watch: files matching `filename_patterns` attach `name` as a label
/// and notify `cc`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub name: String,
    pub cc: Vec<String>,
    pub filename_patterns: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDraft {
    pub name: String,
    pub cc: Vec<String>,
    pub filename_patterns: Vec<String>,
}

impl RuleDraft {
    pub fn from_form(name: &str, cc: &str, filename_patterns: &str) -> Self {
        Self {
            name: name.trim().to_string(),
            cc: split_list(cc),
            filename_patterns: split_list(filename_patterns),
        }
    }
}

/// `others` must exclude the rule being updated. `known_users`, when
/// non-empty, restricts who may be listed as a recipient.
pub fn validate<'a>(
    draft: &RuleDraft,
    others: impl IntoIterator<Item = &'a Rule>,
    known_users: &[String],
) -> Result<(), ValidationError> {
    if draft.name.is_empty() {
        return Err(ValidationError::MissingField("name"));
    }
    if draft.filename_patterns.is_empty() {
        return Err(ValidationError::MissingField("filename"));
    }
    if draft.name.chars().any(char::is_whitespace) {
        return Err(ValidationError::WhitespaceInName(draft.name.clone()));
    }
    if !known_users.is_empty() {
        if let Some(user) = draft.cc.iter().find(|u| !known_users.contains(u)) {
            return Err(ValidationError::UnknownUser(user.clone()));
        }
    }

    let others: Vec<&Rule> = others.into_iter().collect();
    if others.iter().any(|r| r.name == draft.name) {
        return Err(ValidationError::DuplicateName(draft.name.clone()));
    }
    let claimed_patterns: BTreeSet<&str> = others
        .iter()
        .flat_map(|r| r.filename_patterns.iter().map(String::as_str))
        .collect();
    if let Some(p) = draft
        .filename_patterns
        .iter()
        .find(|p| claimed_patterns.contains(p.as_str()))
    {
        return Err(ValidationError::DuplicateValue {
            field: "filename",
            value: p.clone(),
        });
    }
    let claimed_cc: BTreeSet<&str> = others
        .iter()
        .flat_map(|r| r.cc.iter().map(String::as_str))
        .collect();
    if let Some(user) = draft.cc.iter().find(|u| claimed_cc.contains(u.as_str())) {
        return Err(ValidationError::DuplicateValue {
            field: "cc",
            value: user.clone(),
        });
    }
    Ok(())
}

/// Rejects patterns the active matcher cannot compile, so one bad rule
/// cannot break matching for every other rule.
pub fn check_patterns(draft: &RuleDraft, matcher: &PatternMatcher) -> Result<(), ValidationError> {
    match matcher.compile(&draft.filename_patterns) {
        Ok(_) => Ok(()),
        Err(MatcherError::InvalidPattern { pattern, reason }) => {
            Err(ValidationError::InvalidPattern { pattern, reason })
        }
    }
}

/// Rule definitions persisted in the flat option namespace.
///
/// `rule_ids` lists every id; each rule keeps `rule.<id>.name`,
/// `rule.<id>.cc` and `rule.<id>.filenamePatterns`.
pub struct RuleBook<'a> {
    options: &'a mut Options,
}

impl<'a> RuleBook<'a> {
    pub fn new(options: &'a mut Options) -> Self {
        Self { options }
    }

    pub fn next_id() -> RuleId {
        let value: u64 = rand::rng().random();
        format!("{:016x}", value)
    }

    pub fn ids(&self) -> Vec<RuleId> {
        self.options.get_list(RULE_IDS)
    }

    pub fn list(&self) -> Vec<Rule> {
        self.ids().iter().filter_map(|id| self.get(id)).collect()
    }

    pub fn get(&self, id: &str) -> Option<Rule> {
        if !self.ids().iter().any(|i| i == id) {
            return None;
        }
        Some(Rule {
            id: id.to_string(),
            name: self.options.get(&key(id, "name")).unwrap_or("").to_string(),
            cc: self.options.get_list(&key(id, "cc")),
            filename_patterns: self.options.get_list(&key(id, "filenamePatterns")),
        })
    }

    pub fn put(&mut self, id: &str, draft: &RuleDraft) {
        let mut ids = self.ids();
        if !ids.iter().any(|i| i == id) {
            ids.push(id.to_string());
            self.options.set_list(RULE_IDS, &ids);
        }
        self.options.set(&key(id, "name"), draft.name.as_str());
        self.options.set_list(&key(id, "cc"), &draft.cc);
        self.options
            .set_list(&key(id, "filenamePatterns"), &draft.filename_patterns);
    }

    pub fn delete(&mut self, id: &str) -> Option<Rule> {
        let rule = self.get(id)?;
        let ids: Vec<RuleId> = self.ids().into_iter().filter(|i| i != id).collect();
        self.options.set_list(RULE_IDS, &ids);
        for field in ["name", "cc", "filenamePatterns"] {
            self.options.remove(&key(id, field));
        }
        Some(rule)
    }
}

fn key(id: &str, field: &str) -> String {
    format!("rule.{}.{}", id, field)
}

/// Rules that fired for one event: rule name to its recipients.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Triggered(BTreeMap<String, BTreeSet<String>>);

impl Triggered {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn recipients(&self) -> BTreeSet<&str> {
        self.0
            .values()
            .flat_map(|cc| cc.iter().map(String::as_str))
            .collect()
    }

    pub fn cc(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.0.get(name)
    }
}

struct CompiledRule {
    rule: Rule,
    patterns: CompiledPatterns,
}

pub struct RuleSet {
    rules: Vec<CompiledRule>,
    matcher: PatternMatcher,
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>, matcher: PatternMatcher) -> Result<Self, MatcherError> {
        let rules = rules
            .into_iter()
            .map(|rule| -> Result<CompiledRule, MatcherError> {
                let patterns = matcher.compile(&rule.filename_patterns)?;
                Ok(CompiledRule { rule, patterns })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules, matcher })
    }

    pub fn matcher(&self) -> PatternMatcher {
        self.matcher
    }

    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().map(|c| &c.rule)
    }

    pub fn triggered<F: AsRef<str>>(&self, files: &[F]) -> Triggered {
        let mut triggered = Triggered::default();
        for compiled in &self.rules {
            let Some(first) = compiled.patterns.match_files(files).next() else {
                continue;
            };
            debug!(rule = %compiled.rule.name, path = first, "rule triggered");
            triggered
                .0
                .entry(compiled.rule.name.clone())
                .or_default()
                .extend(compiled.rule.cc.iter().cloned());
        }
        triggered
    }
}

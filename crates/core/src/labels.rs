//! Set-valued label text: per-record label fields and the global label registry.

use crate::models::Record;
use crate::options::Options;
use std::collections::BTreeSet;

pub const REGISTRY_KEY: &str = "fb_options";

fn parse(value: &str) -> BTreeSet<String> {
    value.split_whitespace().map(str::to_string).collect()
}

fn join(labels: &BTreeSet<String>) -> String {
    labels.iter().map(String::as_str).collect::<Vec<_>>().join(" ")
}

/// Label field of one record, stored as whitespace-separated tokens.
///
/// Every mutation writes the field back sorted and space-joined, and only
/// when the set actually changed. `is_updated` stays set for the lifetime
/// of the value once any mutation changed the field.
pub struct LabelField<'r> {
    record: &'r mut Record,
    field: String,
    updated: bool,
}

impl<'r> LabelField<'r> {
    pub fn new(record: &'r mut Record, field: &str) -> Self {
        Self {
            record,
            field: field.to_string(),
            updated: false,
        }
    }

    pub fn labels(&self) -> BTreeSet<String> {
        parse(self.record.get_field(&self.field))
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels().contains(label)
    }

    pub fn is_updated(&self) -> bool {
        self.updated
    }

    pub fn add<I, S>(&mut self, labels: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut current = self.labels();
        let mut changed = false;
        for label in labels {
            let label = label.as_ref();
            if !label.is_empty() && current.insert(label.to_string()) {
                changed = true;
            }
        }
        if changed {
            self.write(&current);
        }
    }

    /// Replaces `old` with `new`. Renaming onto an existing label merges the two.
    pub fn rename(&mut self, old: &str, new: &str) {
        if old == new {
            return;
        }
        let mut current = self.labels();
        if current.remove(old) {
            current.insert(new.to_string());
            self.write(&current);
        }
    }

    pub fn remove(&mut self, label: &str) {
        let mut current = self.labels();
        if current.remove(label) {
            self.write(&current);
        }
    }

    fn write(&mut self, labels: &BTreeSet<String>) {
        self.record.set_field(&self.field, join(labels));
        self.updated = true;
    }
}

pub struct LabelRegistry<'a> {
    options: &'a mut Options,
}

impl<'a> LabelRegistry<'a> {
    pub fn new(options: &'a mut Options) -> Self {
        Self { options }
    }

    pub fn labels(&self) -> BTreeSet<String> {
        parse(self.options.get(REGISTRY_KEY).unwrap_or(""))
    }

    pub fn add(&mut self, label: &str) -> bool {
        let mut labels = self.labels();
        let added = labels.insert(label.to_string());
        if added {
            self.store(&labels);
        }
        added
    }

    /// Returns false, leaving the registry alone, when `old` is not registered.
    pub fn rename(&mut self, old: &str, new: &str) -> bool {
        let mut labels = self.labels();
        if !labels.remove(old) {
            return false;
        }
        labels.insert(new.to_string());
        self.store(&labels);
        true
    }

    pub fn remove(&mut self, label: &str) -> bool {
        let mut labels = self.labels();
        let removed = labels.remove(label);
        if removed {
            self.store(&labels);
        }
        removed
    }

    fn store(&mut self, labels: &BTreeSet<String>) {
        self.options.set(REGISTRY_KEY, join(labels));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    const FIELD: &str = "filebiff";

    fn record(labels: &str) -> Record {
        let mut fields = BTreeMap::new();
        fields.insert(FIELD.to_string(), labels.to_string());
        Record::new(1, fields)
    }

    #[test]
    fn add_is_idempotent() {
        let mut rec = record("docs");
        let mut field = LabelField::new(&mut rec, FIELD);
        field.add(["ui", "build"]);
        assert!(field.is_updated());
        assert_eq!(rec.get_field(FIELD), "build docs ui");

        let mut again = LabelField::new(&mut rec, FIELD);
        again.add(["ui", "build"]);
        assert!(!again.is_updated());
        assert_eq!(rec.get_field(FIELD), "build docs ui");
    }

    #[test]
    fn add_to_empty_field() {
        let mut rec = Record::new(1, BTreeMap::new());
        let mut field = LabelField::new(&mut rec, FIELD);
        field.add(Vec::<String>::new());
        assert!(!field.is_updated());
        field.add(["ui"]);
        assert!(field.is_updated());
        assert_eq!(rec.get_field(FIELD), "ui");
    }

    #[test]
    fn unsorted_storage_is_not_rewritten_without_a_change() {
        let mut rec = record("ui  build");
        let mut field = LabelField::new(&mut rec, FIELD);
        field.add(["build"]);
        assert!(!field.is_updated());
        assert_eq!(rec.get_field(FIELD), "ui  build");
    }

    #[test]
    fn rename_round_trip_restores_the_set() {
        let mut rec = record("build docs");
        let mut field = LabelField::new(&mut rec, FIELD);
        field.rename("build", "backend");
        assert_eq!(field.labels().into_iter().collect::<Vec<_>>(), vec!["backend", "docs"]);
        field.rename("backend", "build");
        assert!(field.is_updated());
        assert_eq!(rec.get_field(FIELD), "build docs");
    }

    #[test]
    fn rename_absent_label_or_onto_existing() {
        let mut rec = record("docs ui");
        let mut field = LabelField::new(&mut rec, FIELD);
        field.rename("build", "backend");
        assert!(!field.is_updated());

        field.rename("docs", "ui");
        assert!(field.is_updated());
        assert_eq!(rec.get_field(FIELD), "ui");
    }

    #[test]
    fn remove_only_touches_present_labels() {
        let mut rec = record("infra");
        let mut field = LabelField::new(&mut rec, FIELD);
        field.remove("inf");
        assert!(!field.is_updated());
        field.remove("infra");
        assert!(field.is_updated());
        assert_eq!(rec.get_field(FIELD), "");
    }

    #[test]
    fn registry_tracks_rule_names() {
        let mut options = Options::new();
        let mut registry = LabelRegistry::new(&mut options);
        assert!(registry.add("ui"));
        assert!(registry.add("build"));
        assert!(!registry.add("ui"));
        assert!(!registry.rename("missing", "other"));
        assert!(registry.rename("build", "backend"));
        assert!(registry.remove("ui"));
        assert!(!registry.remove("ui"));
        assert_eq!(options.get(REGISTRY_KEY), Some("backend"));
    }
}

use crate::matcher::{self, PatternMatcher, DEFAULT_MATCHER};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub matcher: MatcherConfig,
    #[serde(default)]
    pub labels: LabelConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "filebiff.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    #[serde(default = "default_matcher_kind")]
    pub kind: String,
    #[serde(default)]
    pub case_insensitive: bool,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            kind: default_matcher_kind(),
            case_insensitive: false,
        }
    }
}

impl MatcherConfig {
    pub fn build(&self) -> PatternMatcher {
        matcher::select(&self.kind, self.case_insensitive)
    }
}

fn default_matcher_kind() -> String {
    DEFAULT_MATCHER.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelConfig {
    /// Record field holding the labels of triggered rules.
    #[serde(default = "default_label_field")]
    pub field: String,
    /// Record field receiving the recipients of triggered rules.
    #[serde(default = "default_cc_field")]
    pub cc_field: String,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            field: default_label_field(),
            cc_field: default_cc_field(),
        }
    }
}

fn default_label_field() -> String {
    "filebiff".to_string()
}

fn default_cc_field() -> String {
    "cc".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default)]
    pub known_users: Vec<String>,
}

pub fn load(path: Option<&str>) -> anyhow::Result<AppConfig> {
    let mut settings = config::Config::builder();
    if let Some(p) = path {
        settings = settings.add_source(config::File::with_name(p));
    } else {
        settings = settings.add_source(config::File::with_name("config/default").required(false));
    }
    settings = settings.add_source(
        config::Environment::with_prefix("FILEBIFF")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("validation.known_users"),
    );
    let cfg = settings.build()?;
    Ok(cfg.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("biff.toml");
        std::fs::write(
            &path,
            r#"
            [matcher]
            kind = "nonsense"

            [labels]
            field = "watch"

            [validation]
            known_users = ["alice", "bob"]
            "#,
        )
        .unwrap();
        let cfg = load(path.to_str()).unwrap();
        assert_eq!(cfg.database.path, "filebiff.db");
        assert_eq!(cfg.labels.field, "watch");
        assert_eq!(cfg.labels.cc_field, "cc");
        assert_eq!(cfg.validation.known_users, vec!["alice", "bob"]);
        assert_eq!(cfg.matcher.build().kind(), "glob");
    }
}

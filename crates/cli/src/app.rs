use anyhow::Context;
use biff_core::admin::RuleAdmin;
use biff_core::config::AppConfig;
use biff_core::events::EventHandler;
use biff_core::reconciler::LabelReconciler;
use biff_core::rules::{RuleBook, RuleSet};
use biff_core::sqlite::{SqliteOptionStore, SqliteRecordStore};
use biff_core::store::OptionStore;
use std::sync::Arc;
use storage::{connect, migrate};
use tracing::info;

/// Configuration, stores and services wired together for one invocation.
pub struct App {
    pub cfg: AppConfig,
    pub options: Arc<SqliteOptionStore>,
    pub records: Arc<SqliteRecordStore>,
    pub admin: RuleAdmin,
    pub handler: EventHandler,
}

impl App {
    pub async fn open(cfg: AppConfig) -> anyhow::Result<Self> {
        let pool = connect(&cfg.database.path).await.context("db connect")?;
        migrate(&pool).await.context("db migrate")?;
        info!(database = %cfg.database.path, "opened rule and record store");

        let options = Arc::new(SqliteOptionStore::new(pool.clone()));
        let records = Arc::new(SqliteRecordStore::new(pool));
        let reconciler = LabelReconciler::new(options.clone(), records.clone(), &cfg.labels.field);
        let admin = RuleAdmin::new(
            options.clone(),
            reconciler,
            cfg.validation.known_users.clone(),
        )
        .with_matcher(cfg.matcher.build());
        let handler = EventHandler::new(records.clone(), &cfg.labels.field, &cfg.labels.cc_field);
        Ok(Self {
            cfg,
            options,
            records,
            admin,
            handler,
        })
    }

    /// Fresh snapshot of the configured rules, compiled for the configured matcher.
    pub async fn rule_set(&self) -> anyhow::Result<RuleSet> {
        let mut options = self.options.load().await?;
        let rules = RuleBook::new(&mut options).list();
        let matcher = self.cfg.matcher.build();
        RuleSet::new(rules, matcher).context("compile rule patterns")
    }
}

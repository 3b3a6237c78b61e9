//! Storage layer: SQLite schemas and helpers.
//!
//! Holds DB pool setup and migration runner.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

/// Normalizes a bare filesystem path into a `sqlite:` URL. URLs pass through.
pub fn database_url(database: &str) -> String {
    if database.starts_with("sqlite:") {
        return database.to_string();
    }
    let path = std::path::PathBuf::from(database);
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let norm = path.to_string_lossy().replace('\\', "/");
    if path.is_absolute() {
        format!("sqlite:///{}", norm.trim_start_matches('/'))
    } else {
        format!("sqlite://{}", norm)
    }
}

pub async fn connect(database: &str) -> anyhow::Result<SqlitePool> {
    let url = database_url(database);
    let options = SqliteConnectOptions::from_str(&url)?.create_if_missing(true);
    let mut pool_opts = SqlitePoolOptions::new();
    if url.contains("memory") {
        pool_opts = pool_opts.max_connections(1);
    } else {
        pool_opts = pool_opts.max_connections(5);
    }
    let pool = pool_opts.connect_with(options).await?;
    tracing::debug!("connected to {}", url);
    Ok(pool)
}

pub async fn migrate(pool: &SqlitePool) -> anyhow::Result<()> {
    // Applies SQLx migrations located in crates/storage/migrations.
    // Safe to run multiple times (idempotent).
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

use crate::error::StoreError;
use crate::models::{ChangeMeta, Record, RecordId};
use crate::options::Options;
use crate::store::{OptionStore, RecordStore};
use chrono::Utc;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct SqliteOptionStore {
    pool: SqlitePool,
}

impl SqliteOptionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl OptionStore for SqliteOptionStore {
    async fn load(&self) -> Result<Options, StoreError> {
        let rows = sqlx::query("SELECT key, value FROM options")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| (row.get::<String, _>(0), row.get::<String, _>(1)))
            .collect())
    }

    async fn save(&self, options: &Options) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM options").execute(&mut *tx).await?;
        for (key, value) in options.iter() {
            sqlx::query("INSERT INTO options (key, value) VALUES (?1, ?2)")
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChange {
    pub time: i64,
    pub author: String,
    pub field: String,
    pub old: Option<String>,
    pub new: Option<String>,
    pub comment: String,
}

#[derive(Debug, Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn history(&self, id: RecordId) -> Result<Vec<FieldChange>, StoreError> {
        let rows = sqlx::query(
            "SELECT time, author, field, oldvalue, newvalue, comment FROM record_changes WHERE record = ?1 ORDER BY id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| FieldChange {
                time: row.get(0),
                author: row.get(1),
                field: row.get(2),
                old: row.get(3),
                new: row.get(4),
                comment: row.get(5),
            })
            .collect())
    }
}

#[async_trait::async_trait]
impl RecordStore for SqliteRecordStore {
    async fn find_by_label(&self, field: &str, label: &str) -> Result<Vec<RecordId>, StoreError> {
        let ids = sqlx::query_scalar(
            "SELECT record FROM record_fields WHERE name = ?1 AND value LIKE ?2 ORDER BY record",
        )
        .bind(field)
        .bind(format!("%{}%", label))
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn open(&self, id: RecordId) -> Result<Record, StoreError> {
        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM records WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            return Err(StoreError::RecordNotFound(id));
        }
        let rows = sqlx::query("SELECT name, value FROM record_fields WHERE record = ?1")
            .bind(id)
            .fetch_all(&self.pool)
            .await?;
        let fields = rows
            .into_iter()
            .map(|row| (row.get::<String, _>(0), row.get::<String, _>(1)))
            .collect();
        Ok(Record::new(id, fields))
    }

    async fn save(&self, record: &Record, change: &ChangeMeta) -> Result<(), StoreError> {
        let time = change.time.timestamp();
        let mut tx = self.pool.begin().await?;
        let touched = sqlx::query("UPDATE records SET changed_at = ?2 WHERE id = ?1")
            .bind(record.id())
            .bind(time)
            .execute(&mut *tx)
            .await?;
        if touched.rows_affected() == 0 {
            return Err(StoreError::RecordNotFound(record.id()));
        }
        for (field, old, new) in record.changes() {
            sqlx::query(
                "INSERT INTO record_fields (record, name, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(record, name) DO UPDATE SET value = excluded.value",
            )
            .bind(record.id())
            .bind(field)
            .bind(new)
            .execute(&mut *tx)
            .await?;
            sqlx::query(
                "INSERT INTO record_changes (record, time, author, field, oldvalue, newvalue, comment)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .bind(record.id())
            .bind(time)
            .bind(&change.author)
            .bind(field)
            .bind(old)
            .bind(new)
            .bind(&change.comment)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn create(&self, fields: BTreeMap<String, String>) -> Result<RecordId, StoreError> {
        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        let id = sqlx::query("INSERT INTO records (created_at, changed_at) VALUES (?1, ?1)")
            .bind(now)
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();
        for (name, value) in &fields {
            sqlx::query("INSERT INTO record_fields (record, name, value) VALUES (?1, ?2, ?3)")
                .bind(id)
                .bind(name)
                .bind(value)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(id)
    }
}

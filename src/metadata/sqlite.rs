//! SQLite-backed metadata store
//!
//! One row per key in `kv_records`. Every operation is a single statement, so
//! a single key is updated atomically and nothing more.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use tracing::info;

use super::{KeyEntry, ListOptions, ListPage, MetadataStore, StoreError, StoreResult, StoredEntry};

pub struct SqliteMetadataStore {
    pool: SqlitePool,
}

impl SqliteMetadataStore {
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

        // each connection to an in-memory database is its own database
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        info!("Connected to SQLite metadata store: {}", url);
        Ok(store)
    }

    async fn migrate(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_records (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL,
                metadata TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn decode_metadata(key: &str, raw: Option<String>) -> StoreResult<Option<Value>> {
        match raw {
            Some(text) => serde_json::from_str(&text)
                .map(Some)
                .map_err(|source| StoreError::Corrupt {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn get(&self, key: &str) -> StoreResult<Option<StoredEntry>> {
        let row = sqlx::query("SELECT value, metadata FROM kv_records WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let value: String = row.try_get("value")?;
                let metadata: Option<String> = row.try_get("metadata")?;
                Ok(Some(StoredEntry {
                    value,
                    metadata: Self::decode_metadata(key, metadata)?,
                }))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: &str, metadata: Option<&Value>) -> StoreResult<()> {
        let metadata = metadata.map(|m| m.to_string());
        sqlx::query(
            r#"
            INSERT INTO kv_records (key, value, metadata) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, metadata = excluded.metadata
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(metadata)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM kv_records WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list(&self, options: &ListOptions) -> StoreResult<ListPage> {
        let limit = options.effective_limit();
        let prefix = options.prefix.as_str();
        let lower = options.cursor.as_deref().unwrap_or("");

        let rows = sqlx::query(
            r#"
            SELECT key, metadata FROM kv_records
            WHERE key > ? AND substr(key, 1, ?) = ?
            ORDER BY key
            LIMIT ?
            "#,
        )
        .bind(lower)
        .bind(prefix.chars().count() as i64)
        .bind(prefix)
        .bind((limit + 1) as i64)
        .fetch_all(&self.pool)
        .await?;

        let more = rows.len() > limit;
        let mut keys = Vec::with_capacity(rows.len().min(limit));
        for row in rows.into_iter().take(limit) {
            let name: String = row.try_get("key")?;
            let metadata: Option<String> = row.try_get("metadata")?;
            let metadata = Self::decode_metadata(&name, metadata)?;
            keys.push(KeyEntry { name, metadata });
        }

        let cursor = if more {
            keys.last().map(|k| k.name.clone())
        } else {
            None
        };
        Ok(ListPage { keys, cursor })
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

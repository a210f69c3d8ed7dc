use crate::offline::error::StorageError;
use crate::offline::http::{Response, ResponseSource};
use crate::offline::storage::CacheStorage;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{FromRow, SqlitePool};
use std::collections::BTreeMap;

/// Cache storage that survives restarts.
pub struct SqliteCacheStorage {
    pool: SqlitePool,
}

#[derive(FromRow)]
struct EntryRow {
    status: i64,
    headers: String,
    body: Vec<u8>,
}

impl SqliteCacheStorage {
    /// Expects a pool on which the migrations have already run.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CacheStorage for SqliteCacheStorage {
    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM cache_partitions ORDER BY created_at, rowid")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn delete(&self, partition: &str) -> Result<bool, StorageError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM cache_entries WHERE partition = ?")
            .bind(partition)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM cache_partitions WHERE name = ?")
            .bind(partition)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn put(&self, partition: &str, url: &str, response: &Response) -> Result<(), StorageError> {
        let headers = serde_json::to_string(&response.headers)?;
        let now = Utc::now().timestamp_millis();

        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT OR IGNORE INTO cache_partitions (name, created_at) VALUES (?, ?)")
            .bind(partition)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r#"
            INSERT INTO cache_entries (partition, url, status, headers, body, stored_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (partition, url) DO UPDATE SET
                status = excluded.status,
                headers = excluded.headers,
                body = excluded.body,
                stored_at = excluded.stored_at
            "#,
        )
        .bind(partition)
        .bind(url)
        .bind(i64::from(response.status))
        .bind(headers)
        .bind(response.body.as_slice())
        .bind(now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, partition: &str, url: &str) -> Result<Option<Response>, StorageError> {
        let row: Option<EntryRow> = sqlx::query_as(
            "SELECT status, headers, body FROM cache_entries WHERE partition = ? AND url = ?",
        )
        .bind(partition)
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let headers: BTreeMap<String, String> = serde_json::from_str(&row.headers)?;
        Ok(Some(Response {
            status: u16::try_from(row.status).unwrap_or(200),
            headers,
            body: row.body,
            source: ResponseSource::Network,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[tokio::test]
    async fn test_entries_persist_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");

        {
            let storage = SqliteCacheStorage::new(db::open(&path).await.unwrap());
            let response = Response::new(200, "body").with_header("content-type", "text/css");
            storage.put("toolbox-static-v1", "http://x/app.css", &response).await.unwrap();
            storage.put("toolbox-dynamic-v1", "http://x/api/notes", &Response::new(200, "[]")).await.unwrap();
        }

        let storage = SqliteCacheStorage::new(db::open(&path).await.unwrap());
        assert_eq!(
            storage.keys().await.unwrap(),
            vec!["toolbox-static-v1", "toolbox-dynamic-v1"]
        );
        let hit = storage.match_any("http://x/app.css").await.unwrap().unwrap();
        assert_eq!(hit.text(), "body");
        assert_eq!(hit.header("content-type"), Some("text/css"));
    }

    #[tokio::test]
    async fn test_overwrite_and_delete() {
        let storage = SqliteCacheStorage::new(db::in_memory().await.unwrap());
        storage.put("p", "u", &Response::new(200, "old")).await.unwrap();
        storage.put("p", "u", &Response::new(201, "new")).await.unwrap();

        let hit = storage.get("p", "u").await.unwrap().unwrap();
        assert_eq!(hit.status, 201);
        assert_eq!(hit.text(), "new");

        assert!(storage.delete("p").await.unwrap());
        assert!(storage.get("p", "u").await.unwrap().is_none());
        assert!(storage.keys().await.unwrap().is_empty());
    }
}

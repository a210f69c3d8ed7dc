//! Persistent queue of mutations attempted while offline.
//!
//! Draining uses a lease: a drain first stamps every available entry with
//! its own token, replays only entries carrying that token, deletes them on
//! success and clears the stamp on failure. Stamps older than the lease are
//! treated as abandoned and may be claimed again.

use crate::offline::error::QueueError;
use crate::offline::http::Method;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineQueueEntry {
    pub id: i64,
    pub url: String,
    pub method: Method,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
}

/// Entries held by one drain.
#[derive(Debug)]
pub struct Claim {
    pub token: String,
    pub entries: Vec<OfflineQueueEntry>,
}

#[derive(FromRow)]
struct QueueRow {
    id: i64,
    url: String,
    method: String,
    data: String,
    created_at: i64,
    claimed_by: Option<String>,
    claimed_at: Option<i64>,
}

impl TryFrom<QueueRow> for OfflineQueueEntry {
    type Error = QueueError;

    fn try_from(row: QueueRow) -> Result<Self, Self::Error> {
        let corrupt = |reason: String| QueueError::Corrupt { id: row.id, reason };
        let method = row
            .method
            .parse::<Method>()
            .map_err(|e| corrupt(e.to_string()))?;
        let timestamp = DateTime::from_timestamp_millis(row.created_at)
            .ok_or_else(|| corrupt(format!("bad timestamp {}", row.created_at)))?;

        Ok(Self {
            id: row.id,
            url: row.url,
            method,
            data: serde_json::from_str(&row.data)?,
            timestamp,
            claimed_by: row.claimed_by,
            claimed_at: row.claimed_at.and_then(DateTime::from_timestamp_millis),
        })
    }
}

const SELECT_COLUMNS: &str =
    "SELECT id, url, method, data, created_at, claimed_by, claimed_at FROM offline_queue";

#[derive(Clone)]
pub struct OfflineQueue {
    pool: SqlitePool,
    lease: Duration,
}

impl OfflineQueue {
    pub fn new(pool: SqlitePool, lease: Duration) -> Self {
        Self { pool, lease }
    }

    pub async fn enqueue(
        &self,
        url: &str,
        method: Method,
        data: &serde_json::Value,
    ) -> Result<i64, QueueError> {
        let result = sqlx::query(
            "INSERT INTO offline_queue (url, method, data, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(url)
        .bind(method.as_str())
        .bind(serde_json::to_string(data)?)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        tracing::info!(id, url, %method, "queued offline mutation");
        Ok(id)
    }

    /// All entries in queue order, claimed or not.
    pub async fn entries(&self) -> Result<Vec<OfflineQueueEntry>, QueueError> {
        let rows: Vec<QueueRow> = sqlx::query_as(&format!("{SELECT_COLUMNS} ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(OfflineQueueEntry::try_from).collect()
    }

    pub async fn len(&self) -> Result<usize, QueueError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM offline_queue")
            .fetch_one(&self.pool)
            .await?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    pub async fn is_empty(&self) -> Result<bool, QueueError> {
        Ok(self.len().await? == 0)
    }

    /// Stamps every unclaimed or lease-expired entry with a fresh token.
    pub async fn claim(&self) -> Result<Claim, QueueError> {
        let token = Uuid::new_v4().to_string();
        let now = Utc::now().timestamp_millis();
        let expired_before = now - i64::try_from(self.lease.as_millis()).unwrap_or(i64::MAX);

        sqlx::query(
            r#"
            UPDATE offline_queue
            SET claimed_by = ?, claimed_at = ?
            WHERE claimed_by IS NULL OR claimed_at < ?
            "#,
        )
        .bind(&token)
        .bind(now)
        .bind(expired_before)
        .execute(&self.pool)
        .await?;

        let rows: Vec<QueueRow> =
            sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE claimed_by = ? ORDER BY id"))
                .bind(&token)
                .fetch_all(&self.pool)
                .await?;
        // An undecodable row must not hold the rest of the batch hostage.
        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.id;
            match OfflineQueueEntry::try_from(row) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::warn!(id, error = %e, "skipping undecodable queue entry");
                    self.release(&token, id).await?;
                }
            }
        }

        tracing::debug!(token = %token, claimed = entries.len(), "claimed offline queue entries");
        Ok(Claim { token, entries })
    }

    /// Removes an entry after the server acknowledged it.
    pub async fn complete(&self, token: &str, id: i64) -> Result<bool, QueueError> {
        let result = sqlx::query("DELETE FROM offline_queue WHERE id = ? AND claimed_by = ?")
            .bind(id)
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Hands an entry back for the next drain.
    pub async fn release(&self, token: &str, id: i64) -> Result<bool, QueueError> {
        let result = sqlx::query(
            "UPDATE offline_queue SET claimed_by = NULL, claimed_at = NULL WHERE id = ? AND claimed_by = ?",
        )
        .bind(id)
        .bind(token)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use serde_json::json;

    async fn queue(lease: Duration) -> OfflineQueue {
        OfflineQueue::new(db::in_memory().await.unwrap(), lease)
    }

    #[tokio::test]
    async fn test_enqueue_keeps_order_and_payload() {
        let queue = queue(Duration::from_secs(60)).await;
        queue.enqueue("/api/todos", Method::Post, &json!({"title": "a"})).await.unwrap();
        queue.enqueue("/api/notes/4", Method::Delete, &json!(null)).await.unwrap();

        let entries = queue.entries().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].url, "/api/todos");
        assert_eq!(entries[0].method, Method::Post);
        assert_eq!(entries[0].data, json!({"title": "a"}));
        assert_eq!(entries[1].method, Method::Delete);
        assert!(entries[0].claimed_by.is_none());
    }

    #[tokio::test]
    async fn test_second_claim_sees_nothing_while_leased() {
        let queue = queue(Duration::from_secs(60)).await;
        queue.enqueue("/api/todos", Method::Post, &json!({})).await.unwrap();

        let first = queue.claim().await.unwrap();
        let second = queue.claim().await.unwrap();
        assert_eq!(first.entries.len(), 1);
        assert!(second.entries.is_empty());

        // Only the holder may finish the entry.
        let id = first.entries[0].id;
        assert!(!queue.complete(&second.token, id).await.unwrap());
        assert!(queue.complete(&first.token, id).await.unwrap());
        assert!(queue.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_release_makes_entry_claimable_again() {
        let queue = queue(Duration::from_secs(60)).await;
        let id = queue.enqueue("/api/habits", Method::Put, &json!({"done": true})).await.unwrap();

        let first = queue.claim().await.unwrap();
        assert!(queue.release(&first.token, id).await.unwrap());

        let again = queue.claim().await.unwrap();
        assert_eq!(again.entries.len(), 1);
        assert_eq!(again.entries[0].claimed_by.as_deref(), Some(again.token.as_str()));
    }

    #[tokio::test]
    async fn test_corrupt_row_does_not_block_claim() {
        let queue = queue(Duration::from_secs(60)).await;
        queue.enqueue("/api/todos", Method::Post, &json!({"n": 1})).await.unwrap();
        sqlx::query(
            "INSERT INTO offline_queue (url, method, data, created_at) VALUES ('/api/x', 'BREW', '{}', 0)",
        )
        .execute(&queue.pool)
        .await
        .unwrap();
        queue.enqueue("/api/notes", Method::Put, &json!({"n": 2})).await.unwrap();

        let claim = queue.claim().await.unwrap();
        let urls: Vec<&str> = claim.entries.iter().map(|e| e.url.as_str()).collect();
        assert_eq!(urls, vec!["/api/todos", "/api/notes"]);

        let (claimed_by,): (Option<String>,) =
            sqlx::query_as("SELECT claimed_by FROM offline_queue WHERE method = 'BREW'")
                .fetch_one(&queue.pool)
                .await
                .unwrap();
        assert!(claimed_by.is_none());
    }

    #[tokio::test]
    async fn test_expired_lease_is_reclaimed() {
        let queue = queue(Duration::ZERO).await;
        queue.enqueue("/api/todos", Method::Post, &json!({})).await.unwrap();

        let first = queue.claim().await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = queue.claim().await.unwrap();

        assert_eq!(first.entries.len(), 1);
        assert_eq!(second.entries.len(), 1);
        assert!(!queue.complete(&first.token, first.entries[0].id).await.unwrap());
    }
}

//! Named cache partitions.
//!
//! Mirrors the browser cache-storage surface the controller relies on: open
//! by name on write, look up by URL, enumerate partition names, delete a
//! whole partition.

use crate::offline::error::StorageError;
use crate::offline::http::Response;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Partition names in creation order.
    async fn keys(&self) -> Result<Vec<String>, StorageError>;

    async fn delete(&self, partition: &str) -> Result<bool, StorageError>;

    /// Creates the partition when missing. Last writer wins.
    async fn put(&self, partition: &str, url: &str, response: &Response) -> Result<(), StorageError>;

    async fn get(&self, partition: &str, url: &str) -> Result<Option<Response>, StorageError>;

    /// Searches every partition in creation order.
    async fn match_any(&self, url: &str) -> Result<Option<Response>, StorageError> {
        for partition in self.keys().await? {
            if let Some(found) = self.get(&partition, url).await? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }
}

#[derive(Default)]
struct Partitions {
    order: Vec<String>,
    entries: HashMap<String, HashMap<String, Response>>,
    used_bytes: usize,
}

/// Process-local cache storage with an optional byte quota.
#[derive(Default)]
pub struct MemoryCacheStorage {
    inner: RwLock<Partitions>,
    quota: Option<usize>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota: usize) -> Self {
        Self {
            inner: RwLock::new(Partitions::default()),
            quota: Some(quota),
        }
    }

    pub async fn len(&self, partition: &str) -> usize {
        self.inner
            .read()
            .await
            .entries
            .get(partition)
            .map_or(0, HashMap::len)
    }
}

fn footprint(response: &Response) -> usize {
    response.body.len()
        + response
            .headers
            .iter()
            .map(|(k, v)| k.len() + v.len())
            .sum::<usize>()
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.inner.read().await.order.clone())
    }

    async fn delete(&self, partition: &str) -> Result<bool, StorageError> {
        let mut inner = self.inner.write().await;
        let Some(removed) = inner.entries.remove(partition) else {
            return Ok(false);
        };
        let freed: usize = removed.values().map(footprint).sum();
        inner.used_bytes = inner.used_bytes.saturating_sub(freed);
        inner.order.retain(|name| name != partition);
        Ok(true)
    }

    async fn put(&self, partition: &str, url: &str, response: &Response) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;

        let replaced = inner
            .entries
            .get(partition)
            .and_then(|p| p.get(url))
            .map_or(0, footprint);
        let needed = footprint(response);
        if let Some(quota) = self.quota {
            let available = quota.saturating_sub(inner.used_bytes - replaced);
            if needed > available {
                return Err(StorageError::QuotaExceeded { needed, available });
            }
        }

        if !inner.entries.contains_key(partition) {
            inner.order.push(partition.to_string());
        }
        inner
            .entries
            .entry(partition.to_string())
            .or_default()
            .insert(url.to_string(), response.clone());
        inner.used_bytes = inner.used_bytes - replaced + needed;
        Ok(())
    }

    async fn get(&self, partition: &str, url: &str) -> Result<Option<Response>, StorageError> {
        Ok(self
            .inner
            .read()
            .await
            .entries
            .get(partition)
            .and_then(|p| p.get(url))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_and_enumerate() {
        tokio_test::block_on(async {
            let storage = MemoryCacheStorage::new();
            storage
                .put("app-static-v1", "http://x/a.css", &Response::new(200, "a"))
                .await
                .unwrap();
            storage
                .put("app-dynamic-v1", "http://x/api/todos", &Response::new(200, "[]"))
                .await
                .unwrap();

            assert_eq!(storage.keys().await.unwrap(), vec!["app-static-v1", "app-dynamic-v1"]);
            let hit = storage.match_any("http://x/api/todos").await.unwrap().unwrap();
            assert_eq!(hit.text(), "[]");
            assert!(storage.get("app-static-v1", "http://x/api/todos").await.unwrap().is_none());

            assert!(storage.delete("app-static-v1").await.unwrap());
            assert!(!storage.delete("app-static-v1").await.unwrap());
            assert_eq!(storage.keys().await.unwrap(), vec!["app-dynamic-v1"]);
        });
    }

    #[test]
    fn test_quota_is_enforced_and_freed() {
        tokio_test::block_on(async {
            let storage = MemoryCacheStorage::with_quota(10);
            storage.put("p", "u1", &Response::new(200, vec![0u8; 8])).await.unwrap();

            let err = storage
                .put("p", "u2", &Response::new(200, vec![0u8; 8]))
                .await
                .unwrap_err();
            assert!(matches!(err, StorageError::QuotaExceeded { needed: 8, available: 2 }));

            // Overwriting an entry only counts the difference.
            storage.put("p", "u1", &Response::new(200, vec![0u8; 10])).await.unwrap();

            storage.delete("p").await.unwrap();
            storage.put("q", "u2", &Response::new(200, vec![0u8; 8])).await.unwrap();
            assert_eq!(storage.len("q").await, 1);
        });
    }
}

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("network request timed out after {0:?}")]
    Timeout(Duration),

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("network unreachable: {0}")]
    Unreachable(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("cache quota exceeded: need {needed} bytes, {available} available")]
    QuotaExceeded { needed: usize, available: usize },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("queue entry could not be encoded: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt queue entry {id}: {reason}")]
    Corrupt { id: i64, reason: String },
}

#[derive(Debug, Error)]
pub enum OfflineError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("install failed for {url}: {reason}")]
    Install { url: String, reason: String },
}

pub type Result<T> = std::result::Result<T, OfflineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err: OfflineError = NetworkError::Timeout(Duration::from_millis(1500)).into();
        assert_eq!(err.to_string(), "network request timed out after 1.5s");

        let quota = StorageError::QuotaExceeded {
            needed: 10,
            available: 4,
        };
        assert!(quota.to_string().contains("need 10 bytes"));

        let install = OfflineError::Install {
            url: "/manifest.json".to_string(),
            reason: "status 404".to_string(),
        };
        assert_eq!(install.to_string(), "install failed for /manifest.json: status 404");
    }
}

//! Offline cache controller: per-route caching strategies, an offline
//! fallback and a retry queue for mutations made without a connection.

pub mod config;
pub mod controller;
pub mod error;
pub mod fallback;
pub mod http;
pub mod network;
pub mod notify;
pub mod queue;
pub mod scheduler;
pub mod sqlite_storage;
pub mod storage;

pub use config::{OfflineConfig, PushDefaults};
pub use controller::{
    ControllerMessage, DrainReport, MessageReply, OfflineController, Route, WorkerState,
};
pub use error::{NetworkError, OfflineError, QueueError, StorageError};
pub use http::{Credentials, Destination, Method, Request, Response, ResponseSource};
pub use network::{HttpNetwork, Network};
pub use notify::{ClickOutcome, ClientWindow, Clients, HeadlessClients, Notification, Notifier};
pub use queue::{OfflineQueue, OfflineQueueEntry};
pub use scheduler::{OfflineScheduler, SchedulerConfig};
pub use sqlite_storage::SqliteCacheStorage;
pub use storage::{CacheStorage, MemoryCacheStorage};

use crate::offline::config::OfflineConfig;
use crate::offline::error::{NetworkError, OfflineError, Result};
use crate::offline::fallback;
use crate::offline::http::{Credentials, Destination, Method, Request, Response, ResponseSource};
use crate::offline::network::Network;
use crate::offline::notify::{
    ACTION_DISMISS, ClickOutcome, Clients, HeadlessClients, Notification, Notifier, TracingNotifier,
};
use crate::offline::queue::{OfflineQueue, OfflineQueueEntry};
use crate::offline::storage::CacheStorage;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tokio::time::timeout;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    Redundant,
}

/// How an intercepted request is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Not intercepted: non-GET, or a scheme other than http(s).
    Bypass,
    Api,
    Document,
    Asset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControllerMessage {
    SkipWaiting,
    GetVersion,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageReply {
    Ack,
    Version(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainReport {
    pub claimed: usize,
    pub replayed: usize,
    pub failed: usize,
}

/// Request-interception policy for one application origin.
pub struct OfflineController {
    config: OfflineConfig,
    origin: Url,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
    queue: OfflineQueue,
    clients: Arc<dyn Clients>,
    notifier: Arc<dyn Notifier>,
    state: RwLock<WorkerState>,
    skip_waiting: AtomicBool,
}

impl OfflineController {
    pub fn new(
        config: OfflineConfig,
        storage: Arc<dyn CacheStorage>,
        network: Arc<dyn Network>,
        queue: OfflineQueue,
    ) -> Result<Self> {
        let origin = Url::parse(&config.origin).map_err(|e| {
            OfflineError::InvalidRequest(format!("bad origin {}: {e}", config.origin))
        })?;

        Ok(Self {
            config,
            origin,
            storage,
            network,
            queue,
            clients: Arc::new(HeadlessClients::new()),
            notifier: Arc::new(TracingNotifier),
            state: RwLock::new(WorkerState::Parsed),
            skip_waiting: AtomicBool::new(false),
        })
    }

    pub fn with_clients(mut self, clients: Arc<dyn Clients>) -> Self {
        self.clients = clients;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn config(&self) -> &OfflineConfig {
        &self.config
    }

    pub fn queue(&self) -> &OfflineQueue {
        &self.queue
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    async fn set_state(&self, next: WorkerState) {
        let mut state = self.state.write().await;
        tracing::debug!(from = ?*state, to = ?next, "controller state");
        *state = next;
    }

    /// Installed but holding back until told to take over.
    pub async fn is_waiting(&self) -> bool {
        self.state().await == WorkerState::Installed && !self.skip_waiting.load(Ordering::SeqCst)
    }

    /// Install, then activate unless activation is being held back.
    pub async fn start(&self) -> Result<()> {
        self.install().await?;
        if !self.is_waiting().await {
            self.activate().await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Stores the application shell. All or nothing: one failed asset fails
    /// the install and leaves the controller redundant.
    pub async fn install(&self) -> Result<usize> {
        self.set_state(WorkerState::Installing).await;
        match self.cache_shell().await {
            Ok(count) => {
                self.skip_waiting.store(true, Ordering::SeqCst);
                self.set_state(WorkerState::Installed).await;
                tracing::info!(count, cache = %self.config.static_cache_name(), "installed application shell");
                Ok(count)
            }
            Err(e) => {
                self.set_state(WorkerState::Redundant).await;
                tracing::error!(error = %e, "install failed");
                Err(e)
            }
        }
    }

    async fn cache_shell(&self) -> Result<usize> {
        let mut requests = Vec::with_capacity(self.config.shell_manifest.len());
        for path in &self.config.shell_manifest {
            requests.push(Request::get(self.resolve(path)?.as_str())?);
        }

        let results =
            futures::future::join_all(requests.iter().map(|request| self.attempt(request))).await;

        let mut fetched = Vec::with_capacity(requests.len());
        for (request, result) in requests.iter().zip(results) {
            let url = request.cache_key();
            match result {
                Ok(response) if response.is_success() => fetched.push((url, response)),
                Ok(response) => {
                    return Err(OfflineError::Install {
                        url,
                        reason: format!("status {}", response.status),
                    });
                }
                Err(e) => {
                    return Err(OfflineError::Install {
                        url,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let static_cache = self.config.static_cache_name();
        for (url, response) in &fetched {
            if let Err(e) = self.storage.put(&static_cache, url, response).await {
                if let Err(cleanup) = self.storage.delete(&static_cache).await {
                    tracing::warn!(cache = %static_cache, error = %cleanup, "could not drop partial shell");
                }
                return Err(e.into());
            }
        }
        Ok(fetched.len())
    }

    /// Drops partitions left behind by other versions and takes control of
    /// the open windows. Returns the deleted partition names.
    pub async fn activate(&self) -> Result<Vec<String>> {
        self.set_state(WorkerState::Activating).await;

        let current = self.config.current_cache_names();
        let mut deleted = Vec::new();
        for name in self.storage.keys().await? {
            if !self.config.owns_cache(&name) || current.contains(&name) {
                continue;
            }
            if self.storage.delete(&name).await? {
                tracing::info!(cache = %name, "deleted stale cache");
                deleted.push(name);
            }
        }

        self.clients.claim().await;
        self.set_state(WorkerState::Activated).await;
        Ok(deleted)
    }

    pub async fn message(&self, message: ControllerMessage) -> MessageReply {
        match message {
            ControllerMessage::SkipWaiting => {
                self.skip_waiting.store(true, Ordering::SeqCst);
                tracing::info!("skip waiting requested");
                MessageReply::Ack
            }
            ControllerMessage::GetVersion => MessageReply::Version(self.config.cache_version.clone()),
        }
    }

    // ------------------------------------------------------------------
    // Fetch
    // ------------------------------------------------------------------

    pub fn classify(&self, request: &Request) -> Route {
        let scheme = request.url.scheme();
        if request.method != Method::Get || !(scheme == "http" || scheme == "https") {
            Route::Bypass
        } else if request.path().contains("/api/") {
            Route::Api
        } else if request.destination == Destination::Document {
            Route::Document
        } else {
            Route::Asset
        }
    }

    /// Resolves an outgoing request. Only the bypass route and non-image
    /// assets can return an error.
    pub async fn fetch(&self, request: &Request) -> Result<Response> {
        let route = self.classify(request);
        tracing::trace!(url = %request.url, ?route, "fetch");

        match route {
            Route::Bypass => Ok(self.attempt(request).await?),
            Route::Api => Ok(self.fetch_api(request).await),
            Route::Document => Ok(self.fetch_document(request).await),
            Route::Asset => self.fetch_asset(request).await,
        }
    }

    async fn fetch_api(&self, request: &Request) -> Response {
        let key = request.cache_key();
        let cacheable = self.config.is_cacheable_api(request.path());
        let dynamic_cache = self.config.dynamic_cache_name();

        match self.attempt(request).await {
            Ok(response) => {
                if cacheable && response.is_success() {
                    self.store(&dynamic_cache, &key, &response).await;
                }
                response
            }
            Err(e) => {
                tracing::warn!(url = %key, error = %e, "api request failed");
                if cacheable {
                    if let Some(cached) = self.lookup(&dynamic_cache, &key).await {
                        return fallback::mark_stale(cached);
                    }
                }
                fallback::api_unavailable()
            }
        }
    }

    async fn fetch_document(&self, request: &Request) -> Response {
        let key = request.cache_key();
        let dynamic_cache = self.config.dynamic_cache_name();

        match self.attempt(request).await {
            Ok(response) => {
                if response.is_success() {
                    self.store(&dynamic_cache, &key, &response).await;
                }
                response
            }
            Err(e) => {
                tracing::warn!(url = %key, error = %e, "navigation failed");
                if let Some(cached) = self.lookup(&dynamic_cache, &key).await {
                    return cached.with_source(ResponseSource::Cache);
                }
                if let Some(shell) = self.shell_root().await {
                    return shell.with_source(ResponseSource::Cache);
                }
                fallback::offline_page()
            }
        }
    }

    async fn fetch_asset(&self, request: &Request) -> Result<Response> {
        let key = request.cache_key();
        if let Some(cached) = self.lookup_any(&key).await {
            return Ok(cached.with_source(ResponseSource::Cache));
        }

        match self.attempt(request).await {
            Ok(response) => {
                if response.is_success() {
                    self.store(&self.config.static_cache_name(), &key, &response)
                        .await;
                }
                Ok(response)
            }
            Err(e) if request.is_image() => {
                tracing::debug!(url = %key, error = %e, "image unavailable, serving placeholder");
                Ok(fallback::image_placeholder())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn shell_root(&self) -> Option<Response> {
        let url = self.resolve(&self.config.shell_root).ok()?;
        self.lookup_any(url.as_str()).await
    }

    // ------------------------------------------------------------------
    // Background sync
    // ------------------------------------------------------------------

    pub async fn enqueue(&self, url: &str, method: Method, data: &serde_json::Value) -> Result<i64> {
        Ok(self.queue.enqueue(url, method, data).await?)
    }

    /// Handles a background-sync trigger. Unknown tags are ignored.
    pub async fn sync(&self, tag: &str) -> Result<DrainReport> {
        if tag != self.config.sync_tag {
            tracing::debug!(tag, "ignoring sync tag");
            return Ok(DrainReport::default());
        }
        self.drain_queue().await
    }

    /// Replays every claimable queue entry once.
    pub async fn drain_queue(&self) -> Result<DrainReport> {
        let claim = self.queue.claim().await?;
        let mut report = DrainReport {
            claimed: claim.entries.len(),
            ..DrainReport::default()
        };

        for entry in &claim.entries {
            match self.replay(entry).await {
                Ok(response) if response.is_success() => {
                    report.replayed += 1;
                    if let Err(e) = self.queue.complete(&claim.token, entry.id).await {
                        tracing::warn!(id = entry.id, error = %e, "replayed entry could not be removed");
                    }
                }
                outcome => {
                    report.failed += 1;
                    match outcome {
                        Ok(response) => {
                            tracing::warn!(id = entry.id, status = response.status, "replay rejected")
                        }
                        Err(e) => tracing::warn!(id = entry.id, error = %e, "replay failed"),
                    }
                    if let Err(e) = self.queue.release(&claim.token, entry.id).await {
                        tracing::warn!(id = entry.id, error = %e, "could not release queue entry");
                    }
                }
            }
        }

        if report.claimed > 0 {
            tracing::info!(
                replayed = report.replayed,
                failed = report.failed,
                "drained offline queue"
            );
        }
        Ok(report)
    }

    async fn replay(&self, entry: &OfflineQueueEntry) -> Result<Response> {
        let url = self.resolve(&entry.url)?;
        let mut request =
            Request::new(entry.method, url.as_str())?.with_credentials(Credentials::Include);
        if !entry.data.is_null() {
            request = request.with_json(&entry.data);
        }
        Ok(self.attempt(&request).await?)
    }

    /// Handles a periodic-sync trigger by refreshing the designated API
    /// response. Returns whether the cache was updated.
    pub async fn periodic_sync(&self, tag: &str) -> bool {
        if tag != self.config.periodic_sync_tag {
            tracing::debug!(tag, "ignoring periodic sync tag");
            return false;
        }
        match self.refresh(&self.config.periodic_refresh_path).await {
            Ok(updated) => updated,
            Err(e) => {
                tracing::warn!(error = %e, "periodic refresh failed");
                false
            }
        }
    }

    async fn refresh(&self, path: &str) -> Result<bool> {
        let request = Request::get(self.resolve(path)?.as_str())?;
        let response = self.attempt(&request).await?;
        if !response.is_success() {
            return Ok(false);
        }
        self.store(&self.config.dynamic_cache_name(), &request.cache_key(), &response)
            .await;
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Notifications
    // ------------------------------------------------------------------

    pub async fn push(&self, payload: Option<&[u8]>) -> Notification {
        let notification =
            Notification::from_push(payload, &self.config.push_defaults, self.origin.as_str());
        if let Err(e) = self.notifier.show(&notification).await {
            tracing::warn!(error = %e, "could not show notification");
        }
        notification
    }

    pub async fn notification_click(
        &self,
        action: Option<&str>,
        notification: &Notification,
    ) -> ClickOutcome {
        if action == Some(ACTION_DISMISS) {
            return ClickOutcome::Dismissed;
        }

        for window in self.clients.windows().await {
            if window.url == notification.url && self.clients.focus(&window.id).await {
                return ClickOutcome::Focused(window);
            }
        }
        ClickOutcome::Opened(self.clients.open_window(&notification.url).await)
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn resolve(&self, target: &str) -> Result<Url> {
        self.origin
            .join(target)
            .map_err(|e| OfflineError::InvalidRequest(format!("bad url {target}: {e}")))
    }

    /// Every network attempt goes through here and is bounded by the deadline.
    async fn attempt(&self, request: &Request) -> std::result::Result<Response, NetworkError> {
        let deadline = self.config.network_timeout;
        match timeout(deadline, self.network.fetch(request)).await {
            Ok(result) => result,
            Err(_) => Err(NetworkError::Timeout(deadline)),
        }
    }

    async fn store(&self, partition: &str, url: &str, response: &Response) {
        if let Err(e) = self.storage.put(partition, url, response).await {
            tracing::warn!(partition, url, error = %e, "cache write failed");
        }
    }

    async fn lookup(&self, partition: &str, url: &str) -> Option<Response> {
        match self.storage.get(partition, url).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(partition, url, error = %e, "cache read failed");
                None
            }
        }
    }

    async fn lookup_any(&self, url: &str) -> Option<Response> {
        match self.storage.match_any(url).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(url, error = %e, "cache read failed");
                None
            }
        }
    }
}

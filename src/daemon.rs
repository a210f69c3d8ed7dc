use crate::config::ToolboxConfig;
use crate::db;
use crate::nlp::{ParsedTask, TaskParser};
use crate::offline::{
    ControllerMessage, DrainReport, HttpNetwork, MessageReply, Method, Notification,
    OfflineController, OfflineQueue, OfflineQueueEntry, OfflineScheduler, Request, Response,
    SchedulerConfig, SqliteCacheStorage, WorkerState,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::signal;
use tokio::sync::broadcast;

// One request per connection; the client half-closes after writing it.
#[derive(Serialize, Deserialize, Debug)]
pub enum DaemonRequest {
    Parse { input: String },
    Fetch { request: Request },
    Enqueue {
        url: String,
        method: Method,
        data: serde_json::Value,
    },
    /// Background-sync trigger; `None` means the configured tag.
    Sync { tag: Option<String> },
    PeriodicSync { tag: Option<String> },
    Push { payload: Option<String> },
    Message(ControllerMessage),
    Queue,
    Health,
    Shutdown,
}

#[derive(Serialize, Deserialize, Debug)]
pub enum DaemonResponse {
    Parsed(ParsedTask),
    Fetched(Response),
    Queued { id: i64 },
    Drained(DrainReport),
    Refreshed { updated: bool },
    Notified(Notification),
    Reply(MessageReply),
    QueueEntries(Vec<OfflineQueueEntry>),
    Health {
        state: WorkerState,
        version: String,
        queued: usize,
    },
    Ok,
    Error(String),
}

/// The long-running process: one parser, one controller, one socket.
pub struct Daemon {
    socket: PathBuf,
    parser: Arc<TaskParser>,
    controller: Arc<OfflineController>,
    scheduler: SchedulerConfig,
}

impl Daemon {
    pub fn new(
        socket: PathBuf,
        parser: Arc<TaskParser>,
        controller: Arc<OfflineController>,
        scheduler: SchedulerConfig,
    ) -> Self {
        Self {
            socket,
            parser,
            controller,
            scheduler,
        }
    }

    /// Wires the production stack: SQLite storage and queue, reqwest network.
    pub async fn from_config(config: &ToolboxConfig) -> Result<Self> {
        let pool = db::open(&config.database_path)
            .await
            .with_context(|| format!("failed to open database {}", config.database_path.display()))?;

        let queue = OfflineQueue::new(pool.clone(), config.offline.queue_lease);
        let controller = OfflineController::new(
            config.offline.clone(),
            Arc::new(SqliteCacheStorage::new(pool)),
            Arc::new(HttpNetwork::default()),
            queue,
        )?;

        Ok(Self::new(
            config.socket_path.clone(),
            Arc::new(TaskParser::new(config.keywords.clone())),
            Arc::new(controller),
            config.scheduler.clone(),
        ))
    }

    /// Runs until ctrl-c or a `Shutdown` request.
    pub async fn run(self) -> Result<()> {
        let _ = std::fs::remove_file(&self.socket);
        let listener = UnixListener::bind(&self.socket)
            .with_context(|| format!("failed to bind to socket {}", self.socket.display()))?;
        tracing::info!(socket = %self.socket.display(), "daemon listening");

        // The shell may be unreachable at boot; fetches still work without it.
        if let Err(e) = self.controller.start().await {
            tracing::warn!(error = %e, "controller did not finish starting");
        }
        let scheduler = OfflineScheduler::start(self.controller.clone(), &self.scheduler);

        let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);

        let signal_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            signal::ctrl_c().await.ok();
            tracing::info!("interrupt received");
            let _ = signal_tx.send(());
        });

        let handler = Handler {
            parser: self.parser.clone(),
            controller: self.controller.clone(),
            shutdown_tx: shutdown_tx.clone(),
        };

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, _)) => {
                            let handler = handler.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handler.serve(stream).await {
                                    tracing::warn!(error = %e, "client error");
                                }
                            });
                        }
                        Err(e) => tracing::warn!(error = %e, "accept error"),
                    }
                }

                _ = shutdown_rx.recv() => {
                    tracing::info!("shutting down");
                    break;
                }
            }
        }

        scheduler.shutdown().await?;
        let _ = std::fs::remove_file(&self.socket);
        Ok(())
    }
}

#[derive(Clone)]
struct Handler {
    parser: Arc<TaskParser>,
    controller: Arc<OfflineController>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Handler {
    async fn serve(&self, mut stream: UnixStream) -> Result<()> {
        let mut buffer = Vec::new();
        stream
            .read_to_end(&mut buffer)
            .await
            .context("failed to read from socket")?;
        if buffer.is_empty() {
            return Ok(());
        }

        let (response, stop) = match serde_json::from_slice::<DaemonRequest>(&buffer) {
            Ok(DaemonRequest::Shutdown) => (DaemonResponse::Ok, true),
            Ok(request) => (self.handle(request).await, false),
            Err(e) => (DaemonResponse::Error(format!("bad request: {e}")), false),
        };

        let response_bytes = serde_json::to_vec(&response)?;
        stream
            .write_all(&response_bytes)
            .await
            .context("failed to write response")?;
        stream.shutdown().await?;

        if stop {
            let _ = self.shutdown_tx.send(());
        }
        Ok(())
    }

    async fn handle(&self, request: DaemonRequest) -> DaemonResponse {
        let controller = &self.controller;
        match request {
            DaemonRequest::Parse { input } => DaemonResponse::Parsed(self.parser.parse(&input)),

            DaemonRequest::Fetch { request } => match controller.fetch(&request).await {
                Ok(response) => DaemonResponse::Fetched(response),
                Err(e) => DaemonResponse::Error(e.to_string()),
            },

            DaemonRequest::Enqueue { url, method, data } => {
                match controller.enqueue(&url, method, &data).await {
                    Ok(id) => DaemonResponse::Queued { id },
                    Err(e) => DaemonResponse::Error(e.to_string()),
                }
            }

            DaemonRequest::Sync { tag } => {
                let tag = tag.unwrap_or_else(|| controller.config().sync_tag.clone());
                match controller.sync(&tag).await {
                    Ok(report) => DaemonResponse::Drained(report),
                    Err(e) => DaemonResponse::Error(e.to_string()),
                }
            }

            DaemonRequest::PeriodicSync { tag } => {
                let tag = tag.unwrap_or_else(|| controller.config().periodic_sync_tag.clone());
                DaemonResponse::Refreshed {
                    updated: controller.periodic_sync(&tag).await,
                }
            }

            DaemonRequest::Push { payload } => DaemonResponse::Notified(
                controller
                    .push(payload.as_deref().map(str::as_bytes))
                    .await,
            ),

            DaemonRequest::Message(message) => DaemonResponse::Reply(controller.message(message).await),

            DaemonRequest::Queue => match controller.queue().entries().await {
                Ok(entries) => DaemonResponse::QueueEntries(entries),
                Err(e) => DaemonResponse::Error(e.to_string()),
            },

            DaemonRequest::Health => match controller.queue().len().await {
                Ok(queued) => DaemonResponse::Health {
                    state: controller.state().await,
                    version: controller.config().cache_version.clone(),
                    queued,
                },
                Err(e) => DaemonResponse::Error(e.to_string()),
            },

            DaemonRequest::Shutdown => DaemonResponse::Ok,
        }
    }
}

/// Sends one request to the daemon listening on `socket`.
pub async fn send_to_daemon(socket: &Path, request: &DaemonRequest) -> Result<DaemonResponse> {
    if !socket.exists() {
        anyhow::bail!("daemon not running (no socket at {})", socket.display());
    }

    let mut stream = UnixStream::connect(socket)
        .await
        .context("failed to connect to daemon")?;

    let request_bytes = serde_json::to_vec(request)?;
    stream.write_all(&request_bytes).await?;
    stream.shutdown().await?;

    let mut buffer = Vec::new();
    stream.read_to_end(&mut buffer).await?;

    let response: DaemonResponse =
        serde_json::from_slice(&buffer).context("failed to decode daemon response")?;
    Ok(response)
}

pub async fn is_daemon_running(socket: &Path) -> bool {
    matches!(
        send_to_daemon(socket, &DaemonRequest::Health).await,
        Ok(DaemonResponse::Health { .. })
    )
}

pub async fn stop_daemon(socket: &Path) -> Result<()> {
    match send_to_daemon(socket, &DaemonRequest::Shutdown).await? {
        DaemonResponse::Ok => Ok(()),
        other => anyhow::bail!("unexpected reply to shutdown: {other:?}"),
    }
}

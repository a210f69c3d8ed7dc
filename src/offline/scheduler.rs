use crate::offline::config::millis;
use crate::offline::controller::OfflineController;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Duration, interval};

/// Floor for both trigger intervals; `interval` rejects a zero period.
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Which background triggers run, and how often.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub sync_enabled: bool,
    #[serde(with = "millis")]
    pub sync_interval: Duration,
    pub periodic_sync_enabled: bool,
    #[serde(with = "millis")]
    pub periodic_sync_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sync_enabled: true,
            sync_interval: Duration::from_secs(60),
            periodic_sync_enabled: true,
            periodic_sync_interval: Duration::from_secs(15 * 60),
        }
    }
}

/// Handle for the background trigger loops.
pub struct OfflineScheduler {
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<Result<()>>>,
}

impl OfflineScheduler {
    pub fn start(controller: Arc<OfflineController>, config: &SchedulerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let mut tasks = Vec::new();

        if config.sync_enabled {
            let shutdown_rx = shutdown_tx.subscribe();
            let controller = controller.clone();
            let every = config.sync_interval.max(MIN_INTERVAL);

            tasks.push(tokio::spawn(async move {
                sync_worker(controller, shutdown_rx, every).await
            }));
        }

        if config.periodic_sync_enabled {
            let shutdown_rx = shutdown_tx.subscribe();
            let controller = controller.clone();
            let every = config.periodic_sync_interval.max(MIN_INTERVAL);

            tasks.push(tokio::spawn(async move {
                periodic_sync_worker(controller, shutdown_rx, every).await
            }));
        }

        tracing::info!(workers = tasks.len(), "scheduler started");
        Self { shutdown_tx, tasks }
    }

    pub fn worker_count(&self) -> usize {
        self.tasks.len()
    }

    /// Stops every loop, waiting at most five seconds.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown_tx.send(());

        let results = tokio::time::timeout(
            Duration::from_secs(5),
            futures::future::join_all(self.tasks),
        )
        .await;

        match results {
            Ok(results) => {
                for result in results {
                    match result {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => tracing::error!(error = %e, "scheduler worker failed"),
                        Err(e) => tracing::error!(error = %e, "scheduler worker panicked"),
                    }
                }
            }
            Err(_) => {
                tracing::warn!("scheduler shutdown timed out, some workers may still be running");
            }
        }

        Ok(())
    }
}

async fn sync_worker(
    controller: Arc<OfflineController>,
    mut shutdown_rx: broadcast::Receiver<()>,
    every: Duration,
) -> Result<()> {
    let tag = controller.config().sync_tag.clone();
    tracing::debug!(%tag, interval_ms = every.as_millis() as u64, "sync worker started");
    let mut ticks = interval(every);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,

            _ = ticks.tick() => {
                if let Err(e) = controller.sync(&tag).await {
                    tracing::warn!(error = %e, "background sync failed");
                }
            }
        }
    }

    tracing::debug!("sync worker stopped");
    Ok(())
}

async fn periodic_sync_worker(
    controller: Arc<OfflineController>,
    mut shutdown_rx: broadcast::Receiver<()>,
    every: Duration,
) -> Result<()> {
    let tag = controller.config().periodic_sync_tag.clone();
    let mut ticks = interval(every);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,

            _ = ticks.tick() => {
                let updated = controller.periodic_sync(&tag).await;
                tracing::debug!(updated, "periodic refresh");
            }
        }
    }

    Ok(())
}

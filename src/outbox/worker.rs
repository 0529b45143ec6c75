//! Outbox Worker
//!
//! Background drainer that hands committed outbox rows to a
//! [`TaskDistributor`]. Each drain runs in its own transaction and locks its
//! batch with `FOR UPDATE SKIP LOCKED`, so several workers can share a table.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::distributor::TaskDistributor;
use crate::config::OutboxConfig;
use crate::ledger::{LedgerError, PgStore};

/// Configuration for the outbox worker
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How often to poll for undelivered tasks
    pub poll_interval: Duration,
    /// Maximum tasks handed over per drain
    pub batch_size: i64,
    /// Tasks that failed this many times are left for manual inspection
    pub max_attempts: i32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            batch_size: 100,
            max_attempts: 25,
        }
    }
}

impl From<&OutboxConfig> for WorkerConfig {
    fn from(config: &OutboxConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            batch_size: config.batch_size,
            max_attempts: config.max_attempts,
        }
    }
}

/// Outcome of one drain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub dispatched: usize,
    pub failed: usize,
}

pub struct OutboxWorker {
    store: PgStore,
    distributor: Arc<dyn TaskDistributor>,
    config: WorkerConfig,
}

impl OutboxWorker {
    pub fn new(store: PgStore, distributor: Arc<dyn TaskDistributor>, config: WorkerConfig) -> Self {
        Self {
            store,
            distributor,
            config,
        }
    }

    /// Poll until `shutdown` flips to `true` or its sender is dropped
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            distributor = self.distributor.name(),
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            batch_size = self.config.batch_size,
            "Starting outbox worker"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.drain_once().await {
                Ok(report) if report.dispatched + report.failed > 0 => {
                    info!(
                        dispatched = report.dispatched,
                        failed = report.failed,
                        "Outbox drained"
                    );
                }
                Ok(_) => debug!("No pending outbox tasks"),
                Err(e) => error!(error = %e, retryable = e.is_retryable(), "Outbox drain failed"),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Outbox worker stopped");
    }

    /// Deliver one batch of pending tasks
    pub async fn drain_once(&self) -> Result<DrainReport, LedgerError> {
        let distributor = Arc::clone(&self.distributor);
        let batch_size = self.config.batch_size;
        let max_attempts = self.config.max_attempts;

        self.store
            .exec_tx(move |q| {
                Box::pin(async move {
                    let tasks = q.fetch_pending_tasks(batch_size, max_attempts).await?;
                    let mut report = DrainReport::default();

                    for task in &tasks {
                        match distributor.distribute(task).await {
                            Ok(()) => {
                                q.mark_task_dispatched(task.id).await?;
                                report.dispatched += 1;
                            }
                            Err(e) => {
                                warn!(
                                    task_id = task.id,
                                    task_type = %task.task_type,
                                    attempts = task.attempts + 1,
                                    error = %e,
                                    "Task dispatch failed"
                                );
                                q.record_task_failure(task.id, &format!("{e:#}")).await?;
                                report.failed += 1;
                            }
                        }
                    }

                    Ok(report)
                })
            })
            .await
    }
}

//! Task distribution seam
//!
//! The outbox worker hands committed tasks to a [`TaskDistributor`]. Real
//! implementations push to an external queue; that queue is outside the
//! ledger.

use async_trait::async_trait;
use tracing::info;

use super::task::PendingTask;

/// Delivers one outbox task to an external queue.
///
/// Delivery is at-least-once: a task whose dispatch mark fails to commit is
/// handed over again on the next drain, so consumers must tolerate repeats.
#[async_trait]
pub trait TaskDistributor: Send + Sync {
    /// Get distributor name for logging
    fn name(&self) -> &'static str;

    async fn distribute(&self, task: &PendingTask) -> anyhow::Result<()>;
}

/// Distributor that only logs each task
pub struct LogDistributor;

#[async_trait]
impl TaskDistributor for LogDistributor {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn distribute(&self, task: &PendingTask) -> anyhow::Result<()> {
        info!(
            task_id = task.id,
            task_type = %task.task_type,
            queue = %task.queue,
            payload = %task.payload,
            "Enqueued task"
        );
        Ok(())
    }
}

//! Periodic validity sweep.

use std::sync::Arc;
use std::time::Duration;

use agentroom_protocols::TaskId;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::registry::TaskRegistry;

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Tasks whose channel was asked.
    pub checked: usize,
    /// Tasks cleaned up.
    pub removed: Vec<TaskId>,
    /// Tasks removed from the registry whose resource could not be destroyed.
    pub failed: Vec<TaskId>,
}

/// Asks every tracked task's channel whether the task is still valid and
/// cleans up the ones that are not.
pub struct Reconciler {
    registry: Arc<TaskRegistry>,
    interval: Duration,
}

impl Reconciler {
    pub fn new(registry: Arc<TaskRegistry>, interval: Duration) -> Self {
        Self { registry, interval }
    }

    /// Run a single sweep.
    pub async fn reconcile_once(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        for (task_id, channel) in self.registry.tracked() {
            report.checked += 1;
            if channel.is_valid(&task_id).await {
                continue;
            }

            info!("Task {} is no longer valid on {}, cleaning up", task_id, channel.id());
            match self.registry.cleanup(&task_id).await {
                Ok(()) => report.removed.push(task_id),
                Err(e) => {
                    error!("Cleanup of {} failed: {}", task_id, e);
                    report.failed.push(task_id);
                }
            }
        }

        report
    }

    /// Sweep every interval until `shutdown` fires. The first sweep runs
    /// one interval after the call.
    pub async fn run(self, shutdown: CancellationToken) {
        info!("Reconciler started (every {:?})", self.interval);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {
                    let report = self.reconcile_once().await;
                    debug!(
                        "Reconciled {} tasks, removed {}",
                        report.checked,
                        report.removed.len()
                    );
                }
            }
        }

        info!("Reconciler stopped");
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

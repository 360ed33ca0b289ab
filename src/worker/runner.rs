use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::queue::{ClaimedJob, JobQueue};
use crate::worker::executor::CommandExecutor;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(300);

/// A single worker draining the queue.
///
/// Each worker owns its own queue handle (and therefore its own file
/// descriptors), so workers in the same process exclude each other through
/// the per-job locks exactly like workers in separate processes do.
pub struct Worker {
    id: usize,
    queue: JobQueue,
    executor: CommandExecutor,
    poll_interval: Duration,
}

impl Worker {
    pub fn new(id: usize, queue: JobQueue) -> Self {
        Self {
            id,
            queue,
            executor: CommandExecutor::new(DEFAULT_EXECUTION_TIMEOUT),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.executor = CommandExecutor::new(timeout);
        self
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// Cancellation is observed at the poll boundary only: an in-flight
    /// attempt always runs to completion and has its outcome recorded
    /// before the worker exits. The idle sleep is interruptible so shutdown
    /// does not wait out the poll interval.
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(worker_id = self.id, "Worker started");

        match self.queue.recover_stale() {
            Ok(0) => {}
            Ok(count) => {
                tracing::info!(worker_id = self.id, count, "Recovered abandoned jobs");
            }
            Err(err) => {
                tracing::error!(worker_id = self.id, error = %err, "Recovery sweep failed");
            }
        }

        while !shutdown.is_cancelled() {
            match self.queue.claim_next() {
                Ok(Some(claimed)) => self.process(claimed).await,
                Ok(None) => {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.poll_interval) => {}
                    }
                }
                Err(err) => {
                    tracing::error!(worker_id = self.id, error = %err, "Failed to poll queue");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.poll_interval) => {}
                    }
                }
            }
        }

        tracing::info!(worker_id = self.id, "Worker stopped");
    }

    async fn process(&self, claimed: ClaimedJob) {
        let job_id = claimed.job.id.clone();
        let result = self
            .executor
            .execute(&job_id, &claimed.job.command)
            .await;

        let settled = if result.success {
            self.queue.mark_succeeded(claimed).map(drop)
        } else {
            let error = result
                .error
                .unwrap_or_else(|| "Execution failed".to_string());
            self.queue.mark_failed(claimed, error).map(drop)
        };

        if let Err(err) = settled {
            // The on-disk state may be stale now; the next claim cycle or a
            // recovery sweep resolves it.
            tracing::error!(
                worker_id = self.id,
                job_id = %job_id,
                error = %err,
                "Failed to record job outcome"
            );
        }
    }
}

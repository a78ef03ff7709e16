use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, info};

use tradepost_core::domain::task::{PipelineTask, TaskState};
use tradepost_db::repositories::{PipelineQueueRepository, RepositoryError};

/// How many runnable tasks a worker scans per poll before giving up the
/// round. Claims race under load, so a worker tries a few candidates.
const CLAIM_BATCH: u32 = 8;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_delay_secs: u64,
    pub max_delay_secs: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self { base_delay_secs: 30, max_delay_secs: 3_600 }
    }
}

impl BackoffPolicy {
    /// Exponential in the number of completed attempts, capped.
    fn delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(16);
        let multiplier = 1_u64 << exponent;
        let delay_secs = self.base_delay_secs.saturating_mul(multiplier).min(self.max_delay_secs);
        Duration::seconds(delay_secs as i64)
    }
}

/// Claim/complete/fail surface over the durable task table. State
/// transitions go through here so the backoff and terminal-failure rules
/// live in one place.
pub struct TaskQueue {
    tasks: Arc<dyn PipelineQueueRepository>,
    backoff: BackoffPolicy,
}

impl TaskQueue {
    pub fn new(tasks: Arc<dyn PipelineQueueRepository>, backoff: BackoffPolicy) -> Self {
        Self { tasks, backoff }
    }

    /// Claims the next runnable task for `worker`, or `None` when the
    /// queue is drained. Losing a claim race moves on to the next
    /// candidate.
    pub async fn claim_next(&self, worker: &str) -> Result<Option<PipelineTask>, RepositoryError> {
        let now = Utc::now();
        let candidates = self.tasks.list_runnable(now, CLAIM_BATCH).await?;
        for candidate in candidates {
            if self.tasks.claim(&candidate.id, worker, now).await? {
                debug!(
                    event_name = "pipeline.task_claimed",
                    task_id = %candidate.id.0,
                    worker,
                    "claimed pipeline task"
                );
                return self.tasks.find_by_id(&candidate.id).await;
            }
        }
        Ok(None)
    }

    pub async fn complete(&self, mut task: PipelineTask) -> Result<(), RepositoryError> {
        task.state = TaskState::Completed;
        task.updated_at = Utc::now();
        self.tasks.save(task).await
    }

    /// Failed attempt: retryable with backoff until attempts run out,
    /// terminal after that.
    pub async fn fail(&self, mut task: PipelineTask, error: &str) -> Result<(), RepositoryError> {
        let now = Utc::now();
        task.last_error = Some(error.to_string());
        task.claimed_by = None;
        task.claimed_at = None;
        task.updated_at = now;

        if task.attempts_exhausted() {
            task.state = TaskState::FailedTerminal;
            info!(
                event_name = "pipeline.task_failed_terminal",
                task_id = %task.id.0,
                attempts = task.attempts,
                error,
                "task attempts exhausted"
            );
        } else {
            task.state = TaskState::RetryableFailed;
            task.run_after = now + self.backoff.delay(task.attempts);
            debug!(
                event_name = "pipeline.task_retry_scheduled",
                task_id = %task.id.0,
                attempts = task.attempts,
                run_after = %task.run_after,
                error,
                "task scheduled for retry"
            );
        }

        self.tasks.save(task).await
    }

    /// Requeues tasks whose claim has outlived `stale_after`; run at
    /// startup to pick up work orphaned by a crashed worker.
    pub async fn recover_stale(&self, stale_after: Duration) -> Result<u64, RepositoryError> {
        let cutoff = Utc::now() - stale_after;
        let recovered = self.tasks.recover_stale(cutoff).await?;
        if recovered > 0 {
            info!(
                event_name = "pipeline.stale_tasks_recovered",
                recovered,
                "requeued stale running tasks"
            );
        }
        Ok(recovered)
    }
}

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use tradepost_core::domain::task::PipelineTask;

use crate::queue::TaskQueue;

/// A handler failure fails the task attempt; the queue decides between
/// retry and terminal.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct TaskFailure(pub String);

#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &PipelineTask) -> Result<(), TaskFailure>;
}

/// Bounded pool of pollers over the durable queue. Workers are
/// independent; there is no ordering guarantee across messages.
pub struct WorkerPool {
    queue: Arc<TaskQueue>,
    handler: Arc<dyn TaskHandler>,
    workers: u32,
    poll_interval: Duration,
}

impl WorkerPool {
    pub fn new(
        queue: Arc<TaskQueue>,
        handler: Arc<dyn TaskHandler>,
        workers: u32,
        poll_interval: Duration,
    ) -> Self {
        Self { queue, handler, workers: workers.max(1), poll_interval }
    }

    pub fn spawn(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        (0..self.workers)
            .map(|index| {
                let queue = self.queue.clone();
                let handler = self.handler.clone();
                let poll_interval = self.poll_interval;
                let shutdown = shutdown.clone();
                let name = format!("worker-{index}");
                tokio::spawn(run_worker(queue, handler, name, poll_interval, shutdown))
            })
            .collect()
    }
}

async fn run_worker(
    queue: Arc<TaskQueue>,
    handler: Arc<dyn TaskHandler>,
    name: String,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        match queue.claim_next(&name).await {
            Ok(Some(task)) => {
                let task_id = task.id.0.clone();
                match handler.handle(&task).await {
                    Ok(()) => {
                        if let Err(error) = queue.complete(task).await {
                            warn!(
                                event_name = "pipeline.task_complete_failed",
                                task_id,
                                worker = %name,
                                error = %error,
                                "could not mark task completed"
                            );
                        }
                    }
                    Err(failure) => {
                        if let Err(error) = queue.fail(task, &failure.0).await {
                            warn!(
                                event_name = "pipeline.task_fail_write_failed",
                                task_id,
                                worker = %name,
                                error = %error,
                                "could not record task failure"
                            );
                        }
                    }
                }
            }
            Ok(None) => {
                wait_for_work(poll_interval, &mut shutdown).await;
            }
            Err(error) => {
                warn!(
                    event_name = "pipeline.claim_failed",
                    worker = %name,
                    error = %error,
                    "queue poll failed; backing off one interval"
                );
                wait_for_work(poll_interval, &mut shutdown).await;
            }
        }
    }

    debug!(worker = %name, "worker stopped");
}

async fn wait_for_work(poll_interval: Duration, shutdown: &mut watch::Receiver<bool>) {
    tokio::select! {
        _ = tokio::time::sleep(poll_interval) => {}
        _ = shutdown.changed() => {}
    }
}

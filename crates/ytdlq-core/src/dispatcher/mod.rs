//! Dispatcher: the polling worker-pool loop.
//!
//! Alternates between two states until cancelled:
//!
//! - **Polling**: fetch up to `worker_num` tasks, oldest first. An empty queue
//!   sleeps for `poll_interval`; a store error backs off per the retry policy.
//! - **Dispatching**: run every task of the batch, each holding one worker
//!   slot, and wait for the whole batch before polling again.
//!
//! Cancellation is observed at the poll boundary and during every sleep. An
//! in-flight batch is not abandoned: the runners see the same token, stop
//! their processes, and the batch drains before the loop exits.

mod execute;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::retry::{RetryDecision, RetryPolicy};
use crate::runner::JobRunner;
use crate::store::{QueueDb, Task};

use execute::execute_one;

/// Idle sleep between polls of an empty queue.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    /// Worker slots, i.e. external jobs running at once.
    pub worker_num: usize,
    pub poll_interval: Duration,
    /// Backoff for failed polls.
    pub retry: RetryPolicy,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            worker_num: 1,
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry: RetryPolicy::default(),
        }
    }
}

pub struct Dispatcher {
    db: QueueDb,
    runner: Arc<dyn JobRunner>,
    settings: DispatcherSettings,
    cancel: CancellationToken,
}

impl Dispatcher {
    pub fn new(
        db: QueueDb,
        runner: Arc<dyn JobRunner>,
        settings: DispatcherSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            db,
            runner,
            settings,
            cancel,
        }
    }

    /// Run until cancelled. Returns an error only when polling has failed
    /// more times in a row than the retry policy allows.
    pub async fn run(self) -> Result<()> {
        let worker_num = self.settings.worker_num.max(1);
        let slots = Arc::new(Semaphore::new(worker_num));
        let mut failures = 0u32;
        tracing::info!(worker_num, "dispatcher started");

        while !self.cancel.is_cancelled() {
            let batch = match self.db.pop_batch(worker_num).await {
                Ok(batch) => {
                    failures = 0;
                    batch
                }
                Err(e) => {
                    failures += 1;
                    match self.settings.retry.decide(failures) {
                        RetryDecision::GiveUp => {
                            tracing::error!(failures, "polling the queue failed, giving up: {}", e);
                            return Err(e);
                        }
                        RetryDecision::RetryAfter(delay) => {
                            tracing::warn!(failures, ?delay, "polling the queue failed: {}", e);
                            self.pause(delay).await;
                            continue;
                        }
                    }
                }
            };

            if batch.is_empty() {
                self.pause(self.settings.poll_interval).await;
                continue;
            }

            self.dispatch_batch(batch, &slots).await;
        }

        tracing::info!("dispatcher stopped");
        Ok(())
    }

    /// Run one batch to completion. Every task takes a slot for the duration
    /// of its run; this returns only after all of them have finished.
    async fn dispatch_batch(&self, batch: Vec<Task>, slots: &Arc<Semaphore>) {
        tracing::debug!(size = batch.len(), "dispatching batch");
        let mut workers = JoinSet::new();
        for task in batch {
            let slots = Arc::clone(slots);
            let db = self.db.clone();
            let runner = Arc::clone(&self.runner);
            let cancel = self.cancel.clone();
            workers.spawn(async move {
                let Ok(_slot) = slots.acquire_owned().await else {
                    return;
                };
                execute_one(&db, runner.as_ref(), task, cancel).await;
            });
        }
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!("worker task aborted: {}", e);
            }
        }
    }

    /// Sleep for `delay` or until cancelled, whichever comes first.
    async fn pause(&self, delay: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = self.cancel.cancelled() => {}
        }
    }
}

#[cfg(test)]
mod tests;

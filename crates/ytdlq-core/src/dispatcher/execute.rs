//! One job: mark started, run, record the outcome.

use tokio_util::sync::CancellationToken;

use crate::runner::{JobRunner, RunOutcome};
use crate::store::{QueueDb, Task};

/// Run `task` and settle it in the store:
///
/// | run result                 | store transition                  |
/// |----------------------------|-----------------------------------|
/// | `Succeeded`                | `finish` (row removed)            |
/// | `Failed`, `TimedOut`       | `fail` (moved to `failed_tasks`)  |
/// | runner error               | `fail`                            |
/// | `Cancelled` (shutdown)     | `clear_started`, stays queued     |
///
/// Store errors while settling are logged; the task then remains active and
/// is picked up again by a later poll.
pub(super) async fn execute_one(
    db: &QueueDb,
    runner: &dyn JobRunner,
    task: Task,
    cancel: CancellationToken,
) {
    let key = task.key();
    if cancel.is_cancelled() {
        return;
    }
    let task = match db.mark_started(&task).await {
        Ok(task) => task,
        Err(e) => {
            tracing::warn!(task = %key, "could not mark task started: {}", e);
            return;
        }
    };
    tracing::info!(task = %key, url = %task.url, "job started");

    let settled = match runner.run(&task, cancel).await {
        Ok(RunOutcome::Succeeded) => {
            tracing::info!(task = %key, "job finished");
            db.finish(&task).await
        }
        Ok(RunOutcome::Cancelled) => {
            tracing::info!(task = %key, "job interrupted by shutdown, left queued");
            db.clear_started(&task).await
        }
        Ok(outcome) => {
            tracing::warn!(task = %key, ?outcome, "job failed");
            db.fail(&task).await.map(|_| ())
        }
        Err(e) => {
            tracing::warn!(task = %key, "job could not run: {}", e);
            db.fail(&task).await.map(|_| ())
        }
    };
    if let Err(e) = settled {
        tracing::error!(task = %key, "could not record job outcome: {}", e);
    }
}

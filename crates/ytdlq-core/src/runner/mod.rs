//! Process runner: executes one task through the external downloader.
//!
//! The runner only reports how the process ended. Deciding whether that
//! finishes or fails the task is the dispatcher's job.

mod args;
mod process;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::store::Task;

pub use args::build_args;
pub use process::ProcessRunner;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Process exited with status 0.
    Succeeded,
    /// Process exited non-zero, or was killed by a signal (`code` is None).
    Failed { code: Option<i32> },
    /// Process was killed after exceeding the job deadline.
    TimedOut,
    /// Shutdown was requested and the process did not complete in time.
    Cancelled,
}

/// Executes a single task to completion.
///
/// `cancel` is triggered when the engine shuts down; implementations should
/// stop promptly and return `RunOutcome::Cancelled`.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, task: &Task, cancel: CancellationToken) -> Result<RunOutcome>;
}

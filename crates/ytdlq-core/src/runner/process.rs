//! `JobRunner` backed by a real external downloader process.

use async_trait::async_trait;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

use super::args::build_args;
use super::{JobRunner, RunOutcome};
use crate::error::{QueueError, Result};
use crate::store::Task;

/// Runs the downloader with stdout and stderr appended to `<log_directory>/<id>.log`.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    downloader: PathBuf,
    encoder: Option<PathBuf>,
    log_directory: PathBuf,
    timeout: Option<Duration>,
    grace: Duration,
}

enum Waited {
    Exited(io::Result<ExitStatus>),
    Deadline,
    Cancelled,
}

impl ProcessRunner {
    pub fn new(downloader: impl Into<PathBuf>, log_directory: impl Into<PathBuf>) -> Self {
        Self {
            downloader: downloader.into(),
            encoder: None,
            log_directory: log_directory.into(),
            timeout: None,
            grace: Duration::from_secs(10),
        }
    }

    /// Encoder passed via `--ffmpeg-location`. An empty path leaves the flag out.
    pub fn with_encoder(mut self, encoder: impl Into<PathBuf>) -> Self {
        let encoder = encoder.into();
        self.encoder = (!encoder.as_os_str().is_empty()).then_some(encoder);
        self
    }

    /// Kill a run that is still going after `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Time a run gets to exit after shutdown is requested before it is killed.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// `<log_directory>/<id>.log`. Characters that would leave the directory
    /// are replaced, so rows stored before ids were validated stay contained.
    pub fn log_path(&self, task: &Task) -> PathBuf {
        self.log_directory.join(log_file_name(&task.id))
    }

    fn open_log(&self, path: &Path) -> Result<(fs::File, fs::File)> {
        let log_error = |source| QueueError::Log {
            path: path.to_path_buf(),
            source,
        };
        fs::create_dir_all(&self.log_directory).map_err(log_error)?;
        let stdout = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(log_error)?;
        let stderr = stdout.try_clone().map_err(log_error)?;
        Ok((stdout, stderr))
    }

    async fn spawn(&self, task: &Task, log_path: &Path) -> Result<Child> {
        let (stdout, stderr) = self.open_log(log_path)?;
        let mut cmd = Command::new(&self.downloader);
        cmd.args(build_args(task, self.encoder.as_deref()))
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true);
        // The command owns the log handles; they are released when it drops
        // at the end of this scope whether or not the spawn succeeded.
        match cmd.spawn() {
            Ok(child) => Ok(child),
            Err(source) => {
                append_trailer(
                    log_path,
                    &format!("failed to start {}: {source}", self.downloader.display()),
                )
                .await;
                Err(QueueError::Process {
                    program: self.downloader.clone(),
                    source,
                })
            }
        }
    }

    async fn wait_or_cancel(&self, child: &mut Child, cancel: &CancellationToken) -> Waited {
        let deadline = async {
            match self.timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            status = child.wait() => Waited::Exited(status),
            _ = deadline => Waited::Deadline,
            _ = cancel.cancelled() => Waited::Cancelled,
        }
    }

    fn process_error(&self, source: io::Error) -> QueueError {
        QueueError::Process {
            program: self.downloader.clone(),
            source,
        }
    }
}

#[async_trait]
impl JobRunner for ProcessRunner {
    async fn run(&self, task: &Task, cancel: CancellationToken) -> Result<RunOutcome> {
        let log_path = self.log_path(task);
        if cancel.is_cancelled() {
            return Ok(RunOutcome::Cancelled);
        }
        let mut child = self.spawn(task, &log_path).await?;
        tracing::debug!(task = %task.key(), pid = ?child.id(), log = %log_path.display(), "downloader started");

        let outcome = match self.wait_or_cancel(&mut child, &cancel).await {
            Waited::Exited(status) => {
                let status = status.map_err(|e| self.process_error(e))?;
                exit_outcome(status)
            }
            Waited::Deadline => {
                child.kill().await.map_err(|e| self.process_error(e))?;
                RunOutcome::TimedOut
            }
            Waited::Cancelled => {
                request_terminate(&child);
                match tokio::time::timeout(self.grace, child.wait()).await {
                    Ok(Ok(status)) if status.success() => RunOutcome::Succeeded,
                    Ok(Ok(_)) => RunOutcome::Cancelled,
                    Ok(Err(e)) => return Err(self.process_error(e)),
                    Err(_) => {
                        child.kill().await.map_err(|e| self.process_error(e))?;
                        RunOutcome::Cancelled
                    }
                }
            }
        };

        match outcome {
            RunOutcome::Succeeded => {}
            RunOutcome::Failed { code } => {
                let code = code.map_or_else(|| "a signal".to_string(), |c| format!("status {c}"));
                append_trailer(
                    &log_path,
                    &format!("{} exited with {code}", self.downloader.display()),
                )
                .await;
            }
            RunOutcome::TimedOut => {
                let secs = self.timeout.map(|t| t.as_secs()).unwrap_or_default();
                append_trailer(&log_path, &format!("killed after the {secs}s job timeout")).await;
            }
            RunOutcome::Cancelled => {
                append_trailer(&log_path, "interrupted by shutdown").await;
            }
        }
        tracing::debug!(task = %task.key(), ?outcome, "downloader finished");
        Ok(outcome)
    }
}

fn log_file_name(id: &str) -> String {
    let name: String = id
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
        .collect();
    match name.as_str() {
        "" | "." | ".." => format!("_{name}.log"),
        _ => format!("{name}.log"),
    }
}

fn exit_outcome(status: ExitStatus) -> RunOutcome {
    if status.success() {
        RunOutcome::Succeeded
    } else {
        RunOutcome::Failed {
            code: status.code(),
        }
    }
}

/// Ask the child to exit (SIGTERM) so the downloader can clean up partial files.
#[cfg(unix)]
fn request_terminate(child: &Child) {
    if let Some(pid) = child.id().and_then(|p| libc::pid_t::try_from(p).ok()) {
        unsafe {
            libc::kill(pid, libc::SIGTERM);
        }
    }
}

#[cfg(not(unix))]
fn request_terminate(_child: &Child) {}

/// Append one `[ytdlq]` line to the job log. Best effort: the outcome is also
/// recorded in the store and the engine log.
async fn append_trailer(path: &Path, message: &str) {
    let write = async {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(format!("[ytdlq] {message}\n").as_bytes()).await?;
        file.flush().await
    };
    if let Err(e) = write.await {
        tracing::warn!(log = %path.display(), "could not annotate job log: {}", e);
    }
}

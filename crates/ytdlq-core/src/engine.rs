//! Engine: owns the pid lock, the store, and the dispatcher task.
//!
//! Lifecycle: `new` -> optional setters -> `start` -> `wait` and/or `stop`.
//! After `stop` (or after `wait` returns) the engine can be started again with
//! a fresh store handle.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::config::QueueConfig;
use crate::dispatcher::{Dispatcher, DispatcherSettings};
use crate::error::{QueueError, Result};
use crate::lock::PidFile;
use crate::retry::RetryPolicy;
use crate::runner::ProcessRunner;
use crate::store::QueueDb;

struct Running {
    db: QueueDb,
    lock: PidFile,
    pid: u32,
    dispatcher: JoinHandle<Result<()>>,
}

pub struct Engine {
    settings: DispatcherSettings,
    log_directory: PathBuf,
    job_timeout: Option<Duration>,
    shutdown_grace: Duration,
    cancel: CancellationToken,
    running: Option<Running>,
}

impl Engine {
    pub fn new(cfg: &QueueConfig) -> Result<Self> {
        let log_directory = cfg
            .resolved_log_directory()
            .map_err(|e| QueueError::Configuration(format!("log directory: {e:#}")))?;
        let retry = cfg
            .retry
            .as_ref()
            .map(RetryPolicy::from)
            .unwrap_or_default();
        Ok(Self {
            settings: DispatcherSettings {
                worker_num: cfg.worker_num.max(1),
                poll_interval: cfg.poll_interval(),
                retry,
            },
            log_directory,
            job_timeout: cfg.job_timeout(),
            shutdown_grace: cfg.shutdown_grace(),
            cancel: CancellationToken::new(),
            running: None,
        })
    }

    pub fn set_log_directory(&mut self, dir: impl Into<PathBuf>) -> Result<()> {
        self.ensure_stopped("log directory")?;
        self.log_directory = dir.into();
        Ok(())
    }

    pub fn set_worker_num(&mut self, n: usize) -> Result<()> {
        self.ensure_stopped("worker count")?;
        if n == 0 {
            return Err(QueueError::Configuration(
                "worker count must be at least 1".to_string(),
            ));
        }
        self.settings.worker_num = n;
        Ok(())
    }

    pub fn log_directory(&self) -> &Path {
        &self.log_directory
    }

    pub fn worker_num(&self) -> usize {
        self.settings.worker_num
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Store used by the running dispatcher.
    pub fn store(&self) -> Option<&QueueDb> {
        self.running.as_ref().map(|r| &r.db)
    }

    /// Pid written to the lock file by `start`.
    pub fn pid(&self) -> Option<u32> {
        self.running.as_ref().map(|r| r.pid)
    }

    /// Token that stops the dispatcher when cancelled. Cancelling it has the
    /// same effect on running jobs as `stop`, without the teardown.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Take the lock, prepare the store, and spawn the dispatcher.
    ///
    /// Returns the pid recorded in the lock file. An empty `encoder_path`
    /// runs the downloader without `--ffmpeg-location`.
    pub async fn start(
        &mut self,
        db: QueueDb,
        lock_path: impl AsRef<Path>,
        downloader_path: impl AsRef<Path>,
        encoder_path: impl AsRef<Path>,
    ) -> Result<u32> {
        if self.running.is_some() {
            return Err(QueueError::Configuration(
                "engine is already running".to_string(),
            ));
        }
        let downloader = downloader_path.as_ref();
        if downloader.as_os_str().is_empty() {
            return Err(QueueError::Configuration(
                "downloader path is empty".to_string(),
            ));
        }

        let lock = PidFile::new(lock_path.as_ref());
        let pid = lock.acquire()?;
        if let Err(e) = prepare_store(&db).await {
            if let Err(rm) = lock.remove() {
                tracing::warn!(path = %lock.path().display(), "could not remove pid file: {}", rm);
            }
            return Err(e);
        }

        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }
        let runner = ProcessRunner::new(downloader, &self.log_directory)
            .with_encoder(encoder_path.as_ref())
            .with_timeout(self.job_timeout)
            .with_grace(self.shutdown_grace);
        let dispatcher = Dispatcher::new(
            db.clone(),
            Arc::new(runner),
            self.settings.clone(),
            self.cancel.clone(),
        );
        let dispatcher = tokio::spawn(dispatcher.run());

        tracing::info!(
            pid,
            worker_num = self.settings.worker_num,
            downloader = %downloader.display(),
            log_directory = %self.log_directory.display(),
            "engine started"
        );
        self.running = Some(Running {
            db,
            lock,
            pid,
            dispatcher,
        });
        Ok(pid)
    }

    /// Cancel the dispatcher, wait for in-flight jobs to settle, close the
    /// store, and release the lock. Does nothing if not running.
    ///
    /// Returns the dispatcher's error if it stopped on its own with one.
    pub async fn stop(&mut self) -> Result<()> {
        if self.running.is_none() {
            return Ok(());
        }
        tracing::info!("stopping engine");
        self.cancel.cancel();
        self.wait().await
    }

    /// Wait for the dispatcher to end without cancelling it, then release
    /// the store and the lock. Does nothing if not running.
    pub async fn wait(&mut self) -> Result<()> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };
        let result = dispatcher_result(running.dispatcher.await);
        running.db.close().await;
        if let Err(e) = running.lock.remove() {
            tracing::warn!(path = %running.lock.path().display(), "could not remove pid file: {}", e);
        }
        match &result {
            Ok(()) => tracing::info!("engine stopped"),
            Err(e) => tracing::error!("engine stopped with error: {}", e),
        }
        result
    }

    fn ensure_stopped(&self, what: &str) -> Result<()> {
        if self.running.is_some() {
            return Err(QueueError::Configuration(format!(
                "cannot change {what} while the engine is running"
            )));
        }
        Ok(())
    }
}

/// Flatten the dispatcher's join result. A panic or abort becomes
/// `QueueError::Dispatcher` carrying the panic message when there is one.
fn dispatcher_result(joined: std::result::Result<Result<()>, JoinError>) -> Result<()> {
    match joined {
        Ok(result) => result,
        Err(e) if e.is_panic() => {
            let payload = e.into_panic();
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            tracing::error!("dispatcher panicked: {}", message);
            Err(QueueError::Dispatcher(format!("panicked: {message}")))
        }
        Err(e) => {
            tracing::error!("dispatcher task did not complete: {}", e);
            Err(QueueError::Dispatcher(e.to_string()))
        }
    }
}

async fn prepare_store(db: &QueueDb) -> Result<()> {
    db.initialize_schema().await?;
    let recovered = db.recover_interrupted().await?;
    if recovered > 0 {
        tracing::warn!(recovered, "requeued tasks interrupted by a previous run");
    }
    Ok(())
}

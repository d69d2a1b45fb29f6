//! Error taxonomy shared by the store, runner, dispatcher, and engine.

use std::path::PathBuf;

use crate::store::TaskKey;

pub type Result<T, E = QueueError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// A required path or setting is missing, or the engine is in the wrong state.
    #[error("configuration: {0}")]
    Configuration(String),

    /// Another instance holds the process lock.
    #[error("another instance is already running (pid {pid}, lock {})", path.display())]
    Lock { pid: u32, path: PathBuf },

    /// Schema or DML failure reported by SQLite.
    #[error("storage: {0}")]
    Storage(#[from] sqlx::Error),

    /// The key is already live in the active or failed table.
    #[error("task {0} already exists")]
    AlreadyExists(TaskKey),

    /// No stored row matches the key.
    #[error("task {0} not found")]
    NotFound(TaskKey),

    /// The job id could not be derived from the source URL.
    #[error("cannot derive task id from url {url:?}: {reason}")]
    Identification { url: String, reason: String },

    /// The external downloader could not be spawned or waited on.
    #[error("process {}: {source}", program.display())]
    Process {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The per-job log file could not be opened.
    #[error("job log {}: {source}", path.display())]
    Log {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The dispatcher task panicked or was aborted.
    #[error("dispatcher terminated abnormally: {0}")]
    Dispatcher(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl QueueError {
    /// True for every failure that originates in the persistence layer,
    /// including constraint violations and missing rows.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            QueueError::Storage(_) | QueueError::AlreadyExists(_) | QueueError::NotFound(_)
        )
    }
}

//! Records stored in the queue database.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{QueueError, Result};

/// Composite primary key shared by `tasks`, `failed_tasks`, and `current_task`.
///
/// The same video may be queued several times under different format
/// selectors; each key is an independent job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskKey {
    pub id: String,
    pub video_format: String,
    pub audio_format: String,
}

impl TaskKey {
    pub fn new(
        id: impl Into<String>,
        video_format: impl Into<String>,
        audio_format: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            video_format: video_format.into(),
            audio_format: audio_format.into(),
        }
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}+{}]", self.id, self.video_format, self.audio_format)
    }
}

/// An active download job. Timestamps are Unix seconds; 0 means unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub video_format: String,
    pub audio_format: String,
    pub url: String,
    pub title: String,
    pub output_path: String,
    pub parameter: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub started_at: i64,
}

impl Task {
    /// New task for `url`; the id is resolved from the URL when queued.
    pub fn new(
        url: impl Into<String>,
        video_format: impl Into<String>,
        audio_format: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            video_format: video_format.into(),
            audio_format: audio_format.into(),
            ..Self::default()
        }
    }

    pub fn key(&self) -> TaskKey {
        TaskKey::new(&self.id, &self.video_format, &self.audio_format)
    }

    /// Fill in `id` from the URL's `v` query parameter if it is blank.
    ///
    /// The id names the job log file, so ids that are not a single plain
    /// path component are rejected whether given or derived.
    pub fn resolve_id(&mut self) -> Result<()> {
        if self.id.is_empty() {
            self.id = id_from_url(&self.url)?;
        }
        check_id(&self.id, &self.url)
    }

    /// Combined selector handed to the downloader (`-f video+audio`).
    pub fn format_selector(&self) -> String {
        format!("{}+{}", self.video_format, self.audio_format)
    }
}

/// A job that could not complete, kept until an operator requeues it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedTask {
    pub id: String,
    pub video_format: String,
    pub audio_format: String,
    pub url: String,
    pub title: String,
    pub output_path: String,
    pub parameter: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub started_at: i64,
    pub failed_at: i64,
}

impl FailedTask {
    pub fn from_task(task: &Task, failed_at: i64) -> Self {
        Self {
            id: task.id.clone(),
            video_format: task.video_format.clone(),
            audio_format: task.audio_format.clone(),
            url: task.url.clone(),
            title: task.title.clone(),
            output_path: task.output_path.clone(),
            parameter: task.parameter.clone(),
            created_at: task.created_at,
            updated_at: task.updated_at,
            started_at: task.started_at,
            failed_at,
        }
    }

    pub fn key(&self) -> TaskKey {
        TaskKey::new(&self.id, &self.video_format, &self.audio_format)
    }

    /// The active task this record was created from (failure metadata dropped).
    pub fn to_task(&self) -> Task {
        Task {
            id: self.id.clone(),
            video_format: self.video_format.clone(),
            audio_format: self.audio_format.clone(),
            url: self.url.clone(),
            title: self.title.clone(),
            output_path: self.output_path.clone(),
            parameter: self.parameter.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            started_at: self.started_at,
        }
    }
}

fn check_id(id: &str, url: &str) -> Result<()> {
    let reason = if id.contains(['/', '\\', '\0']) {
        "id contains a path separator or NUL"
    } else if id == "." || id == ".." {
        "id is a relative path component"
    } else {
        return Ok(());
    };
    Err(QueueError::Identification {
        url: url.to_string(),
        reason: format!("{reason}: {id:?}"),
    })
}

/// Extract the `v` query parameter, e.g. `abc` from `https://x/watch?v=abc`.
pub fn id_from_url(raw: &str) -> Result<String> {
    let parsed = url::Url::parse(raw).map_err(|e| QueueError::Identification {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    parsed
        .query_pairs()
        .find(|(k, _)| k == "v")
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| QueueError::Identification {
            url: raw.to_string(),
            reason: "missing `v` query parameter".to_string(),
        })
}

//! Persistent queue database (SQLite via sqlx).
//!
//! Three tables share the `(id, video_format, audio_format)` key: `tasks`
//! holds active jobs, `failed_tasks` holds dead-letter records waiting for an
//! operator, and `current_task` marks jobs whose external process is running.

mod db;
mod failed;
mod in_flight;
mod tasks;
mod types;

pub use db::{QueueDb, StoreOptions};
pub use types::{id_from_url, FailedTask, Task, TaskKey};

#[cfg(test)]
pub(crate) use db::open_memory;

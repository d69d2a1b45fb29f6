//! Task read operations: batch pop, list, get.

use sqlx::{QueryBuilder, Sqlite};

use super::super::db::{task_from_row, QueueDb};
use super::super::types::{Task, TaskKey};
use crate::error::Result;

const TASK_COLUMNS: &str = "id, video_format, audio_format, url, title, output_path, \
                            parameter, created_at, updated_at, started_at";

impl QueueDb {
    /// Up to `n` active tasks, oldest `created_at` first (FIFO). Insertion
    /// order breaks ties between tasks created in the same second.
    pub async fn pop_batch(&self, n: usize) -> Result<Vec<Task>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            r#"
            SELECT id, video_format, audio_format, url, title, output_path,
                   parameter, created_at, updated_at, started_at
            FROM tasks
            ORDER BY created_at ASC, rowid ASC
            LIMIT ?1
            "#,
        )
        .bind(i64::try_from(n).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(task_from_row).collect()
    }

    /// All active tasks, newest first.
    pub async fn list_all_tasks(&self) -> Result<Vec<Task>> {
        let rows = sqlx::query(
            r#"
            SELECT id, video_format, audio_format, url, title, output_path,
                   parameter, created_at, updated_at, started_at
            FROM tasks
            ORDER BY created_at DESC, updated_at DESC, rowid DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(task_from_row).collect()
    }

    /// Active tasks whose id is one of `ids` (every format variant), newest first.
    pub async fn list_tasks_by_ids(&self, ids: &[String]) -> Result<Vec<Task>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id IN ("));
        let mut separated = qb.separated(", ");
        for id in ids {
            separated.push_bind(id.clone());
        }
        separated.push_unseparated(") ORDER BY created_at DESC, updated_at DESC, rowid DESC");

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(task_from_row).collect()
    }

    /// Fetch one active task by its full key.
    pub async fn get_task(&self, key: &TaskKey) -> Result<Option<Task>> {
        let row = sqlx::query(
            r#"
            SELECT id, video_format, audio_format, url, title, output_path,
                   parameter, created_at, updated_at, started_at
            FROM tasks
            WHERE id = ?1 AND video_format = ?2 AND audio_format = ?3
            "#,
        )
        .bind(&key.id)
        .bind(&key.video_format)
        .bind(&key.audio_format)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(task_from_row).transpose()
    }
}

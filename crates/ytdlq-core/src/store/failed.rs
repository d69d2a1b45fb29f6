//! Failed-task operations: record, requeue, list.

use super::db::{failed_task_from_row, unix_timestamp, QueueDb};
use super::tasks::{insert_active, insert_failed};
use super::types::{FailedTask, Task, TaskKey};
use crate::error::{QueueError, Result};

impl QueueDb {
    /// Store a failure record with `failed_at = now`. Rejected with
    /// `AlreadyExists` while the same key is still active or already failed.
    pub async fn record_failed(&self, failed: &FailedTask) -> Result<FailedTask> {
        let mut record = failed.clone();
        record.failed_at = unix_timestamp();
        insert_failed(&self.pool, &record).await?;
        Ok(record)
    }

    /// Operator retry: turn a failure record back into an active task.
    ///
    /// The task keeps its original `created_at`, `updated_at` and
    /// `started_at`. Runs in one transaction, so if the insert fails the
    /// failure record is left untouched.
    pub async fn requeue(&self, failed: &FailedTask) -> Result<Task> {
        let key = failed.key();
        let task = failed.to_task();
        let mut tx = self.pool.begin().await?;
        let deleted = sqlx::query(
            r#"
            DELETE FROM failed_tasks
            WHERE id = ?1 AND video_format = ?2 AND audio_format = ?3
            "#,
        )
        .bind(&key.id)
        .bind(&key.video_format)
        .bind(&key.audio_format)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if deleted == 0 {
            return Err(QueueError::NotFound(key));
        }
        insert_active(&mut *tx, &task).await?;
        tx.commit().await?;
        tracing::info!(task = %key, "requeued failed task");
        Ok(task)
    }

    /// All failure records, oldest `created_at` first.
    pub async fn list_all_failed_tasks(&self) -> Result<Vec<FailedTask>> {
        let rows = sqlx::query(
            r#"
            SELECT id, video_format, audio_format, url, title, output_path,
                   parameter, created_at, updated_at, started_at, failed_at
            FROM failed_tasks
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(failed_task_from_row).collect()
    }

    pub async fn get_failed_task(&self, key: &TaskKey) -> Result<Option<FailedTask>> {
        let row = sqlx::query(
            r#"
            SELECT id, video_format, audio_format, url, title, output_path,
                   parameter, created_at, updated_at, started_at, failed_at
            FROM failed_tasks
            WHERE id = ?1 AND video_format = ?2 AND audio_format = ?3
            "#,
        )
        .bind(&key.id)
        .bind(&key.video_format)
        .bind(&key.audio_format)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(failed_task_from_row).transpose()
    }
}

//! In-flight markers (`current_task`): which jobs have a running external process.
//!
//! A marker is written by `mark_started` and cleared by `finish`, `fail`, or
//! `clear_started`. Markers that survive a crash are cleaned up by
//! `recover_interrupted` before the dispatcher starts.

use sqlx::Row;

use super::db::{unix_timestamp, QueueDb};
use super::tasks::delete_marker;
use super::types::{Task, TaskKey};
use crate::error::Result;

impl QueueDb {
    /// Keys of tasks currently marked as running.
    pub async fn list_in_flight(&self) -> Result<Vec<TaskKey>> {
        let rows = sqlx::query(
            r#"
            SELECT id, video_format, audio_format
            FROM current_task
            ORDER BY rowid ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(TaskKey {
                id: row.try_get("id")?,
                video_format: row.try_get("video_format")?,
                audio_format: row.try_get("audio_format")?,
            });
        }
        Ok(out)
    }

    /// Undo `mark_started` for a run that was interrupted (not failed): the
    /// task stays queued with `started_at` reset and its marker removed.
    pub async fn clear_started(&self, task: &Task) -> Result<()> {
        let key = task.key();
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            UPDATE tasks
            SET started_at = 0,
                updated_at = ?1
            WHERE id = ?2 AND video_format = ?3 AND audio_format = ?4
            "#,
        )
        .bind(unix_timestamp())
        .bind(&key.id)
        .bind(&key.video_format)
        .bind(&key.audio_format)
        .execute(&mut *tx)
        .await?;
        delete_marker(&mut *tx, &key).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Reset tasks left marked as running by a previous process (e.g. after
    /// a crash) and drop every marker. Returns the number of tasks reset.
    pub async fn recover_interrupted(&self) -> Result<u64> {
        let now = unix_timestamp();
        let mut tx = self.pool.begin().await?;
        let reset = sqlx::query(
            r#"
            UPDATE tasks
            SET started_at = 0,
                updated_at = ?1
            WHERE EXISTS (
                SELECT 1 FROM current_task c
                WHERE c.id = tasks.id
                  AND c.video_format = tasks.video_format
                  AND c.audio_format = tasks.audio_format
            )
            "#,
        )
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        sqlx::query("DELETE FROM current_task")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(reset)
    }
}

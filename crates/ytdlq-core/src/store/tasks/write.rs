//! Task write operations: queue, start, finish, fail.

use sqlx::sqlite::SqliteExecutor;

use super::super::db::{insert_error, unix_timestamp, QueueDb};
use super::super::types::{FailedTask, Task, TaskKey};
use crate::error::{QueueError, Result};

/// Insert an active row unless the key is live in either table.
///
/// One statement, so the check against `failed_tasks` and the insert are atomic.
pub(in crate::store) async fn insert_active<'e, E>(executor: E, task: &Task) -> Result<()>
where
    E: SqliteExecutor<'e>,
{
    let inserted = sqlx::query(
        r#"
        INSERT INTO tasks (
            id, video_format, audio_format, url, title, output_path,
            parameter, created_at, updated_at, started_at
        )
        SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10
        WHERE NOT EXISTS (
            SELECT 1 FROM failed_tasks
            WHERE id = ?1 AND video_format = ?2 AND audio_format = ?3
        )
        "#,
    )
    .bind(&task.id)
    .bind(&task.video_format)
    .bind(&task.audio_format)
    .bind(&task.url)
    .bind(&task.title)
    .bind(&task.output_path)
    .bind(&task.parameter)
    .bind(task.created_at)
    .bind(task.updated_at)
    .bind(task.started_at)
    .execute(executor)
    .await
    .map_err(|e| insert_error(e, task.key()))?
    .rows_affected();

    if inserted == 0 {
        return Err(QueueError::AlreadyExists(task.key()));
    }
    Ok(())
}

/// Insert a failure row unless the key is still active.
pub(in crate::store) async fn insert_failed<'e, E>(executor: E, failed: &FailedTask) -> Result<()>
where
    E: SqliteExecutor<'e>,
{
    let inserted = sqlx::query(
        r#"
        INSERT INTO failed_tasks (
            id, video_format, audio_format, url, title, output_path,
            parameter, created_at, updated_at, started_at, failed_at
        )
        SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11
        WHERE NOT EXISTS (
            SELECT 1 FROM tasks
            WHERE id = ?1 AND video_format = ?2 AND audio_format = ?3
        )
        "#,
    )
    .bind(&failed.id)
    .bind(&failed.video_format)
    .bind(&failed.audio_format)
    .bind(&failed.url)
    .bind(&failed.title)
    .bind(&failed.output_path)
    .bind(&failed.parameter)
    .bind(failed.created_at)
    .bind(failed.updated_at)
    .bind(failed.started_at)
    .bind(failed.failed_at)
    .execute(executor)
    .await
    .map_err(|e| insert_error(e, failed.key()))?
    .rows_affected();

    if inserted == 0 {
        return Err(QueueError::AlreadyExists(failed.key()));
    }
    Ok(())
}

pub(in crate::store) async fn delete_marker<'e, E>(executor: E, key: &TaskKey) -> Result<()>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query(
        r#"
        DELETE FROM current_task
        WHERE id = ?1 AND video_format = ?2 AND audio_format = ?3
        "#,
    )
    .bind(&key.id)
    .bind(&key.video_format)
    .bind(&key.audio_format)
    .execute(executor)
    .await?;
    Ok(())
}

async fn delete_active<'e, E>(executor: E, key: &TaskKey) -> Result<()>
where
    E: SqliteExecutor<'e>,
{
    let deleted = sqlx::query(
        r#"
        DELETE FROM tasks
        WHERE id = ?1 AND video_format = ?2 AND audio_format = ?3
        "#,
    )
    .bind(&key.id)
    .bind(&key.video_format)
    .bind(&key.audio_format)
    .execute(executor)
    .await?
    .rows_affected();

    if deleted == 0 {
        return Err(QueueError::NotFound(key.clone()));
    }
    Ok(())
}

impl QueueDb {
    /// Queue a new task: resolve its id from the URL if blank, stamp
    /// `created_at`/`updated_at` with the current time, and insert it.
    ///
    /// Returns the stored task. Fails with `AlreadyExists` if the key is live
    /// in the active or the failed table.
    pub async fn queue(&self, mut task: Task) -> Result<Task> {
        task.resolve_id()?;
        let now = unix_timestamp();
        task.created_at = now;
        task.updated_at = now;
        task.started_at = 0;
        insert_active(&self.pool, &task).await?;
        tracing::debug!(task = %task.key(), url = %task.url, "queued task");
        Ok(task)
    }

    /// Insert a task keeping the caller's timestamps.
    pub async fn insert_task(&self, task: &Task) -> Result<()> {
        let mut resolved = task.clone();
        resolved.resolve_id()?;
        insert_active(&self.pool, &resolved).await
    }

    /// Record that the external process for `task` is starting.
    ///
    /// Sets `started_at` and `updated_at` to now and writes the in-flight
    /// marker in the same transaction. Returns the updated task.
    pub async fn mark_started(&self, task: &Task) -> Result<Task> {
        let key = task.key();
        let now = unix_timestamp();
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            r#"
            UPDATE tasks
            SET started_at = ?1,
                updated_at = ?1
            WHERE id = ?2 AND video_format = ?3 AND audio_format = ?4
            "#,
        )
        .bind(now)
        .bind(&key.id)
        .bind(&key.video_format)
        .bind(&key.audio_format)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if updated == 0 {
            return Err(QueueError::NotFound(key));
        }
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO current_task (id, video_format, audio_format)
            VALUES (?1, ?2, ?3)
            "#,
        )
        .bind(&key.id)
        .bind(&key.video_format)
        .bind(&key.audio_format)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        let mut started = task.clone();
        started.started_at = now;
        started.updated_at = now;
        Ok(started)
    }

    /// Remove a completed task. Deletes by the full key so other format
    /// variants of the same video stay queued.
    pub async fn finish(&self, task: &Task) -> Result<()> {
        let key = task.key();
        let mut tx = self.pool.begin().await?;
        delete_active(&mut *tx, &key).await?;
        delete_marker(&mut *tx, &key).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Move a task to `failed_tasks` with `failed_at = now`.
    ///
    /// The delete and the insert share one transaction; on any error nothing
    /// changes.
    pub async fn fail(&self, task: &Task) -> Result<FailedTask> {
        let key = task.key();
        let failed = FailedTask::from_task(task, unix_timestamp());
        let mut tx = self.pool.begin().await?;
        delete_active(&mut *tx, &key).await?;
        insert_failed(&mut *tx, &failed).await?;
        delete_marker(&mut *tx, &key).await?;
        tx.commit().await?;
        Ok(failed)
    }
}

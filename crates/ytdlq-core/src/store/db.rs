//! SQLite-backed queue database.
//!
//! Handles connection, schema, row mapping, and timestamp helpers. Task and
//! failed-task operations live in `tasks` and `failed`.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::types::{FailedTask, Task, TaskKey};
use crate::config;
use crate::error::{QueueError, Result};

/// Connection settings for the queue database.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Pool size. Each concurrently running worker checks out its own connection.
    pub max_connections: u32,
    /// Prepared statements memoised per connection, keyed by SQL text.
    pub statement_cache_capacity: usize,
    pub busy_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_connections: 8,
            statement_cache_capacity: 100,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

const SCHEMA: [&str; 3] = [
    r#"
    CREATE TABLE IF NOT EXISTS current_task (
        id TEXT NOT NULL,
        video_format TEXT NOT NULL,
        audio_format TEXT NOT NULL,
        PRIMARY KEY (id, video_format, audio_format)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tasks (
        id TEXT NOT NULL,
        video_format TEXT NOT NULL,
        audio_format TEXT NOT NULL,
        url TEXT NOT NULL,
        title TEXT NOT NULL,
        output_path TEXT NOT NULL,
        parameter TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        started_at INTEGER NOT NULL,
        PRIMARY KEY (id, video_format, audio_format)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS failed_tasks (
        id TEXT NOT NULL,
        video_format TEXT NOT NULL,
        audio_format TEXT NOT NULL,
        url TEXT NOT NULL,
        title TEXT NOT NULL,
        output_path TEXT NOT NULL,
        parameter TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        started_at INTEGER NOT NULL,
        failed_at INTEGER NOT NULL,
        PRIMARY KEY (id, video_format, audio_format)
    )
    "#,
];

/// Handle to the SQLite-backed queue database.
///
/// Cloning is cheap and shares the same pool. The default file is stored under
/// the XDG state directory: `~/.local/state/ytdlq/queue.db` on Debian.
#[derive(Clone, Debug)]
pub struct QueueDb {
    pub(crate) pool: Pool<Sqlite>,
}

impl QueueDb {
    /// Open (or create) the default queue database and initialize the schema.
    pub async fn open_default(opts: &StoreOptions) -> Result<Self> {
        let state_dir = config::state_dir()
            .map_err(|e| QueueError::Configuration(format!("state directory: {e}")))?;
        Self::open_at(state_dir.join("queue.db"), opts).await
    }

    /// Open (or create) the database at a specific path. Creates parent dirs if needed.
    pub async fn open_at(path: impl AsRef<Path>, opts: &StoreOptions) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let connect = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(opts.busy_timeout)
            .statement_cache_capacity(opts.statement_cache_capacity);
        let pool = SqlitePoolOptions::new()
            .max_connections(opts.max_connections.max(1))
            .connect_with(connect)
            .await?;
        let db = QueueDb { pool };
        db.initialize_schema().await?;
        Ok(db)
    }

    /// Create the three tables if they are absent. Safe to call repeatedly.
    pub async fn initialize_schema(&self) -> Result<()> {
        if self.pool.is_closed() {
            return Err(QueueError::Storage(sqlx::Error::PoolClosed));
        }
        for ddl in SCHEMA {
            sqlx::query(ddl).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Names of the user tables, sorted.
    pub async fn list_tables(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT name FROM sqlite_master
            WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        let mut names = Vec::with_capacity(rows.len());
        for row in rows {
            names.push(row.try_get("name")?);
        }
        Ok(names)
    }

    /// Close every pooled connection. Later calls are no-ops.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}

/// Current time as Unix seconds (for DB timestamps).
pub(crate) fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Turn a unique-constraint violation on insert into `AlreadyExists`.
pub(crate) fn insert_error(err: sqlx::Error, key: TaskKey) -> QueueError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            QueueError::AlreadyExists(key)
        }
        _ => QueueError::Storage(err),
    }
}

pub(crate) fn task_from_row(row: &SqliteRow) -> Result<Task> {
    Ok(Task {
        id: row.try_get("id")?,
        video_format: row.try_get("video_format")?,
        audio_format: row.try_get("audio_format")?,
        url: row.try_get("url")?,
        title: row.try_get("title")?,
        output_path: row.try_get("output_path")?,
        parameter: row.try_get("parameter")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        started_at: row.try_get("started_at")?,
    })
}

pub(crate) fn failed_task_from_row(row: &SqliteRow) -> Result<FailedTask> {
    Ok(FailedTask {
        id: row.try_get("id")?,
        video_format: row.try_get("video_format")?,
        audio_format: row.try_get("audio_format")?,
        url: row.try_get("url")?,
        title: row.try_get("title")?,
        output_path: row.try_get("output_path")?,
        parameter: row.try_get("parameter")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        started_at: row.try_get("started_at")?,
        failed_at: row.try_get("failed_at")?,
    })
}

#[cfg(test)]
/// Open an in-memory database for tests (no disk I/O).
pub(crate) async fn open_memory() -> Result<QueueDb> {
    // Single connection that never expires: a second or recycled connection
    // would see a different, empty in-memory database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with("sqlite::memory:".parse::<SqliteConnectOptions>()?)
        .await?;
    let db = QueueDb { pool };
    db.initialize_schema().await?;
    Ok(db)
}

//! `ytdlq requeue <id> -v <fmt> -a <fmt>` – retry a failed task.

use anyhow::{bail, Result};
use ytdlq_core::{QueueDb, TaskKey};

pub async fn run_requeue(
    db: &QueueDb,
    id: &str,
    video_format: &str,
    audio_format: &str,
) -> Result<()> {
    let key = TaskKey::new(id, video_format, audio_format);
    let Some(failed) = db.get_failed_task(&key).await? else {
        bail!("no failed task {key}");
    };
    let task = db.requeue(&failed).await?;
    println!("Requeued {} for URL: {}", task.key(), task.url);
    Ok(())
}

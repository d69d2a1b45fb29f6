//! `ytdlq failed` – show failure records.

use anyhow::Result;
use ytdlq_core::QueueDb;

pub async fn run_failed(db: &QueueDb, json: bool) -> Result<()> {
    let failed = db.list_all_failed_tasks().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&failed)?);
        return Ok(());
    }
    if failed.is_empty() {
        println!("No failed tasks.");
        return Ok(());
    }
    println!("{:<14} {:<16} {:<10} {}", "ID", "FORMAT", "FAILED", "URL");
    for f in failed {
        println!(
            "{:<14} {:<16} {:<10} {}",
            f.id,
            format!("{}+{}", f.video_format, f.audio_format),
            f.failed_at,
            f.url
        );
    }
    Ok(())
}

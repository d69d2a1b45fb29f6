//! `ytdlq add <url>` – queue a new download.

use anyhow::Result;
use ytdlq_core::{QueueDb, Task};

#[derive(Debug)]
pub struct AddArgs {
    pub url: String,
    pub id: Option<String>,
    pub video_format: String,
    pub audio_format: String,
    pub title: String,
    pub output: String,
    pub parameter: String,
}

impl AddArgs {
    fn into_task(self) -> Task {
        let mut task = Task::new(self.url, self.video_format, self.audio_format);
        task.id = self.id.unwrap_or_default();
        task.title = self.title;
        task.output_path = self.output;
        task.parameter = self.parameter;
        task
    }
}

pub async fn run_add(db: &QueueDb, args: AddArgs) -> Result<()> {
    let task = db.queue(args.into_task()).await?;
    println!("Queued {} for URL: {}", task.key(), task.url);
    Ok(())
}

//! CLI for the ytdlq download queue.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use ytdlq_core::config;
use ytdlq_core::store::{QueueDb, StoreOptions};

use commands::{run_add, run_engine, run_failed, run_list, run_requeue, AddArgs, RunArgs};

/// Top-level CLI for the ytdlq download queue.
#[derive(Debug, Parser)]
#[command(name = "ytdlq")]
#[command(about = "ytdlq: durable queue for youtube-dl downloads", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Queue a video for download.
    Add {
        /// Video page URL; the task id is taken from its `v` parameter.
        url: String,
        /// Explicit task id (skips deriving it from the URL).
        #[arg(long)]
        id: Option<String>,
        /// Video format code passed to the downloader.
        #[arg(short = 'v', long, default_value = "bestvideo")]
        video_format: String,
        /// Audio format code passed to the downloader.
        #[arg(short = 'a', long, default_value = "bestaudio")]
        audio_format: String,
        #[arg(long, default_value = "")]
        title: String,
        /// Output template passed to the downloader's `-o`.
        #[arg(short = 'o', long, default_value = "%(title)s.%(ext)s")]
        output: String,
        /// Extra downloader argument, passed through as one argument.
        #[arg(long, default_value = "", allow_hyphen_values = true)]
        parameter: String,
    },

    /// Run the queue until interrupted (Ctrl-C).
    Run {
        /// Number of downloads to run at once (default from config).
        #[arg(long, value_name = "N")]
        workers: Option<usize>,
        /// Downloader executable (default from config).
        #[arg(long, value_name = "PATH")]
        downloader: Option<PathBuf>,
        /// Encoder location for `--ffmpeg-location` (default from config).
        #[arg(long, value_name = "PATH")]
        encoder: Option<PathBuf>,
        /// Pid file guarding against a second instance.
        #[arg(long, value_name = "PATH")]
        lock: Option<PathBuf>,
    },

    /// Show queued tasks.
    List {
        /// Only tasks with this id (repeatable).
        #[arg(long = "id", value_name = "ID")]
        ids: Vec<String>,
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Show failed tasks.
    Failed {
        #[arg(long)]
        json: bool,
    },

    /// Move a failed task back to the queue.
    Requeue {
        /// Task id.
        id: String,
        #[arg(short = 'v', long)]
        video_format: String,
        #[arg(short = 'a', long)]
        audio_format: String,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);
        let opts = StoreOptions {
            statement_cache_capacity: cfg.statement_cache_capacity,
            ..StoreOptions::default()
        };
        let db = QueueDb::open_default(&opts).await?;

        match cli.command {
            CliCommand::Add {
                url,
                id,
                video_format,
                audio_format,
                title,
                output,
                parameter,
            } => {
                let args = AddArgs {
                    url,
                    id,
                    video_format,
                    audio_format,
                    title,
                    output,
                    parameter,
                };
                run_add(&db, args).await?;
                db.close().await;
            }
            CliCommand::Run {
                workers,
                downloader,
                encoder,
                lock,
            } => {
                let args = RunArgs {
                    workers,
                    downloader,
                    encoder,
                    lock,
                };
                run_engine(db, &cfg, args).await?;
            }
            CliCommand::List { ids, json } => {
                run_list(&db, &ids, json).await?;
                db.close().await;
            }
            CliCommand::Failed { json } => {
                run_failed(&db, json).await?;
                db.close().await;
            }
            CliCommand::Requeue {
                id,
                video_format,
                audio_format,
            } => {
                run_requeue(&db, &id, &video_format, &audio_format).await?;
                db.close().await;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;

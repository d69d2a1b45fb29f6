//! `ytdlq run` – start the engine and process the queue until Ctrl-C.

use anyhow::{Context, Result};
use std::path::PathBuf;
use ytdlq_core::config::{self, QueueConfig};
use ytdlq_core::{Engine, QueueDb};

#[derive(Debug, Default)]
pub struct RunArgs {
    pub workers: Option<usize>,
    pub downloader: Option<PathBuf>,
    pub encoder: Option<PathBuf>,
    pub lock: Option<PathBuf>,
}

pub async fn run_engine(db: QueueDb, cfg: &QueueConfig, args: RunArgs) -> Result<()> {
    let mut engine = Engine::new(cfg)?;
    if let Some(n) = args.workers {
        engine.set_worker_num(n)?;
    }
    let lock_path = match args.lock {
        Some(path) => path,
        None => config::default_lock_path().context("pid file location")?,
    };
    let downloader = args
        .downloader
        .unwrap_or_else(|| PathBuf::from(&cfg.downloader_path));
    let encoder = args
        .encoder
        .unwrap_or_else(|| PathBuf::from(&cfg.encoder_path));

    let pid = engine.start(db, &lock_path, &downloader, &encoder).await?;
    println!(
        "ytdlq running (pid {pid}, {} worker(s), logs in {}). Press Ctrl-C to stop.",
        engine.worker_num(),
        engine.log_directory().display()
    );

    let shutdown = engine.shutdown_token();
    let signal = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
            println!("Stopping; waiting for running downloads to exit...");
            shutdown.cancel();
        }
    });

    let result = engine.wait().await;
    signal.abort();
    result?;
    println!("ytdlq stopped.");
    Ok(())
}

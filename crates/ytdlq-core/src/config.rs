use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Backoff applied when polling the store fails (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Consecutive poll failures tolerated before the dispatcher gives up.
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff (e.g. 0.5 = 500ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay_secs: 0.5,
            max_delay_secs: 60,
        }
    }
}

/// Global configuration loaded from `~/.config/ytdlq/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Number of external jobs allowed to run at once.
    pub worker_num: usize,
    /// Downloader executable (youtube-dl compatible).
    pub downloader_path: String,
    /// Encoder passed to the downloader via `--ffmpeg-location`. Empty = omit the flag.
    #[serde(default)]
    pub encoder_path: String,
    /// Directory for per-job `<id>.log` files (default: XDG state dir `logs/`).
    #[serde(default)]
    pub log_directory: Option<PathBuf>,
    /// Idle sleep between polls of an empty queue.
    pub poll_interval_secs: u64,
    /// Optional hard deadline for one external job run.
    #[serde(default)]
    pub job_timeout_secs: Option<u64>,
    /// Time a running job gets to exit on shutdown before it is killed.
    pub shutdown_grace_secs: u64,
    /// Prepared statements cached per SQLite connection.
    pub statement_cache_capacity: usize,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            worker_num: 1,
            downloader_path: "youtube-dl".to_string(),
            encoder_path: "ffmpeg".to_string(),
            log_directory: None,
            poll_interval_secs: 60,
            job_timeout_secs: None,
            shutdown_grace_secs: 10,
            statement_cache_capacity: 100,
            retry: None,
        }
    }
}

impl QueueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn job_timeout(&self) -> Option<Duration> {
        self.job_timeout_secs.map(Duration::from_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Configured log directory, or `~/.local/state/ytdlq/logs`.
    pub fn resolved_log_directory(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.log_directory {
            return Ok(dir.clone());
        }
        Ok(state_dir()?.join("logs"))
    }
}

/// `~/.local/state/ytdlq` on Debian. Holds the database, the pid file, and logs.
pub fn state_dir() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("ytdlq")?;
    Ok(xdg_dirs.get_state_home().join("ytdlq"))
}

/// Default pid file location.
pub fn default_lock_path() -> Result<PathBuf> {
    Ok(state_dir()?.join("ytdlq.pid"))
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("ytdlq")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<QueueConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = QueueConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: QueueConfig = toml::from_str(&data)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = QueueConfig::default();
        assert_eq!(cfg.worker_num, 1);
        assert_eq!(cfg.downloader_path, "youtube-dl");
        assert_eq!(cfg.poll_interval(), Duration::from_secs(60));
        assert!(cfg.job_timeout().is_none());
        assert!(cfg.retry.is_none());
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = QueueConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: QueueConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.worker_num, cfg.worker_num);
        assert_eq!(parsed.encoder_path, cfg.encoder_path);
        assert_eq!(parsed.shutdown_grace_secs, cfg.shutdown_grace_secs);
        assert_eq!(parsed.statement_cache_capacity, cfg.statement_cache_capacity);
    }

    #[test]
    fn config_toml_custom_values() {
        let toml = r#"
            worker_num = 3
            downloader_path = "/usr/local/bin/yt-dlp"
            log_directory = "/var/log/ytdlq"
            poll_interval_secs = 5
            job_timeout_secs = 3600
            shutdown_grace_secs = 2
            statement_cache_capacity = 16

            [retry]
            max_attempts = 4
            base_delay_secs = 0.25
            max_delay_secs = 15
        "#;
        let cfg: QueueConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.worker_num, 3);
        assert_eq!(cfg.encoder_path, "");
        assert_eq!(
            cfg.resolved_log_directory().unwrap(),
            PathBuf::from("/var/log/ytdlq")
        );
        assert_eq!(cfg.job_timeout(), Some(Duration::from_secs(3600)));
        let retry = cfg.retry.as_ref().unwrap();
        assert_eq!(retry.max_attempts, 4);
        assert!((retry.base_delay_secs - 0.25).abs() < 1e-9);
        assert_eq!(retry.max_delay_secs, 15);
    }
}

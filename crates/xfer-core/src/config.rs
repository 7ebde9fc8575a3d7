use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::manager::DEFAULT_MAX_CONCURRENT;
use crate::task::{TaskOptions, DEFAULT_CHUNK_SIZE, DEFAULT_SPEED_LIMIT};

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_speed_limit() -> u64 {
    DEFAULT_SPEED_LIMIT
}

fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT
}

fn default_true() -> bool {
    true
}

/// Global configuration loaded from `~/.config/xfer/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XferConfig {
    /// Directory `xfer get` downloads into (None = `~/Downloads/MusicPlayerDownloads`).
    #[serde(default)]
    pub download_dir: Option<PathBuf>,
    /// Throttle for new tasks in bytes per second (0 = unlimited).
    #[serde(default = "default_speed_limit")]
    pub speed_limit_bytes_per_sec: u64,
    /// Bytes per read/write iteration.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Minimum bytes between progress notifications (0 = every chunk).
    #[serde(default)]
    pub progress_step_bytes: u64,
    /// Maximum concurrently running tasks (0 = unbounded).
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Remember completed destinations across runs.
    #[serde(default = "default_true")]
    pub persist_completed: bool,
}

impl Default for XferConfig {
    fn default() -> Self {
        Self {
            download_dir: None,
            speed_limit_bytes_per_sec: default_speed_limit(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            progress_step_bytes: 0,
            max_concurrent: default_max_concurrent(),
            persist_completed: true,
        }
    }
}

impl XferConfig {
    /// Worker slots for the manager (`None` = unbounded).
    pub fn worker_slots(&self) -> Option<usize> {
        (self.max_concurrent > 0).then_some(self.max_concurrent)
    }

    /// Task options derived from this config.
    pub fn task_options(&self) -> TaskOptions {
        TaskOptions {
            chunk_size: self.chunk_size.max(1),
            speed_limit_bytes_per_sec: self.speed_limit_bytes_per_sec,
            progress_step_bytes: self.progress_step_bytes,
        }
    }

    /// Configured download dir, or `~/Downloads/MusicPlayerDownloads`.
    pub fn resolved_download_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.download_dir {
            return Ok(dir.clone());
        }
        let home = std::env::var_os("HOME").context("HOME is not set; configure download_dir")?;
        Ok(PathBuf::from(home)
            .join("Downloads")
            .join("MusicPlayerDownloads"))
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("xfer")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<XferConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = XferConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: XferConfig =
        toml::from_str(&data).with_context(|| format!("parse config: {}", path.display()))?;
    Ok(cfg)
}

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Upper bound for the downloader timeouts (one day).
pub const MAX_TIMEOUT_SECS: u64 = 24 * 60 * 60;
/// Upper bound for the stop-to-kill grace period (ten minutes).
pub const MAX_KILL_GRACE_MS: u64 = 10 * 60 * 1000;
/// Upper bound for the metadata cache TTL (one year).
pub const MAX_CACHE_MINUTES: u64 = 365 * 24 * 60;

/// Retry policy parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// Maximum number of attempts per job (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff.
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 5.0,
            max_delay_secs: 300,
        }
    }
}

/// How aggressively the external downloader is driven. Never changes the
/// one-job-at-a-time rule, only timeouts and throughput knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceMode {
    Stability,
    #[default]
    Balanced,
    Speed,
}

/// Fields compared when deciding whether a new candidate duplicates a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateKey {
    /// Same URL and same title.
    #[default]
    UrlTitle,
    /// Same URL, same streamer and same clip range (or both full-length).
    UrlStreamerRange,
}

/// External download tool invocation.
///
/// Argument templates may contain `{url}`, `{output}`, `{threads}`,
/// `{start}`, `{end}`, `{duration}` and `{rate_limit}`. A token that is exactly
/// `{clip_args}` or `{rate_limit_args}` is replaced by the corresponding list
/// (or dropped when the job has no clip / the mode has no rate limit).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DownloaderConfig {
    pub program: String,
    pub args: Vec<String>,
    pub clip_args: Vec<String>,
    pub rate_limit_args: Vec<String>,
    /// Max seconds to wait for the first line of output (or exit).
    pub first_output_timeout_secs: u64,
    /// Max seconds of silence once output has started.
    pub stall_timeout_secs: u64,
    /// Grace period between the stop signal and a forced kill.
    pub kill_grace_ms: u64,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            program: "yt-dlp".to_string(),
            args: [
                "--newline",
                "--no-colors",
                "-N",
                "{threads}",
                "{rate_limit_args}",
                "{clip_args}",
                "-o",
                "{output}",
                "{url}",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            clip_args: vec!["--download-sections".to_string(), "*{start}-{end}".to_string()],
            rate_limit_args: vec!["--limit-rate".to_string(), "{rate_limit}".to_string()],
            first_output_timeout_secs: 60,
            stall_timeout_secs: 120,
            kill_grace_ms: 3000,
        }
    }
}

/// Global configuration loaded from `~/.config/vodq/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VodqConfig {
    pub performance_mode: PerformanceMode,
    /// Push jobs that failed more than once this session behind the others.
    pub smart_scheduler: bool,
    pub prevent_duplicate_downloads: bool,
    pub duplicate_key: DuplicateKey,
    /// TTL of the metadata caches, in minutes.
    pub metadata_cache_minutes: u64,
    /// Where finished files go (None = current directory).
    pub download_dir: Option<PathBuf>,
    /// Output name for full downloads; `{id}`, `{title}`, `{streamer}`, `{date}`.
    pub filename_template: String,
    /// Retry timer period.
    pub scheduler_tick_ms: u64,
    /// Minimum interval between durable progress writes.
    pub progress_flush_ms: u64,
    pub retry: RetryConfig,
    pub downloader: DownloaderConfig,
}

impl Default for VodqConfig {
    fn default() -> Self {
        Self {
            performance_mode: PerformanceMode::default(),
            smart_scheduler: false,
            prevent_duplicate_downloads: true,
            duplicate_key: DuplicateKey::default(),
            metadata_cache_minutes: 10,
            download_dir: None,
            filename_template: "{date}_{streamer}_{title}".to_string(),
            scheduler_tick_ms: 1000,
            progress_flush_ms: 1000,
            retry: RetryConfig::default(),
            downloader: DownloaderConfig::default(),
        }
    }
}

impl VodqConfig {
    /// Reject values that parse but cannot drive the engine.
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }
        if !(self.retry.base_delay_secs.is_finite() && self.retry.base_delay_secs > 0.0) {
            anyhow::bail!("retry.base_delay_secs must be a positive number");
        }
        if (self.retry.max_delay_secs as f64) < self.retry.base_delay_secs {
            anyhow::bail!("retry.max_delay_secs must not be smaller than retry.base_delay_secs");
        }
        if self.downloader.program.trim().is_empty() {
            anyhow::bail!("downloader.program must not be empty");
        }
        if self.downloader.first_output_timeout_secs == 0 {
            anyhow::bail!("downloader.first_output_timeout_secs must be at least 1");
        }
        if self.downloader.first_output_timeout_secs > MAX_TIMEOUT_SECS {
            anyhow::bail!(
                "downloader.first_output_timeout_secs must be at most {}",
                MAX_TIMEOUT_SECS
            );
        }
        if self.downloader.stall_timeout_secs > MAX_TIMEOUT_SECS {
            anyhow::bail!("downloader.stall_timeout_secs must be at most {}", MAX_TIMEOUT_SECS);
        }
        if self.downloader.kill_grace_ms > MAX_KILL_GRACE_MS {
            anyhow::bail!("downloader.kill_grace_ms must be at most {}", MAX_KILL_GRACE_MS);
        }
        if self.metadata_cache_minutes > MAX_CACHE_MINUTES {
            anyhow::bail!("metadata_cache_minutes must be at most {}", MAX_CACHE_MINUTES);
        }
        if self.scheduler_tick_ms == 0 {
            anyhow::bail!("scheduler_tick_ms must be at least 1");
        }
        Ok(())
    }

    pub fn effective_download_dir(&self) -> PathBuf {
        self.download_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("vodq")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<VodqConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = VodqConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from_path(&path)
}

/// Load and validate a config file at an explicit path.
pub fn load_from_path(path: &Path) -> Result<VodqConfig> {
    let data =
        fs::read_to_string(path).with_context(|| format!("read config: {}", path.display()))?;
    let cfg: VodqConfig =
        toml::from_str(&data).with_context(|| format!("parse config: {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config: {}", path.display()))?;
    Ok(cfg)
}

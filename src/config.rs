use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub paths: PathsConfig,
    pub sampling: SamplingConfig,
    pub history: HistoryConfig,
    pub retention: RetentionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    /// Directory for the append log, history documents, stats and snapshot.
    pub data_dir: String,
    /// Directory for diagnostic log files (rotated by the retention pass).
    pub log_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SamplingConfig {
    /// Seconds between sampling ticks.
    pub interval_secs: u64,
    /// Buffered samples before a flush to the append log (~1 minute at a 4s tick).
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Attempts per tick before giving up on the sample source.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Fixed backoff between attempts, in seconds.
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    /// Rolling windows, one history document each.
    pub windows: Vec<WindowConfig>,
    /// Extra margin past each window cutoff; absorbs year-boundary
    /// ambiguity of the year-less display timestamps.
    #[serde(default = "default_slack_minutes")]
    pub slack_minutes: u64,
    /// Maximum age for the longest-window document, trimmed daily.
    #[serde(default = "default_long_retention_days")]
    pub long_window_retention_days: u32,
}

/// One rolling window: `name` becomes the file stem (`history-1hr.json`).
#[derive(Debug, Clone, Deserialize)]
pub struct WindowConfig {
    pub name: String,
    pub hours: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    /// Size threshold for rotating the append log and diagnostic logs.
    #[serde(default = "default_max_log_size_bytes")]
    pub max_log_size_bytes: u64,
    /// Rotated archives older than this are deleted.
    #[serde(default = "default_archive_retention_days")]
    pub archive_retention_days: u32,
}

fn default_buffer_size() -> usize {
    15
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff_secs() -> u64 {
    1
}

fn default_slack_minutes() -> u64 {
    10
}

fn default_long_retention_days() -> u32 {
    7
}

fn default_max_log_size_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_archive_retention_days() -> u32 {
    2
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.paths.data_dir.is_empty(),
            "paths.data_dir must be non-empty"
        );
        anyhow::ensure!(
            !self.paths.log_dir.is_empty(),
            "paths.log_dir must be non-empty"
        );
        anyhow::ensure!(
            self.sampling.interval_secs > 0,
            "sampling.interval_secs must be > 0, got {}",
            self.sampling.interval_secs
        );
        anyhow::ensure!(
            self.sampling.buffer_size > 0,
            "sampling.buffer_size must be > 0, got {}",
            self.sampling.buffer_size
        );
        anyhow::ensure!(
            self.sampling.max_attempts > 0,
            "sampling.max_attempts must be > 0, got {}",
            self.sampling.max_attempts
        );
        anyhow::ensure!(
            !self.history.windows.is_empty(),
            "history.windows must list at least one window"
        );
        for w in &self.history.windows {
            anyhow::ensure!(
                !w.name.is_empty(),
                "history.windows entries must have a non-empty name"
            );
            anyhow::ensure!(
                w.hours > 0,
                "history window {:?}: hours must be > 0, got {}",
                w.name,
                w.hours
            );
        }
        anyhow::ensure!(
            self.history.long_window_retention_days > 0,
            "history.long_window_retention_days must be > 0, got {}",
            self.history.long_window_retention_days
        );
        anyhow::ensure!(
            self.retention.max_log_size_bytes > 0,
            "retention.max_log_size_bytes must be > 0, got {}",
            self.retention.max_log_size_bytes
        );
        anyhow::ensure!(
            self.retention.archive_retention_days > 0,
            "retention.archive_retention_days must be > 0, got {}",
            self.retention.archive_retention_days
        );
        Ok(())
    }
}

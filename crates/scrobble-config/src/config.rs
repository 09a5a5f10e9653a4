use scrobble_models::MediaType;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Maximum number of custom path exclusions
pub const MAX_CUSTOM_PATHS: usize = 5;
/// Longest scheduled sync interval, thirty days
pub const MAX_INTERVAL_HOURS: u64 = 720;

const PLACEHOLDER_CLIENT_ID: &str = "YOUR_CLIENT_ID";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub simkl: SimklConfig,
    #[serde(default)]
    pub scrobble: ScrobbleConfig,
    #[serde(default)]
    pub exclusions: ExclusionConfig,
    #[serde(default)]
    pub sync: SyncOptions,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimklConfig {
    pub client_id: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Backoff policy for 429/5xx responses and network failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrobbleConfig {
    #[serde(default = "default_true")]
    pub scrobble_movies: bool,
    #[serde(default = "default_true")]
    pub scrobble_episodes: bool,
    /// Percentage at which an item counts as watched
    #[serde(default = "default_watched_threshold")]
    pub watched_threshold: u8,
    /// Percentage at which SIMKL's own /scrobble/stop marks an item watched.
    /// Stops between `watched_threshold` and this value complete through the
    /// history endpoint instead.
    #[serde(default = "default_remote_complete_threshold")]
    pub remote_complete_threshold: u8,
    /// Seconds of watching between progress re-sends
    #[serde(default = "default_progress_interval_secs")]
    pub progress_interval_secs: u64,
}

impl Default for ScrobbleConfig {
    fn default() -> Self {
        Self {
            scrobble_movies: true,
            scrobble_episodes: true,
            watched_threshold: default_watched_threshold(),
            remote_complete_threshold: default_remote_complete_threshold(),
            progress_interval_secs: default_progress_interval_secs(),
        }
    }
}

impl ScrobbleConfig {
    pub fn progress_interval(&self) -> Duration {
        Duration::from_secs(self.progress_interval_secs)
    }

    pub fn is_enabled_for(&self, media_type: MediaType) -> bool {
        match media_type {
            MediaType::Movie => self.scrobble_movies,
            MediaType::Episode => self.scrobble_episodes,
            MediaType::Show | MediaType::Season => false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExclusionConfig {
    /// Exclude live TV (`pvr://`)
    #[serde(default)]
    pub exclude_live_tv: bool,
    /// Exclude HTTP/HTTPS streams
    #[serde(default)]
    pub exclude_http: bool,
    /// Exclude addon-triggered playback (`plugin://`)
    #[serde(default)]
    pub exclude_plugin: bool,
    /// Path prefixes whose files (and subdirectories) are never scrobbled
    #[serde(default)]
    pub paths: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Push locally watched movies to SIMKL
    #[serde(default = "default_true")]
    pub export_movies: bool,
    #[serde(default = "default_true")]
    pub export_episodes: bool,
    /// Mark movies watched on SIMKL as watched locally
    #[serde(default = "default_true")]
    pub import_movies: bool,
    #[serde(default = "default_true")]
    pub import_episodes: bool,
    /// Retract remote history entries this tool pushed that are no longer
    /// watched locally. Destructive, so off unless asked for.
    #[serde(default)]
    pub prune_remote: bool,
    /// Fetch only remote changes since the last successful sync
    #[serde(default = "default_true")]
    pub delta: bool,
    #[serde(default = "default_true")]
    pub sync_on_startup: bool,
    #[serde(default = "default_true")]
    pub sync_on_library_update: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            export_movies: true,
            export_episodes: true,
            import_movies: true,
            import_episodes: true,
            prune_remote: false,
            delta: true,
            sync_on_startup: true,
            sync_on_library_update: true,
        }
    }
}

impl SyncOptions {
    pub fn export_enabled(&self, media_type: MediaType) -> bool {
        match media_type {
            MediaType::Movie => self.export_movies,
            MediaType::Episode => self.export_episodes,
            MediaType::Show | MediaType::Season => false,
        }
    }

    pub fn import_enabled(&self, media_type: MediaType) -> bool {
        match media_type {
            MediaType::Movie => self.import_movies,
            MediaType::Episode => self.import_episodes,
            MediaType::Show | MediaType::Season => false,
        }
    }

    /// Media types with at least one sync direction switched on
    pub fn enabled_media_types(&self) -> Vec<MediaType> {
        MediaType::SYNCABLE
            .into_iter()
            .filter(|t| self.export_enabled(*t) || self.import_enabled(*t))
            .collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Hours between scheduled syncs; `0` or `"off"` disables
    #[serde(default)]
    pub interval: SyncInterval,
}

/// Scheduled sync interval, normalized at the configuration boundary.
///
/// Settings front-ends hand this value over as text as often as as a number,
/// so `12`, `"12"`, `"12h"`, `0` and `"off"` are all accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawInterval", into = "u64")]
pub struct SyncInterval {
    hours: u64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawInterval {
    Hours(u64),
    Text(String),
}

#[derive(Debug, thiserror::Error)]
#[error(
    "invalid sync interval '{0}': expected at most {} hours or \"off\"",
    MAX_INTERVAL_HOURS
)]
pub struct InvalidInterval(String);

impl SyncInterval {
    pub fn off() -> Self {
        Self { hours: 0 }
    }

    pub fn hours(hours: u64) -> Self {
        Self { hours }
    }

    pub fn as_duration(&self) -> Option<Duration> {
        if self.hours == 0 {
            None
        } else {
            Some(Duration::from_secs(self.hours.saturating_mul(3600)))
        }
    }

    fn bounded(hours: u64, raw: impl ToString) -> Result<Self, InvalidInterval> {
        if hours > MAX_INTERVAL_HOURS {
            return Err(InvalidInterval(raw.to_string()));
        }
        Ok(Self::hours(hours))
    }
}

impl std::str::FromStr for SyncInterval {
    type Err = InvalidInterval;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim().to_lowercase();
        if text.is_empty() || text == "off" || text == "never" {
            return Ok(Self::off());
        }
        let digits = text.strip_suffix('h').unwrap_or(&text).trim();
        let hours = digits.parse::<u64>().map_err(|_| InvalidInterval(s.to_string()))?;
        Self::bounded(hours, s)
    }
}

impl TryFrom<RawInterval> for SyncInterval {
    type Error = InvalidInterval;

    fn try_from(raw: RawInterval) -> Result<Self, Self::Error> {
        match raw {
            RawInterval::Hours(hours) => Self::bounded(hours, hours),
            RawInterval::Text(text) => text.parse(),
        }
    }
}

impl From<SyncInterval> for u64 {
    fn from(interval: SyncInterval) -> u64 {
        interval.hours
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log file for the long-running service (rotated daily)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

fn default_api_base() -> String {
    "https://api.simkl.com".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_attempts() -> usize {
    4
}

fn default_min_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    8_000
}

fn default_watched_threshold() -> u8 {
    70
}

fn default_remote_complete_threshold() -> u8 {
    80
}

fn default_progress_interval_secs() -> u64 {
    15 * 60
}

impl Config {
    /// Configuration written by `config init`
    pub fn template() -> Self {
        Self {
            simkl: SimklConfig {
                client_id: PLACEHOLDER_CLIENT_ID.to_string(),
                api_base: default_api_base(),
                timeout_secs: default_timeout_secs(),
                retry: RetryConfig::default(),
            },
            scrobble: ScrobbleConfig::default(),
            exclusions: ExclusionConfig::default(),
            sync: SyncOptions::default(),
            scheduler: SchedulerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    pub fn load_from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &PathBuf) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.simkl.client_id.is_empty() || self.simkl.client_id == PLACEHOLDER_CLIENT_ID {
            return Err(anyhow::anyhow!("simkl.client_id is not configured"));
        }
        if self.simkl.retry.max_attempts == 0 {
            return Err(anyhow::anyhow!("simkl.retry.max_attempts must be at least 1"));
        }

        let scrobble = &self.scrobble;
        if !(1..=100).contains(&scrobble.watched_threshold) {
            return Err(anyhow::anyhow!(
                "scrobble.watched_threshold must be between 1 and 100 (got {})",
                scrobble.watched_threshold
            ));
        }
        if scrobble.remote_complete_threshold < scrobble.watched_threshold
            || scrobble.remote_complete_threshold > 100
        {
            return Err(anyhow::anyhow!(
                "scrobble.remote_complete_threshold must be between watched_threshold ({}) and 100 (got {})",
                scrobble.watched_threshold,
                scrobble.remote_complete_threshold
            ));
        }
        if scrobble.progress_interval_secs == 0 {
            return Err(anyhow::anyhow!("scrobble.progress_interval_secs must be positive"));
        }

        let interval = u64::from(self.scheduler.interval);
        if interval > MAX_INTERVAL_HOURS {
            return Err(anyhow::anyhow!(
                "scheduler.interval must be at most {} hours (got {})",
                MAX_INTERVAL_HOURS,
                interval
            ));
        }

        if self.exclusions.paths.len() > MAX_CUSTOM_PATHS {
            return Err(anyhow::anyhow!(
                "at most {} excluded paths are supported (got {})",
                MAX_CUSTOM_PATHS,
                self.exclusions.paths.len()
            ));
        }
        if self.exclusions.paths.iter().any(|p| p.trim().is_empty()) {
            return Err(anyhow::anyhow!("excluded paths must not be empty"));
        }

        Ok(())
    }
}

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{PipelineError, Result};
use crate::models::Location;
use crate::utils::constants::{
    DEFAULT_BASE_URL, DEFAULT_CURRENT_VARIABLES, DEFAULT_DAILY_VARIABLES,
    DEFAULT_HOURLY_VARIABLES, DEFAULT_INITIAL_BACKOFF_MS, DEFAULT_LAKE_ROOT,
    DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_BACKOFF_MS, DEFAULT_MAX_CONCURRENT_FETCHES,
    DEFAULT_PAST_DAYS, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_TIMEZONE, COMPRESSION_SNAPPY,
};
use crate::utils::LakeLayout;

/// Query parameters sent to the forecast API. The variable lists are the
/// recognized option set; anything else a payload carries is skipped during
/// normalization.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ApiSettings {
    #[serde(default = "default_base_url")]
    #[validate(length(min = 1))]
    pub base_url: String,

    #[serde(default = "default_timezone")]
    pub timezone: String,

    #[serde(default = "default_current_variables")]
    pub current: Vec<String>,

    #[serde(default = "default_hourly_variables")]
    pub hourly: Vec<String>,

    #[serde(default = "default_daily_variables")]
    pub daily: Vec<String>,

    /// Days of history to re-request each run; the overlap is what makes
    /// last-write-wins deduplication matter.
    #[serde(default = "default_past_days")]
    pub past_days: u32,

    /// Omitted from the request when `None`, leaving the API's own default.
    #[serde(default)]
    pub forecast_days: Option<u32>,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timezone: default_timezone(),
            current: default_current_variables(),
            hourly: default_hourly_variables(),
            daily: default_daily_variables(),
            past_days: default_past_days(),
            forecast_days: None,
        }
    }
}

/// Bounded exponential backoff for fetch attempts.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    #[validate(range(min = 1, max = 20))]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    #[validate(range(min = 1))]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_request_timeout_secs")]
    #[validate(range(min = 1, max = 300))]
    pub request_timeout_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): doubles from the
    /// initial delay, capped at the configured maximum.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        let millis = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Full pipeline configuration, deserialized from file plus environment
/// overrides and validated exactly once at startup.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PipelineConfig {
    #[validate(length(min = 1), nested)]
    pub locations: Vec<Location>,

    #[serde(default)]
    #[validate(nested)]
    pub api: ApiSettings,

    #[serde(default)]
    #[validate(nested)]
    pub retry: RetryPolicy,

    #[serde(default = "default_lake_root")]
    pub lake_root: PathBuf,

    #[serde(default = "default_max_concurrent_fetches")]
    #[validate(range(min = 1, max = 64))]
    pub max_concurrent_fetches: usize,

    /// Thread count for archive-wide normalization.
    #[serde(default = "default_max_workers")]
    #[validate(range(min = 1, max = 256))]
    pub max_workers: usize,

    #[serde(default = "default_compression")]
    pub compression: String,
}

impl PipelineConfig {
    /// Loads and validates configuration: file values first, then
    /// `WEATHER_LAKE_*` environment variables on top (`__` separates nested
    /// keys, e.g. `WEATHER_LAKE_RETRY__MAX_ATTEMPTS`).
    pub fn load(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix("WEATHER_LAKE").separator("__"),
            )
            .build()
            .map_err(|e| PipelineError::Config(e.to_string()))?;

        let config: PipelineConfig = settings
            .try_deserialize()
            .map_err(|e| PipelineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn layout(&self) -> LakeLayout {
        LakeLayout::new(&self.lake_root)
    }

    pub fn location(&self, name: &str) -> Option<&Location> {
        self.locations.iter().find(|l| l.name == name)
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}

fn default_current_variables() -> Vec<String> {
    DEFAULT_CURRENT_VARIABLES.iter().map(|v| v.to_string()).collect()
}

fn default_hourly_variables() -> Vec<String> {
    DEFAULT_HOURLY_VARIABLES.iter().map(|v| v.to_string()).collect()
}

fn default_daily_variables() -> Vec<String> {
    DEFAULT_DAILY_VARIABLES.iter().map(|v| v.to_string()).collect()
}

fn default_past_days() -> u32 {
    DEFAULT_PAST_DAYS
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_initial_backoff_ms() -> u64 {
    DEFAULT_INITIAL_BACKOFF_MS
}

fn default_max_backoff_ms() -> u64 {
    DEFAULT_MAX_BACKOFF_MS
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_lake_root() -> PathBuf {
    PathBuf::from(DEFAULT_LAKE_ROOT)
}

fn default_max_concurrent_fetches() -> usize {
    DEFAULT_MAX_CONCURRENT_FETCHES
}

fn default_max_workers() -> usize {
    num_cpus::get()
}

fn default_compression() -> String {
    COMPRESSION_SNAPPY.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_backoff_ms: 500,
            max_backoff_ms: 3_000,
            request_timeout_secs: 30,
        };

        assert_eq!(policy.backoff_delay(1), Duration::from_millis(500));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(1_000));
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(2_000));
        assert_eq!(policy.backoff_delay(4), Duration::from_millis(3_000));
        assert_eq!(policy.backoff_delay(10), Duration::from_millis(3_000));
    }

    #[test]
    fn test_load_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
lake_root = "/tmp/lake"
max_concurrent_fetches = 2

[[locations]]
name = "Paris"
latitude = 48.8566
longitude = 2.3522

[[locations]]
name = "Tokyo"
latitude = 35.6762
longitude = 139.6503
"#
        )
        .unwrap();

        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.locations.len(), 2);
        assert_eq!(config.max_concurrent_fetches, 2);
        assert_eq!(config.api.past_days, DEFAULT_PAST_DAYS);
        assert_eq!(config.retry.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(config.compression, COMPRESSION_SNAPPY);
        assert!(config.location("Tokyo").is_some());
        assert!(config.location("Oslo").is_none());
    }

    #[test]
    fn test_empty_locations_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");
        std::fs::write(&path, "locations = []\n").unwrap();

        assert!(PipelineConfig::load(&path).is_err());
    }

    #[test]
    fn test_out_of_range_coordinates_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");
        std::fs::write(
            &path,
            r#"
[[locations]]
name = "Broken"
latitude = 120.0
longitude = 0.0
"#,
        )
        .unwrap();

        assert!(PipelineConfig::load(&path).is_err());
    }
}

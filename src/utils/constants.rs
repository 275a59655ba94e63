/// Forecast API defaults
pub const DEFAULT_BASE_URL: &str = "https://api.open-meteo.com/v1/forecast";
pub const DEFAULT_TIMEZONE: &str = "auto";
pub const DEFAULT_PAST_DAYS: u32 = 1;

/// Variables requested per payload section when the config names none
pub const DEFAULT_CURRENT_VARIABLES: [&str; 4] = [
    "temperature_2m",
    "relative_humidity_2m",
    "wind_speed_10m",
    "precipitation",
];
pub const DEFAULT_HOURLY_VARIABLES: [&str; 4] = [
    "temperature_2m",
    "relative_humidity_2m",
    "wind_speed_10m",
    "precipitation",
];
pub const DEFAULT_DAILY_VARIABLES: [&str; 4] = [
    "temperature_2m_max",
    "temperature_2m_min",
    "wind_speed_10m_max",
    "precipitation_sum",
];

/// Retry policy defaults
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 500;
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 30_000;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Concurrency defaults
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 4;

/// Lake directory names
pub const DEFAULT_LAKE_ROOT: &str = "data_lake";
pub const BRONZE_DIR: &str = "bronze";
pub const SILVER_DIR: &str = "silver";
pub const GOLD_DIR: &str = "gold";

/// Gold dataset names (one Parquet table per dataset)
pub const GOLD_DAILY_SUMMARY: &str = "daily_summary";
pub const GOLD_WEEKLY_SUMMARY: &str = "weekly_summary";
pub const GOLD_ALERTS: &str = "alerts";
pub const GOLD_FEATURES: &str = "features";

/// Timestamp formats
pub const API_MINUTE_FORMAT: &str = "%Y-%m-%dT%H:%M";
pub const API_DATE_FORMAT: &str = "%Y-%m-%d";
pub const ARTIFACT_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Days from 0001-01-01 to the Unix epoch, for Date32 columns
pub const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Weather label thresholds (degrees C on the bucket's mean temperature)
pub const HOT_TEMP_C: f64 = 35.0;
pub const COLD_TEMP_C: f64 = 10.0;

/// Alert thresholds on daily metrics
pub const HEAT_ALERT_TEMP_C: f64 = 35.0;
pub const STORM_ALERT_WIND_KMH: f64 = 50.0;
pub const RAIN_ALERT_PRECIP_MM: f64 = 20.0;

/// Parquet defaults
pub const DEFAULT_ROW_GROUP_SIZE: usize = 10000;

/// Parquet compression options
pub const COMPRESSION_SNAPPY: &str = "snappy";
pub const COMPRESSION_GZIP: &str = "gzip";
pub const COMPRESSION_LZ4: &str = "lz4";
pub const COMPRESSION_ZSTD: &str = "zstd";
pub const COMPRESSION_NONE: &str = "none";

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::RecordKind;

/// The fixed metric columns of the silver observation table. The first four
/// are instantaneous readings (current/hourly kinds), the rest are the
/// per-day aggregates the daily kind reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    Temperature,
    Humidity,
    WindSpeed,
    Precipitation,
    TempMax,
    TempMin,
    WindSpeedMax,
    PrecipTotal,
}

impl Metric {
    pub const INSTANTANEOUS: [Metric; 4] = [
        Metric::Temperature,
        Metric::Humidity,
        Metric::WindSpeed,
        Metric::Precipitation,
    ];

    pub const DAILY: [Metric; 4] = [
        Metric::TempMax,
        Metric::TempMin,
        Metric::WindSpeedMax,
        Metric::PrecipTotal,
    ];

    /// Column name in the silver table.
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Temperature => "temperature",
            Metric::Humidity => "humidity",
            Metric::WindSpeed => "wind_speed",
            Metric::Precipitation => "precipitation",
            Metric::TempMax => "temp_max",
            Metric::TempMin => "temp_min",
            Metric::WindSpeedMax => "wind_speed_max",
            Metric::PrecipTotal => "precip_total",
        }
    }

    /// Maps an API variable name onto its silver column. Unknown variables
    /// map to `None` and are skipped during normalization.
    pub fn from_api_variable(name: &str) -> Option<Metric> {
        match name {
            "temperature_2m" => Some(Metric::Temperature),
            "relative_humidity_2m" => Some(Metric::Humidity),
            "wind_speed_10m" => Some(Metric::WindSpeed),
            "precipitation" => Some(Metric::Precipitation),
            "temperature_2m_max" => Some(Metric::TempMax),
            "temperature_2m_min" => Some(Metric::TempMin),
            "wind_speed_10m_max" => Some(Metric::WindSpeedMax),
            "precipitation_sum" => Some(Metric::PrecipTotal),
            _ => None,
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One cleaned, typed observation in the silver layer. Exactly one row
/// exists per (location, kind, timestamp); re-normalizing the same bronze
/// record replaces rather than duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRow {
    pub location: String,
    pub kind: RecordKind,
    /// Observation time in the location's configured timezone.
    pub timestamp: NaiveDateTime,

    // Instantaneous metrics (current/hourly kinds)
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
    pub precipitation: Option<f64>,

    // Daily aggregate metrics (daily kind)
    pub temp_max: Option<f64>,
    pub temp_min: Option<f64>,
    pub wind_speed_max: Option<f64>,
    pub precip_total: Option<f64>,

    /// Bronze artifact stem this row was derived from.
    pub source: String,
    pub ingested_at: DateTime<Utc>,
}

impl ObservationRow {
    pub fn new(
        location: impl Into<String>,
        kind: RecordKind,
        timestamp: NaiveDateTime,
        source: impl Into<String>,
        ingested_at: DateTime<Utc>,
    ) -> Self {
        Self {
            location: location.into(),
            kind,
            timestamp,
            temperature: None,
            humidity: None,
            wind_speed: None,
            precipitation: None,
            temp_max: None,
            temp_min: None,
            wind_speed_max: None,
            precip_total: None,
            source: source.into(),
            ingested_at,
        }
    }

    /// Dedup key: last write wins across rows sharing it.
    pub fn key(&self) -> (String, RecordKind, NaiveDateTime) {
        (self.location.clone(), self.kind, self.timestamp)
    }

    pub fn metric(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Temperature => self.temperature,
            Metric::Humidity => self.humidity,
            Metric::WindSpeed => self.wind_speed,
            Metric::Precipitation => self.precipitation,
            Metric::TempMax => self.temp_max,
            Metric::TempMin => self.temp_min,
            Metric::WindSpeedMax => self.wind_speed_max,
            Metric::PrecipTotal => self.precip_total,
        }
    }

    pub fn set_metric(&mut self, metric: Metric, value: Option<f64>) {
        match metric {
            Metric::Temperature => self.temperature = value,
            Metric::Humidity => self.humidity = value,
            Metric::WindSpeed => self.wind_speed = value,
            Metric::Precipitation => self.precipitation = value,
            Metric::TempMax => self.temp_max = value,
            Metric::TempMin => self.temp_min = value,
            Metric::WindSpeedMax => self.wind_speed_max = value,
            Metric::PrecipTotal => self.precip_total = value,
        }
    }

    pub fn has_any_metric(&self) -> bool {
        Metric::INSTANTANEOUS
            .iter()
            .chain(Metric::DAILY.iter())
            .any(|m| self.metric(*m).is_some())
    }
}

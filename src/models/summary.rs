use chrono::{Datelike, NaiveDate, NaiveDateTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::models::Metric;
use crate::utils::constants::{
    COLD_TEMP_C, HEAT_ALERT_TEMP_C, HOT_TEMP_C, RAIN_ALERT_PRECIP_MM, STORM_ALERT_WIND_KMH,
};

/// Aggregation granularity for gold summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Day,
    Week,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Day => "day",
            Period::Week => "week",
        }
    }

    /// Bucket start for a timestamp: the calendar day, or the Monday of the
    /// ISO week.
    pub fn bucket(&self, timestamp: NaiveDateTime) -> NaiveDate {
        let date = timestamp.date();
        match self {
            Period::Day => date,
            Period::Week => {
                let week = date.iso_week();
                // Monday of the same ISO week always exists.
                NaiveDate::from_isoywd_opt(week.year(), week.week(), Weekday::Mon)
                    .unwrap_or(date)
            }
        }
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statistics over the non-null observations of one metric in one bucket.
/// `count` is the number of observations that actually contributed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricAggregate {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub count: usize,
}

/// Qualitative label derived from a bucket's mean temperature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeatherLabel {
    Hot,
    Cold,
    Moderate,
}

impl WeatherLabel {
    pub fn from_mean_temperature(mean: f64) -> Self {
        if mean > HOT_TEMP_C {
            WeatherLabel::Hot
        } else if mean < COLD_TEMP_C {
            WeatherLabel::Cold
        } else {
            WeatherLabel::Moderate
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WeatherLabel::Hot => "hot",
            WeatherLabel::Cold => "cold",
            WeatherLabel::Moderate => "moderate",
        }
    }
}

impl std::fmt::Display for WeatherLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One gold summary row: per-metric aggregates for one location and period
/// bucket. A metric with no non-null observations in the bucket stays `None`
/// rather than reporting a zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub location: String,
    pub period: Period,
    pub period_start: NaiveDate,
    pub temperature: Option<MetricAggregate>,
    pub humidity: Option<MetricAggregate>,
    pub wind_speed: Option<MetricAggregate>,
    pub precipitation: Option<MetricAggregate>,
    pub weather_label: Option<WeatherLabel>,
}

impl SummaryRow {
    pub fn new(location: impl Into<String>, period: Period, period_start: NaiveDate) -> Self {
        Self {
            location: location.into(),
            period,
            period_start,
            temperature: None,
            humidity: None,
            wind_speed: None,
            precipitation: None,
            weather_label: None,
        }
    }

    pub fn aggregate(&self, metric: Metric) -> Option<MetricAggregate> {
        match metric {
            Metric::Temperature => self.temperature,
            Metric::Humidity => self.humidity,
            Metric::WindSpeed => self.wind_speed,
            Metric::Precipitation => self.precipitation,
            _ => None,
        }
    }

    pub fn set_aggregate(&mut self, metric: Metric, aggregate: Option<MetricAggregate>) {
        match metric {
            Metric::Temperature => self.temperature = aggregate,
            Metric::Humidity => self.humidity = aggregate,
            Metric::WindSpeed => self.wind_speed = aggregate,
            Metric::Precipitation => self.precipitation = aggregate,
            _ => {}
        }
        if let Metric::Temperature = metric {
            self.weather_label = self
                .temperature
                .map(|agg| WeatherLabel::from_mean_temperature(agg.mean));
        }
    }
}

/// Risk classification for one location-day, from the alert flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Moderate => "moderate",
            RiskLevel::High => "high",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Weather alert flags for one location-day, evaluated from daily-kind
/// silver metrics. A null input never raises its alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRow {
    pub location: String,
    pub date: NaiveDate,
    pub heat_alert: bool,
    pub storm_alert: bool,
    pub rain_alert: bool,
    pub risk_level: RiskLevel,
}

impl AlertRow {
    pub fn evaluate(
        location: impl Into<String>,
        date: NaiveDate,
        temp_max: Option<f64>,
        wind_speed_max: Option<f64>,
        precip_total: Option<f64>,
    ) -> Self {
        let heat_alert = temp_max.is_some_and(|t| t > HEAT_ALERT_TEMP_C);
        let storm_alert = wind_speed_max.is_some_and(|w| w > STORM_ALERT_WIND_KMH);
        let rain_alert = precip_total.is_some_and(|p| p > RAIN_ALERT_PRECIP_MM);

        let risk_level = if storm_alert {
            RiskLevel::High
        } else if rain_alert {
            RiskLevel::Moderate
        } else {
            RiskLevel::Low
        };

        Self {
            location: location.into(),
            date,
            heat_alert,
            storm_alert,
            rain_alert,
            risk_level,
        }
    }

    pub fn has_any_alert(&self) -> bool {
        self.heat_alert || self.storm_alert || self.rain_alert
    }
}

/// Engineered feature columns for one location-day. Each feature is null
/// whenever one of its inputs is null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub location: String,
    pub date: NaiveDate,
    pub temperature_range: Option<f64>,
    pub humidity_index: Option<f64>,
    pub wind_chill: Option<f64>,
}

impl FeatureRow {
    pub fn derive(
        location: impl Into<String>,
        date: NaiveDate,
        temp_max: Option<f64>,
        temp_min: Option<f64>,
        wind_speed_max: Option<f64>,
        precip_total: Option<f64>,
    ) -> Self {
        let temperature_range = match (temp_max, temp_min) {
            (Some(max), Some(min)) => Some(max - min),
            _ => None,
        };
        let humidity_index = match (temp_max, precip_total) {
            (Some(max), Some(precip)) => Some(max * 0.1 + precip * 0.5),
            _ => None,
        };
        let wind_chill = match (temp_min, wind_speed_max) {
            (Some(min), Some(wind)) => Some(min - wind * 0.1),
            _ => None,
        };

        Self {
            location: location.into(),
            date,
            temperature_range,
            humidity_index,
            wind_chill,
        }
    }
}

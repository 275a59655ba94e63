use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{ApiSettings, RetryPolicy};
use crate::error::FetchError;
use crate::models::{FetchRecord, Location, RecordKind};

/// Seam between the orchestrator and the network. Implementations return
/// one record per payload section; they never touch storage.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(
        &self,
        location: &Location,
        fetched_at: DateTime<Utc>,
    ) -> std::result::Result<Vec<FetchRecord>, FetchError>;
}

/// A forecast response that has passed structural validation: required
/// top-level keys present, every requested section present and non-empty,
/// time arrays non-empty. Only validated payloads reach the bronze layer.
#[derive(Debug, Clone)]
pub struct ForecastPayload {
    value: Value,
}

impl ForecastPayload {
    pub fn from_value(value: Value, api: &ApiSettings) -> std::result::Result<Self, FetchError> {
        let object = value
            .as_object()
            .ok_or_else(|| FetchError::Payload("response is not a JSON object".to_string()))?;

        for key in ["latitude", "longitude", "timezone"] {
            if !object.contains_key(key) {
                return Err(FetchError::MissingSection(key));
            }
        }

        for kind in RecordKind::ALL {
            if !section_requested(api, kind) {
                continue;
            }
            let section = object
                .get(kind.as_str())
                .ok_or(FetchError::MissingSection(kind.as_str()))?;
            let fields = section.as_object().ok_or_else(|| {
                FetchError::Payload(format!("section '{}' is not an object", kind))
            })?;
            if fields.is_empty() {
                return Err(FetchError::Payload(format!("section '{}' is empty", kind)));
            }
            if matches!(kind, RecordKind::Hourly | RecordKind::Daily) {
                let times = fields
                    .get("time")
                    .and_then(Value::as_array)
                    .ok_or_else(|| {
                        FetchError::Payload(format!("section '{}' has no time array", kind))
                    })?;
                if times.is_empty() {
                    return Err(FetchError::Payload(format!(
                        "section '{}' has an empty time array",
                        kind
                    )));
                }
            }
        }

        Ok(Self { value })
    }

    /// Splits the response into one bronze record per requested section,
    /// all sharing the run's fetch timestamp.
    pub fn into_records(
        self,
        location: &Location,
        fetched_at: DateTime<Utc>,
        api: &ApiSettings,
    ) -> Vec<FetchRecord> {
        let mut records = Vec::new();
        let Value::Object(mut object) = self.value else {
            return records;
        };

        for kind in RecordKind::ALL {
            if !section_requested(api, kind) {
                continue;
            }
            if let Some(section) = object.remove(kind.as_str()) {
                records.push(FetchRecord::new(location.clone(), kind, fetched_at, section));
            }
        }
        records
    }
}

fn section_requested(api: &ApiSettings, kind: RecordKind) -> bool {
    match kind {
        RecordKind::Current => !api.current.is_empty(),
        RecordKind::Hourly => !api.hourly.is_empty(),
        RecordKind::Daily => !api.daily.is_empty(),
    }
}

/// Open-Meteo forecast client with request timeouts and bounded
/// exponential-backoff retry on transport errors, 429 and 5xx.
pub struct OpenMeteoClient {
    client: Client,
    api: ApiSettings,
    retry: RetryPolicy,
}

impl OpenMeteoClient {
    pub fn new(api: ApiSettings, retry: RetryPolicy) -> std::result::Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(retry.request_timeout())
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self { client, api, retry })
    }

    fn query_pairs(&self, location: &Location) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("latitude", location.latitude.to_string()),
            ("longitude", location.longitude.to_string()),
            ("timezone", self.api.timezone.clone()),
        ];
        if !self.api.current.is_empty() {
            pairs.push(("current", self.api.current.join(",")));
        }
        if !self.api.hourly.is_empty() {
            pairs.push(("hourly", self.api.hourly.join(",")));
        }
        if !self.api.daily.is_empty() {
            pairs.push(("daily", self.api.daily.join(",")));
        }
        pairs.push(("past_days", self.api.past_days.to_string()));
        if let Some(days) = self.api.forecast_days {
            pairs.push(("forecast_days", days.to_string()));
        }
        pairs
    }

    async fn fetch_once(
        &self,
        location: &Location,
    ) -> std::result::Result<ForecastPayload, FetchError> {
        let response = self
            .client
            .get(&self.api.base_url)
            .query(&self.query_pairs(location))
            .send()
            .await?;

        let status = response.status();
        let url = response.url().to_string();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url,
            });
        }

        debug!(location = %location.name, url = %url, "received forecast response");
        let value: Value = response.json().await?;
        ForecastPayload::from_value(value, &self.api)
    }
}

#[async_trait]
impl Fetcher for OpenMeteoClient {
    async fn fetch(
        &self,
        location: &Location,
        fetched_at: DateTime<Utc>,
    ) -> std::result::Result<Vec<FetchRecord>, FetchError> {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let err = match self.fetch_once(location).await {
                Ok(payload) => {
                    let records = payload.into_records(location, fetched_at, &self.api);
                    info!(
                        location = %location.name,
                        records = records.len(),
                        attempt,
                        "fetch succeeded"
                    );
                    return Ok(records);
                }
                Err(e) => e,
            };

            if !err.is_retryable() {
                return Err(err);
            }
            if attempt >= self.retry.max_attempts {
                return Err(FetchError::Exhausted {
                    attempts: attempt,
                    last: err.to_string(),
                });
            }

            let delay = self.retry.backoff_delay(attempt);
            warn!(
                location = %location.name,
                attempt,
                max_attempts = self.retry.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "fetch failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PipelineError;
use crate::models::Location;
use crate::utils::constants::{API_DATE_FORMAT, API_MINUTE_FORMAT, ARTIFACT_TIMESTAMP_FORMAT};

/// The three payload sections a forecast response carries. The kind decides
/// the payload shape (flat object vs column arrays) and the timestamp format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Current,
    Hourly,
    Daily,
}

impl RecordKind {
    pub const ALL: [RecordKind; 3] = [RecordKind::Current, RecordKind::Hourly, RecordKind::Daily];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Current => "current",
            RecordKind::Hourly => "hourly",
            RecordKind::Daily => "daily",
        }
    }

    /// Format of the `time` values in this section.
    pub fn time_format(&self) -> &'static str {
        match self {
            RecordKind::Current | RecordKind::Hourly => API_MINUTE_FORMAT,
            RecordKind::Daily => API_DATE_FORMAT,
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "current" => Ok(RecordKind::Current),
            "hourly" => Ok(RecordKind::Hourly),
            "daily" => Ok(RecordKind::Daily),
            other => Err(PipelineError::InvalidFormat(format!(
                "unknown record kind '{}'",
                other
            ))),
        }
    }
}

/// One raw fetch result as archived in the bronze layer. Immutable once
/// written; identity is (location, kind, fetched_at) and the artifact
/// filename is a pure function of that key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRecord {
    pub location: Location,
    pub kind: RecordKind,
    pub fetched_at: DateTime<Utc>,
    /// Raw payload section exactly as the API returned it.
    pub payload: Value,
}

impl FetchRecord {
    pub fn new(
        location: Location,
        kind: RecordKind,
        fetched_at: DateTime<Utc>,
        payload: Value,
    ) -> Self {
        Self {
            location,
            kind,
            fetched_at,
            payload,
        }
    }

    /// `<slug>_<kind>_<YYYYMMDD_HHMMSS>`, the record's identity on disk.
    pub fn artifact_stem(&self) -> String {
        format!(
            "{}_{}_{}",
            self.location.slug(),
            self.kind,
            self.fetched_at.format(ARTIFACT_TIMESTAMP_FORMAT)
        )
    }
}

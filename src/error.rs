use thiserror::Error;

use crate::models::RecordKind;
use crate::processors::orchestrator::RunStage;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors raised while talking to the forecast API. All variants are
/// candidates for retry with backoff; `Exhausted` marks the point where
/// the retry budget ran out.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("malformed payload: {0}")]
    Payload(String),

    #[error("payload missing required section '{0}'")]
    MissingSection(&'static str),

    #[error("retries exhausted after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

impl FetchError {
    /// Transport failures and throttling/server statuses are worth
    /// retrying; a malformed payload will not improve on a second read.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Transport(_) => true,
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Fetch failed for {location}: {source}")]
    Fetch {
        location: String,
        #[source]
        source: FetchError,
    },

    #[error("Schema error for {location}/{kind}: field '{field}': {message}")]
    Schema {
        location: String,
        kind: RecordKind,
        field: String,
        message: String,
    },

    #[error("Write error at {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Parquet write error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Invalid run state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Stage {stage} failed for {failed} of {total} locations")]
    StageFailed {
        stage: RunStage,
        failed: usize,
        total: usize,
    },

    #[error("Missing required data: {0}")]
    MissingData(String),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),
}

impl PipelineError {
    pub fn write(path: &std::path::Path, source: std::io::Error) -> Self {
        PipelineError::Write {
            path: path.display().to_string(),
            source,
        }
    }
}

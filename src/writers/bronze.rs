use std::path::PathBuf;

use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::models::FetchRecord;
use crate::utils::LakeLayout;

/// Writes fetch records into the bronze archive as pretty-printed JSON.
/// The artifact path is a pure function of the record key, so storing the
/// same record again rewrites the same file instead of duplicating it.
pub struct BronzeWriter {
    layout: LakeLayout,
}

impl BronzeWriter {
    pub fn new(layout: LakeLayout) -> Self {
        Self { layout }
    }

    pub fn store(&self, record: &FetchRecord) -> Result<PathBuf> {
        let dir = self.layout.bronze_dir();
        std::fs::create_dir_all(&dir).map_err(|e| PipelineError::write(&dir, e))?;

        let path = self.layout.bronze_artifact(record);
        let json = serde_json::to_string_pretty(record)?;
        std::fs::write(&path, json).map_err(|e| PipelineError::write(&path, e))?;

        debug!(
            location = %record.location.name,
            kind = %record.kind,
            path = %path.display(),
            "stored bronze artifact"
        );
        Ok(path)
    }

    pub fn store_all(&self, records: &[FetchRecord]) -> Result<Vec<PathBuf>> {
        records.iter().map(|record| self.store(record)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Location, RecordKind};
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use tempfile::TempDir;

    fn record() -> FetchRecord {
        FetchRecord::new(
            Location::new("Paris", 48.86, 2.35),
            RecordKind::Hourly,
            Utc.with_ymd_and_hms(2024, 6, 1, 6, 0, 0).unwrap(),
            json!({"time": ["2024-06-01T00:00"], "temperature_2m": [15.5]}),
        )
    }

    #[test]
    fn test_store_round_trips_envelope() {
        let temp = TempDir::new().unwrap();
        let writer = BronzeWriter::new(LakeLayout::new(temp.path()));

        let path = writer.store(&record()).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        let restored: FetchRecord = serde_json::from_str(&raw).unwrap();

        assert_eq!(restored.location.name, "Paris");
        assert_eq!(restored.kind, RecordKind::Hourly);
        assert_eq!(restored.payload["temperature_2m"][0], json!(15.5));
    }

    #[test]
    fn test_store_is_idempotent_per_key() {
        let temp = TempDir::new().unwrap();
        let writer = BronzeWriter::new(LakeLayout::new(temp.path()));

        let first = writer.store(&record()).unwrap();
        let second = writer.store(&record()).unwrap();
        assert_eq!(first, second);

        let entries: Vec<_> = std::fs::read_dir(writer.layout.bronze_dir())
            .unwrap()
            .collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_store_all() {
        let temp = TempDir::new().unwrap();
        let writer = BronzeWriter::new(LakeLayout::new(temp.path()));

        let mut daily = record();
        daily.kind = RecordKind::Daily;

        let paths = writer.store_all(&[record(), daily]).unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths.iter().all(|p| p.exists()));
    }
}

use std::path::Path;

use tracing::warn;

use crate::error::Result;
use crate::models::FetchRecord;
use crate::utils::LakeLayout;

/// Scans the bronze directory back into fetch records. The directory may
/// hold artifacts from many runs; the scan is tolerant of foreign files and
/// never fails on a single unreadable artifact.
pub struct BronzeReader {
    layout: LakeLayout,
}

impl BronzeReader {
    pub fn new(layout: LakeLayout) -> Self {
        Self { layout }
    }

    /// Read the whole archive, ordered by fetched_at so that downstream
    /// last-write-wins deduplication is deterministic. A missing bronze
    /// directory reads as an empty archive.
    pub fn scan(&self) -> Result<Vec<FetchRecord>> {
        let dir = self.layout.bronze_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();

            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            match Self::read_artifact(&path) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "skipping unreadable bronze artifact"
                    );
                }
            }
        }

        records.sort_by(|a, b| {
            a.fetched_at
                .cmp(&b.fetched_at)
                .then_with(|| a.location.name.cmp(&b.location.name))
                .then_with(|| a.kind.cmp(&b.kind))
        });

        Ok(records)
    }

    /// Parse one artifact file back into its envelope.
    pub fn read_artifact(path: &Path) -> Result<FetchRecord> {
        let contents = std::fs::read_to_string(path)?;
        let record: FetchRecord = serde_json::from_str(&contents)?;
        Ok(record)
    }

    /// Number of artifacts on disk, for run summaries.
    pub fn artifact_count(&self) -> Result<usize> {
        Ok(self.scan()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Location, RecordKind};
    use crate::writers::BronzeWriter;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use tempfile::TempDir;

    fn record(name: &str, kind: RecordKind, hour: u32) -> FetchRecord {
        FetchRecord::new(
            Location::new(name, 48.85, 2.35),
            kind,
            Utc.with_ymd_and_hms(2024, 6, 1, hour, 0, 0).unwrap(),
            json!({"time": ["2024-06-01T00:00"], "temperature_2m": [15.0]}),
        )
    }

    #[test]
    fn test_scan_missing_directory_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let reader = BronzeReader::new(LakeLayout::new(temp_dir.path().join("nowhere")));

        assert!(reader.scan().unwrap().is_empty());
    }

    #[test]
    fn test_scan_orders_by_fetched_at() {
        let temp_dir = TempDir::new().unwrap();
        let layout = LakeLayout::new(temp_dir.path());
        let writer = BronzeWriter::new(layout.clone());

        writer.store(&record("Paris", RecordKind::Hourly, 12)).unwrap();
        writer.store(&record("Tokyo", RecordKind::Hourly, 6)).unwrap();
        writer.store(&record("Paris", RecordKind::Daily, 6)).unwrap();

        let reader = BronzeReader::new(layout);
        let records = reader.scan().unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].location.name, "Paris");
        assert_eq!(records[0].kind, RecordKind::Daily);
        assert_eq!(records[1].location.name, "Tokyo");
        assert_eq!(records[2].location.name, "Paris");
        assert_eq!(records[2].kind, RecordKind::Hourly);
    }

    #[test]
    fn test_scan_skips_foreign_files() {
        let temp_dir = TempDir::new().unwrap();
        let layout = LakeLayout::new(temp_dir.path());
        let writer = BronzeWriter::new(layout.clone());

        writer.store(&record("Paris", RecordKind::Hourly, 12)).unwrap();
        std::fs::write(layout.bronze_dir().join("notes.txt"), "not an artifact").unwrap();
        std::fs::write(layout.bronze_dir().join("broken.json"), "{ nope").unwrap();

        let reader = BronzeReader::new(layout);
        let records = reader.scan().unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].location.name, "Paris");
    }
}

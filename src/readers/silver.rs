use std::fs::File;
use std::path::{Path, PathBuf};

use arrow::array::{Array, Float64Array, StringArray, TimestampSecondArray};
use arrow::record_batch::RecordBatch;
use chrono::DateTime;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use crate::error::{PipelineError, Result};
use crate::models::{Metric, ObservationRow, RecordKind};
use crate::utils::LakeLayout;

/// Reads silver observation tables back into rows. The aggregate stage goes
/// through here so gold is always derived from what silver actually holds,
/// not from what the normalizer last emitted in memory.
pub struct SilverReader {
    layout: LakeLayout,
}

impl SilverReader {
    pub fn new(layout: LakeLayout) -> Self {
        Self { layout }
    }

    /// Read every per-location table of one kind, merged and sorted by
    /// (location, timestamp). A missing partition reads as empty.
    pub fn read_kind(&self, kind: RecordKind) -> Result<Vec<ObservationRow>> {
        let dir = self.layout.silver_dir(kind);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut tables: Vec<PathBuf> = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("parquet") {
                tables.push(path);
            }
        }
        tables.sort();

        let mut rows = Vec::new();
        for path in &tables {
            rows.extend(self.read_table(path)?);
        }
        rows.sort_by(|a, b| {
            a.location
                .cmp(&b.location)
                .then_with(|| a.timestamp.cmp(&b.timestamp))
        });

        Ok(rows)
    }

    /// Read one observation table in full.
    pub fn read_table(&self, path: &Path) -> Result<Vec<ObservationRow>> {
        let file = File::open(path)?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?
            .with_batch_size(8192)
            .build()?;

        let mut rows = Vec::new();
        for batch_result in reader {
            let batch = batch_result?;
            extract_rows(&batch, &mut rows)?;
        }

        Ok(rows)
    }
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, index: usize, name: &str) -> Result<&'a T> {
    batch
        .column(index)
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| PipelineError::InvalidFormat(format!("invalid column type for '{}'", name)))
}

fn extract_rows(batch: &RecordBatch, rows: &mut Vec<ObservationRow>) -> Result<()> {
    let locations = column::<StringArray>(batch, 0, "location")?;
    let kinds = column::<StringArray>(batch, 1, "kind")?;
    let timestamps = column::<TimestampSecondArray>(batch, 2, "timestamp")?;

    // Metric columns sit between the key columns and the lineage columns,
    // in the same order the writer lays them out.
    let mut metric_columns = Vec::with_capacity(8);
    for (offset, metric) in Metric::INSTANTANEOUS
        .iter()
        .chain(Metric::DAILY.iter())
        .enumerate()
    {
        metric_columns.push((
            *metric,
            column::<Float64Array>(batch, 3 + offset, metric.as_str())?,
        ));
    }

    let sources = column::<StringArray>(batch, 11, "source")?;
    let ingested = column::<TimestampSecondArray>(batch, 12, "ingested_at")?;

    rows.reserve(batch.num_rows());
    for i in 0..batch.num_rows() {
        let kind: RecordKind = kinds.value(i).parse()?;
        let timestamp = DateTime::from_timestamp(timestamps.value(i), 0)
            .ok_or_else(|| {
                PipelineError::InvalidFormat(format!(
                    "timestamp out of range: {}",
                    timestamps.value(i)
                ))
            })?
            .naive_utc();
        let ingested_at = DateTime::from_timestamp(ingested.value(i), 0).ok_or_else(|| {
            PipelineError::InvalidFormat(format!(
                "ingestion timestamp out of range: {}",
                ingested.value(i)
            ))
        })?;

        let mut row = ObservationRow::new(
            locations.value(i),
            kind,
            timestamp,
            sources.value(i),
            ingested_at,
        );
        for (metric, values) in &metric_columns {
            let value = if values.is_null(i) {
                None
            } else {
                Some(values.value(i))
            };
            row.set_metric(*metric, value);
        }
        rows.push(row);
    }

    Ok(())
}

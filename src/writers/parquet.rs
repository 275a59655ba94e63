use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{
    ArrayRef, BooleanArray, Date32Array, Float64Array, StringArray, TimestampSecondArray,
    UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::Datelike;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, GzipLevel};
use parquet::file::properties::WriterProperties;

use crate::error::{PipelineError, Result};
use crate::models::{AlertRow, FeatureRow, Metric, ObservationRow, SummaryRow};
use crate::utils::constants::{DEFAULT_ROW_GROUP_SIZE, UNIX_EPOCH_DAYS_FROM_CE};

/// Writes the silver and gold tables. One instance carries the compression
/// and row-group tuning for every table it writes.
pub struct ParquetTableWriter {
    compression: Compression,
    row_group_size: usize,
}

impl ParquetTableWriter {
    pub fn new() -> Self {
        Self {
            compression: Compression::SNAPPY,
            row_group_size: DEFAULT_ROW_GROUP_SIZE,
        }
    }

    pub fn with_compression(mut self, compression: &str) -> Result<Self> {
        self.compression = match compression.to_lowercase().as_str() {
            "snappy" => Compression::SNAPPY,
            "gzip" => Compression::GZIP(GzipLevel::default()),
            "lz4" => Compression::LZ4,
            "zstd" => Compression::ZSTD(parquet::basic::ZstdLevel::default()),
            "none" => Compression::UNCOMPRESSED,
            _ => {
                return Err(PipelineError::Config(format!(
                    "Unsupported compression: {}",
                    compression
                )))
            }
        };
        Ok(self)
    }

    pub fn with_row_group_size(mut self, size: usize) -> Self {
        self.row_group_size = size;
        self
    }

    /// Write silver observation rows. An empty row set writes nothing.
    pub fn write_observations(&self, rows: &[ObservationRow], path: &Path) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let schema = observation_schema();
        let batch = observations_to_batch(rows, schema.clone())?;
        self.write_batch(schema, &batch, path)
    }

    /// Write gold summary rows (daily or weekly).
    pub fn write_summaries(&self, rows: &[SummaryRow], path: &Path) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let schema = summary_schema();
        let batch = summaries_to_batch(rows, schema.clone())?;
        self.write_batch(schema, &batch, path)
    }

    pub fn write_alerts(&self, rows: &[AlertRow], path: &Path) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let schema = alert_schema();
        let batch = alerts_to_batch(rows, schema.clone())?;
        self.write_batch(schema, &batch, path)
    }

    pub fn write_features(&self, rows: &[FeatureRow], path: &Path) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let schema = feature_schema();
        let batch = features_to_batch(rows, schema.clone())?;
        self.write_batch(schema, &batch, path)
    }

    fn write_batch(&self, schema: Arc<Schema>, batch: &RecordBatch, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| PipelineError::write(path, e))?;
        let props = WriterProperties::builder()
            .set_compression(self.compression)
            .set_max_row_group_size(self.row_group_size)
            .build();

        let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;
        writer.write(batch)?;
        writer.close()?;

        Ok(())
    }

    /// Row-group statistics for a table, for the `info` command.
    pub fn file_info(&self, path: &Path) -> Result<ParquetFileInfo> {
        use parquet::file::reader::{FileReader, SerializedFileReader};

        let file = File::open(path)?;
        let reader = SerializedFileReader::new(file)?;
        let metadata = reader.metadata();

        let total_rows = metadata.file_metadata().num_rows();
        let row_groups = metadata.num_row_groups();
        let file_size = std::fs::metadata(path)?.len();

        let mut row_group_sizes = Vec::new();
        for i in 0..row_groups {
            row_group_sizes.push(metadata.row_group(i).num_rows());
        }

        Ok(ParquetFileInfo {
            total_rows,
            row_groups: row_groups as i32,
            row_group_sizes,
            file_size,
        })
    }
}

impl Default for ParquetTableWriter {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn date_to_arrow_days(date: chrono::NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

pub(crate) fn observation_schema() -> Arc<Schema> {
    let mut fields = vec![
        Field::new("location", DataType::Utf8, false),
        Field::new("kind", DataType::Utf8, false),
        Field::new(
            "timestamp",
            DataType::Timestamp(TimeUnit::Second, None),
            false,
        ),
    ];
    for metric in Metric::INSTANTANEOUS.iter().chain(Metric::DAILY.iter()) {
        fields.push(Field::new(metric.as_str(), DataType::Float64, true));
    }
    fields.push(Field::new("source", DataType::Utf8, false));
    fields.push(Field::new(
        "ingested_at",
        DataType::Timestamp(TimeUnit::Second, None),
        false,
    ));

    Arc::new(Schema::new(fields))
}

fn observations_to_batch(rows: &[ObservationRow], schema: Arc<Schema>) -> Result<RecordBatch> {
    let locations: Vec<String> = rows.iter().map(|r| r.location.clone()).collect();
    let kinds: Vec<String> = rows.iter().map(|r| r.kind.as_str().to_string()).collect();
    let timestamps: Vec<i64> = rows
        .iter()
        .map(|r| r.timestamp.and_utc().timestamp())
        .collect();
    let sources: Vec<String> = rows.iter().map(|r| r.source.clone()).collect();
    let ingested: Vec<i64> = rows.iter().map(|r| r.ingested_at.timestamp()).collect();

    let mut columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(locations)),
        Arc::new(StringArray::from(kinds)),
        Arc::new(TimestampSecondArray::from(timestamps)),
    ];
    for metric in Metric::INSTANTANEOUS.iter().chain(Metric::DAILY.iter()) {
        let values: Vec<Option<f64>> = rows.iter().map(|r| r.metric(*metric)).collect();
        columns.push(Arc::new(Float64Array::from(values)));
    }
    columns.push(Arc::new(StringArray::from(sources)));
    columns.push(Arc::new(TimestampSecondArray::from(ingested)));

    let batch = RecordBatch::try_new(schema, columns)?;
    Ok(batch)
}

pub(crate) fn summary_schema() -> Arc<Schema> {
    let mut fields = vec![
        Field::new("location", DataType::Utf8, false),
        Field::new("period", DataType::Utf8, false),
        Field::new("period_start", DataType::Date32, false),
    ];
    for metric in Metric::INSTANTANEOUS {
        fields.push(Field::new(
            format!("{}_min", metric),
            DataType::Float64,
            true,
        ));
        fields.push(Field::new(
            format!("{}_max", metric),
            DataType::Float64,
            true,
        ));
        fields.push(Field::new(
            format!("{}_mean", metric),
            DataType::Float64,
            true,
        ));
        fields.push(Field::new(
            format!("{}_count", metric),
            DataType::UInt32,
            true,
        ));
    }
    fields.push(Field::new("weather_label", DataType::Utf8, true));

    Arc::new(Schema::new(fields))
}

fn summaries_to_batch(rows: &[SummaryRow], schema: Arc<Schema>) -> Result<RecordBatch> {
    let locations: Vec<String> = rows.iter().map(|r| r.location.clone()).collect();
    let periods: Vec<String> = rows.iter().map(|r| r.period.as_str().to_string()).collect();
    let starts: Vec<i32> = rows.iter().map(|r| date_to_arrow_days(r.period_start)).collect();

    let mut columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(locations)),
        Arc::new(StringArray::from(periods)),
        Arc::new(Date32Array::from(starts)),
    ];
    for metric in Metric::INSTANTANEOUS {
        let aggregates: Vec<_> = rows.iter().map(|r| r.aggregate(metric)).collect();
        let mins: Vec<Option<f64>> = aggregates.iter().map(|a| a.map(|x| x.min)).collect();
        let maxs: Vec<Option<f64>> = aggregates.iter().map(|a| a.map(|x| x.max)).collect();
        let means: Vec<Option<f64>> = aggregates.iter().map(|a| a.map(|x| x.mean)).collect();
        let counts: Vec<Option<u32>> = aggregates
            .iter()
            .map(|a| a.map(|x| x.count as u32))
            .collect();

        columns.push(Arc::new(Float64Array::from(mins)));
        columns.push(Arc::new(Float64Array::from(maxs)));
        columns.push(Arc::new(Float64Array::from(means)));
        columns.push(Arc::new(UInt32Array::from(counts)));
    }
    let labels: Vec<Option<String>> = rows
        .iter()
        .map(|r| r.weather_label.map(|l| l.as_str().to_string()))
        .collect();
    columns.push(Arc::new(StringArray::from(labels)));

    let batch = RecordBatch::try_new(schema, columns)?;
    Ok(batch)
}

pub(crate) fn alert_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("location", DataType::Utf8, false),
        Field::new("date", DataType::Date32, false),
        Field::new("heat_alert", DataType::Boolean, false),
        Field::new("storm_alert", DataType::Boolean, false),
        Field::new("rain_alert", DataType::Boolean, false),
        Field::new("risk_level", DataType::Utf8, false),
    ]))
}

fn alerts_to_batch(rows: &[AlertRow], schema: Arc<Schema>) -> Result<RecordBatch> {
    let locations: Vec<String> = rows.iter().map(|r| r.location.clone()).collect();
    let dates: Vec<i32> = rows.iter().map(|r| date_to_arrow_days(r.date)).collect();
    let heat: Vec<bool> = rows.iter().map(|r| r.heat_alert).collect();
    let storm: Vec<bool> = rows.iter().map(|r| r.storm_alert).collect();
    let rain: Vec<bool> = rows.iter().map(|r| r.rain_alert).collect();
    let risk: Vec<String> = rows
        .iter()
        .map(|r| r.risk_level.as_str().to_string())
        .collect();

    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(StringArray::from(locations)),
            Arc::new(Date32Array::from(dates)),
            Arc::new(BooleanArray::from(heat)),
            Arc::new(BooleanArray::from(storm)),
            Arc::new(BooleanArray::from(rain)),
            Arc::new(StringArray::from(risk)),
        ],
    )?;
    Ok(batch)
}

pub(crate) fn feature_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("location", DataType::Utf8, false),
        Field::new("date", DataType::Date32, false),
        Field::new("temperature_range", DataType::Float64, true),
        Field::new("humidity_index", DataType::Float64, true),
        Field::new("wind_chill", DataType::Float64, true),
    ]))
}

fn features_to_batch(rows: &[FeatureRow], schema: Arc<Schema>) -> Result<RecordBatch> {
    let locations: Vec<String> = rows.iter().map(|r| r.location.clone()).collect();
    let dates: Vec<i32> = rows.iter().map(|r| date_to_arrow_days(r.date)).collect();
    let ranges: Vec<Option<f64>> = rows.iter().map(|r| r.temperature_range).collect();
    let humidity: Vec<Option<f64>> = rows.iter().map(|r| r.humidity_index).collect();
    let chill: Vec<Option<f64>> = rows.iter().map(|r| r.wind_chill).collect();

    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(StringArray::from(locations)),
            Arc::new(Date32Array::from(dates)),
            Arc::new(Float64Array::from(ranges)),
            Arc::new(Float64Array::from(humidity)),
            Arc::new(Float64Array::from(chill)),
        ],
    )?;
    Ok(batch)
}

#[derive(Debug)]
pub struct ParquetFileInfo {
    pub total_rows: i64,
    pub row_groups: i32,
    pub row_group_sizes: Vec<i64>,
    pub file_size: u64,
}

impl ParquetFileInfo {
    pub fn summary(&self) -> String {
        format!(
            "Parquet File Summary:\n\
            - Total rows: {}\n\
            - Row groups: {}\n\
            - File size: {:.2} MB\n\
            - Avg rows per group: {:.0}",
            self.total_rows,
            self.row_groups,
            self.file_size as f64 / 1_048_576.0,
            self.total_rows as f64 / self.row_groups.max(1) as f64
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Period, RecordKind, RiskLevel};
    use chrono::{NaiveDate, Utc};
    use tempfile::NamedTempFile;

    fn observation(hour: u32, temperature: Option<f64>) -> ObservationRow {
        let timestamp = NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap();
        let mut row = ObservationRow::new(
            "Paris",
            RecordKind::Hourly,
            timestamp,
            "paris_hourly_20240601_060000",
            Utc::now(),
        );
        row.temperature = temperature;
        row
    }

    #[test]
    fn test_write_empty_rows_writes_nothing() {
        let writer = ParquetTableWriter::new();
        let temp_file = NamedTempFile::new().unwrap();

        writer.write_observations(&[], temp_file.path()).unwrap();
        assert_eq!(std::fs::metadata(temp_file.path()).unwrap().len(), 0);
    }

    #[test]
    fn test_write_observations() {
        let writer = ParquetTableWriter::new();
        let temp_file = NamedTempFile::new().unwrap();

        let rows = vec![observation(0, Some(15.0)), observation(1, None)];
        writer.write_observations(&rows, temp_file.path()).unwrap();

        let info = writer.file_info(temp_file.path()).unwrap();
        assert_eq!(info.total_rows, 2);
        assert!(info.file_size > 0);
    }

    #[test]
    fn test_write_summary_and_alert_tables() {
        let writer = ParquetTableWriter::new();
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();

        let summary_file = NamedTempFile::new().unwrap();
        let summaries = vec![SummaryRow::new("Paris", Period::Day, date)];
        writer
            .write_summaries(&summaries, summary_file.path())
            .unwrap();
        assert_eq!(writer.file_info(summary_file.path()).unwrap().total_rows, 1);

        let alert_file = NamedTempFile::new().unwrap();
        let alerts = vec![AlertRow::evaluate(
            "Paris",
            date,
            Some(40.0),
            Some(60.0),
            None,
        )];
        writer.write_alerts(&alerts, alert_file.path()).unwrap();

        let feature_file = NamedTempFile::new().unwrap();
        let features = vec![FeatureRow::derive(
            "Paris",
            date,
            Some(30.0),
            Some(20.0),
            Some(10.0),
            Some(0.0),
        )];
        writer.write_features(&features, feature_file.path()).unwrap();

        assert_eq!(alerts[0].risk_level, RiskLevel::High);
        assert!(writer.file_info(alert_file.path()).unwrap().file_size > 0);
        assert!(writer.file_info(feature_file.path()).unwrap().file_size > 0);
    }

    #[test]
    fn test_compression_options() {
        for compression in ["snappy", "gzip", "lz4", "zstd", "none"] {
            assert!(ParquetTableWriter::new()
                .with_compression(compression)
                .is_ok());
        }
        assert!(ParquetTableWriter::new().with_compression("brotli9").is_err());
    }
}

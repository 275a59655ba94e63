use std::collections::{BTreeMap, HashMap};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rayon::prelude::*;
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{PipelineError, Result};
use crate::models::{FetchRecord, Metric, ObservationRow, RecordKind};
use crate::utils::progress::ProgressReporter;
use crate::utils::sanitize;

/// Counters accumulated over one normalization pass.
#[derive(Debug, Clone, Default)]
pub struct NormalizeReport {
    pub records_processed: usize,
    pub records_skipped: usize,
    pub rows_emitted: usize,
    pub rows_skipped: usize,
    pub fields_degraded: usize,
    pub duplicates_replaced: usize,
}

impl NormalizeReport {
    pub fn generate_summary(&self) -> String {
        let mut summary = String::new();

        summary.push_str("=== Normalization Report ===\n");
        summary.push_str(&format!("Records processed: {}\n", self.records_processed));
        summary.push_str(&format!("Records skipped: {}\n", self.records_skipped));
        summary.push_str(&format!("Rows emitted: {}\n", self.rows_emitted));
        summary.push_str(&format!("Rows skipped (bad time): {}\n", self.rows_skipped));
        summary.push_str(&format!("Fields degraded to null: {}\n", self.fields_degraded));
        summary.push_str(&format!(
            "Duplicate keys replaced: {}\n",
            self.duplicates_replaced
        ));

        summary
    }
}

#[derive(Default)]
struct FlattenCounts {
    rows_skipped: usize,
    fields_degraded: usize,
}

/// Flattens raw bronze records into typed silver rows.
///
/// Field-level problems never fail a record: a value that cannot be coerced
/// to a number becomes null with a warning. Only structurally unusable
/// payloads (not an object, no time axis) error, and the batch entry points
/// skip those records rather than aborting the pass.
pub struct Normalizer {
    max_workers: usize,
}

impl Normalizer {
    pub fn new(max_workers: usize) -> Self {
        Self { max_workers }
    }

    /// Flatten one bronze record. Pure: the same record always yields the
    /// same rows, so re-normalizing is idempotent.
    pub fn normalize(&self, record: &FetchRecord) -> Result<Vec<ObservationRow>> {
        let mut counts = FlattenCounts::default();
        self.flatten(record, &mut counts)
    }

    /// Flatten a batch in fetched_at order and deduplicate by
    /// (location, kind, timestamp), last write wins.
    pub fn normalize_all(&self, records: &[FetchRecord]) -> (Vec<ObservationRow>, NormalizeReport) {
        let ordered = order_by_fetch(records);
        let mut report = NormalizeReport::default();

        let flattened = ordered.into_iter().map(|record| {
            let mut counts = FlattenCounts::default();
            self.flatten(record, &mut counts).map(|rows| (rows, counts))
        });
        let rows = fold_deduplicated(flattened, &mut report);

        (rows, report)
    }

    /// Archive-wide variant: flattens records on a rayon pool bounded by
    /// `max_workers`, then deduplicates sequentially in fetched_at order.
    pub fn normalize_archive(
        &self,
        records: &[FetchRecord],
        progress: Option<&ProgressReporter>,
    ) -> Result<(Vec<ObservationRow>, NormalizeReport)> {
        let ordered = order_by_fetch(records);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.max_workers)
            .build()
            .map_err(|e| PipelineError::Config(e.to_string()))?;

        // collect() preserves input order, which fold_deduplicated relies on
        let flattened: Vec<Result<(Vec<ObservationRow>, FlattenCounts)>> = pool.install(|| {
            ordered
                .par_iter()
                .map(|record| {
                    let mut counts = FlattenCounts::default();
                    let result = self.flatten(record, &mut counts).map(|rows| (rows, counts));
                    if let Some(p) = progress {
                        p.increment(1);
                    }
                    result
                })
                .collect()
        });

        let mut report = NormalizeReport::default();
        let rows = fold_deduplicated(flattened, &mut report);

        if let Some(p) = progress {
            p.finish_with_message(&format!("Normalized {} rows", report.rows_emitted));
        }

        Ok((rows, report))
    }

    fn flatten(
        &self,
        record: &FetchRecord,
        counts: &mut FlattenCounts,
    ) -> Result<Vec<ObservationRow>> {
        let obj = record
            .payload
            .as_object()
            .ok_or_else(|| schema_error(record, "payload", "expected a JSON object"))?;

        match record.kind {
            RecordKind::Current => Ok(self.flatten_flat(record, obj, counts)),
            RecordKind::Hourly | RecordKind::Daily => self.flatten_columns(record, obj, counts),
        }
    }

    /// current payloads: one flat object, exactly one row.
    fn flatten_flat(
        &self,
        record: &FetchRecord,
        obj: &Map<String, Value>,
        counts: &mut FlattenCounts,
    ) -> Vec<ObservationRow> {
        let raw_time = obj.get("time").and_then(Value::as_str);
        let Some(timestamp) = raw_time.and_then(|raw| parse_time(record.kind, raw)) else {
            warn!(
                location = %record.location.name,
                kind = %record.kind,
                "skipping current observation with unparseable time"
            );
            counts.rows_skipped += 1;
            return Vec::new();
        };

        let mut row = ObservationRow::new(
            record.location.name.clone(),
            record.kind,
            timestamp,
            record.artifact_stem(),
            record.fetched_at,
        );
        for (key, value) in obj {
            let Some(metric) = Metric::from_api_variable(key) else {
                continue;
            };
            let (coerced, degraded) = coerce_value(value);
            if degraded {
                warn!(
                    location = %record.location.name,
                    kind = %record.kind,
                    field = %key,
                    "degrading non-numeric value to null"
                );
                counts.fields_degraded += 1;
            }
            row.set_metric(metric, coerced);
        }

        vec![row]
    }

    /// hourly/daily payloads: parallel arrays keyed by variable name, one
    /// row per entry of the time axis.
    fn flatten_columns(
        &self,
        record: &FetchRecord,
        obj: &Map<String, Value>,
        counts: &mut FlattenCounts,
    ) -> Result<Vec<ObservationRow>> {
        let time = obj
            .get("time")
            .and_then(Value::as_array)
            .ok_or_else(|| schema_error(record, "time", "expected an array of timestamps"))?;

        let mut columns: Vec<(Metric, &str, &Vec<Value>)> = Vec::new();
        for (key, value) in obj {
            if key == "time" {
                continue;
            }
            let Some(metric) = Metric::from_api_variable(key) else {
                continue;
            };
            match value.as_array() {
                Some(column) => {
                    if column.len() != time.len() {
                        warn!(
                            location = %record.location.name,
                            kind = %record.kind,
                            field = %key,
                            expected = time.len(),
                            actual = column.len(),
                            "variable length does not match time axis"
                        );
                    }
                    columns.push((metric, key.as_str(), column));
                }
                None => {
                    warn!(
                        location = %record.location.name,
                        kind = %record.kind,
                        field = %key,
                        "expected an array; treating variable as absent"
                    );
                    counts.fields_degraded += 1;
                }
            }
        }

        let mut rows = Vec::with_capacity(time.len());
        for (i, raw) in time.iter().enumerate() {
            let Some(timestamp) = raw.as_str().and_then(|raw| parse_time(record.kind, raw))
            else {
                warn!(
                    location = %record.location.name,
                    kind = %record.kind,
                    index = i,
                    "skipping row with unparseable time value"
                );
                counts.rows_skipped += 1;
                continue;
            };

            let mut row = ObservationRow::new(
                record.location.name.clone(),
                record.kind,
                timestamp,
                record.artifact_stem(),
                record.fetched_at,
            );
            for (metric, key, column) in &columns {
                // A column shorter than the time axis reads as null past
                // its end.
                let value = match column.get(i) {
                    Some(v) => {
                        let (coerced, degraded) = coerce_value(v);
                        if degraded {
                            warn!(
                                location = %record.location.name,
                                kind = %record.kind,
                                field = %key,
                                index = i,
                                "degrading non-numeric value to null"
                            );
                            counts.fields_degraded += 1;
                        }
                        coerced
                    }
                    None => None,
                };
                row.set_metric(*metric, value);
            }
            rows.push(row);
        }

        Ok(rows)
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(num_cpus::get())
    }
}

/// Groups silver rows by their target table, keyed by (kind, location slug).
/// BTreeMap keeps write order deterministic.
pub fn partition_rows(
    rows: Vec<ObservationRow>,
) -> BTreeMap<(RecordKind, String), Vec<ObservationRow>> {
    let mut tables: BTreeMap<(RecordKind, String), Vec<ObservationRow>> = BTreeMap::new();
    for row in rows {
        tables
            .entry((row.kind, sanitize(&row.location)))
            .or_default()
            .push(row);
    }
    tables
}

fn order_by_fetch(records: &[FetchRecord]) -> Vec<&FetchRecord> {
    let mut ordered: Vec<&FetchRecord> = records.iter().collect();
    ordered.sort_by(|a, b| {
        a.fetched_at
            .cmp(&b.fetched_at)
            .then_with(|| a.location.name.cmp(&b.location.name))
            .then_with(|| a.kind.cmp(&b.kind))
    });
    ordered
}

fn fold_deduplicated(
    flattened: impl IntoIterator<Item = Result<(Vec<ObservationRow>, FlattenCounts)>>,
    report: &mut NormalizeReport,
) -> Vec<ObservationRow> {
    let mut deduped: HashMap<(String, RecordKind, NaiveDateTime), ObservationRow> = HashMap::new();

    for outcome in flattened {
        report.records_processed += 1;
        match outcome {
            Ok((rows, counts)) => {
                report.rows_skipped += counts.rows_skipped;
                report.fields_degraded += counts.fields_degraded;
                for row in rows {
                    if deduped.insert(row.key(), row).is_some() {
                        report.duplicates_replaced += 1;
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "skipping unusable bronze record");
                report.records_skipped += 1;
            }
        }
    }

    let mut rows: Vec<ObservationRow> = deduped.into_values().collect();
    rows.sort_by(|a, b| {
        a.location
            .cmp(&b.location)
            .then_with(|| a.kind.cmp(&b.kind))
            .then_with(|| a.timestamp.cmp(&b.timestamp))
    });
    report.rows_emitted = rows.len();

    rows
}

fn schema_error(record: &FetchRecord, field: &str, message: &str) -> PipelineError {
    PipelineError::Schema {
        location: record.location.name.clone(),
        kind: record.kind,
        field: field.to_string(),
        message: message.to_string(),
    }
}

fn parse_time(kind: RecordKind, raw: &str) -> Option<NaiveDateTime> {
    match kind {
        RecordKind::Daily => NaiveDate::parse_from_str(raw, kind.time_format())
            .ok()
            .map(|date| date.and_time(NaiveTime::MIN)),
        RecordKind::Current | RecordKind::Hourly => {
            NaiveDateTime::parse_from_str(raw, kind.time_format()).ok()
        }
    }
}

/// JSON numbers pass through, numeric strings parse, null stays null.
/// Everything else degrades to null; the bool marks the degradation.
fn coerce_value(value: &Value) -> (Option<f64>, bool) {
    match value {
        Value::Null => (None, false),
        Value::Number(n) => match n.as_f64() {
            Some(v) => (Some(v), false),
            None => (None, true),
        },
        Value::String(s) => match s.trim().parse::<f64>() {
            Ok(v) => (Some(v), false),
            Err(_) => (None, true),
        },
        _ => (None, true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Location;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn paris() -> Location {
        Location::new("Paris", 48.85, 2.35)
    }

    fn hourly_record(payload: Value) -> FetchRecord {
        FetchRecord::new(
            paris(),
            RecordKind::Hourly,
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
            payload,
        )
    }

    #[test]
    fn test_hourly_flattens_one_row_per_time_bucket() {
        let record = hourly_record(json!({
            "time": ["2024-06-01T00:00", "2024-06-01T01:00", "2024-06-01T02:00"],
            "temperature_2m": [15.0, 14.5, 14.0],
            "relative_humidity_2m": [80, 82, 85],
        }));

        let rows = Normalizer::new(1).normalize(&record).unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].temperature, Some(15.0));
        assert_eq!(rows[1].humidity, Some(82.0));
        assert_eq!(rows[2].timestamp.format("%H:%M").to_string(), "02:00");
        assert_eq!(rows[0].source, record.artifact_stem());
    }

    #[test]
    fn test_daily_maps_business_names_at_midnight() {
        let record = FetchRecord::new(
            paris(),
            RecordKind::Daily,
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
            json!({
                "time": ["2024-06-01"],
                "temperature_2m_max": [28.0],
                "temperature_2m_min": [14.0],
                "wind_speed_10m_max": [33.5],
                "precipitation_sum": [2.2],
            }),
        );

        let rows = Normalizer::new(1).normalize(&record).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].temp_max, Some(28.0));
        assert_eq!(rows[0].temp_min, Some(14.0));
        assert_eq!(rows[0].wind_speed_max, Some(33.5));
        assert_eq!(rows[0].precip_total, Some(2.2));
        assert_eq!(
            rows[0].timestamp.format("%Y-%m-%d %H:%M").to_string(),
            "2024-06-01 00:00"
        );
    }

    #[test]
    fn test_current_flattens_to_exactly_one_row() {
        let record = FetchRecord::new(
            paris(),
            RecordKind::Current,
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
            json!({
                "time": "2024-06-01T12:15",
                "interval": 900,
                "temperature_2m": 18.3,
                "wind_speed_10m": 12.0,
            }),
        );

        let rows = Normalizer::new(1).normalize(&record).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].temperature, Some(18.3));
        assert_eq!(rows[0].wind_speed, Some(12.0));
        assert_eq!(rows[0].humidity, None);
    }

    #[test]
    fn test_coercion_degrades_bad_values_to_null() {
        let record = hourly_record(json!({
            "time": ["2024-06-01T00:00", "2024-06-01T01:00", "2024-06-01T02:00"],
            "temperature_2m": ["15.5", true, null],
        }));

        let normalizer = Normalizer::new(1);
        let (rows, report) = normalizer.normalize_all(std::slice::from_ref(&record));

        assert_eq!(rows[0].temperature, Some(15.5));
        assert_eq!(rows[1].temperature, None);
        assert_eq!(rows[2].temperature, None);
        // true degrades; null is an ordinary missing value
        assert_eq!(report.fields_degraded, 1);
    }

    #[test]
    fn test_unknown_variables_are_ignored() {
        let record = hourly_record(json!({
            "time": ["2024-06-01T00:00"],
            "temperature_2m": [15.0],
            "soil_moisture_0_to_1cm": [0.3],
        }));

        let rows = Normalizer::new(1).normalize(&record).unwrap();

        assert_eq!(rows.len(), 1);
        assert!(rows[0].has_any_metric());
    }

    #[test]
    fn test_short_column_reads_null_past_its_end() {
        let record = hourly_record(json!({
            "time": ["2024-06-01T00:00", "2024-06-01T01:00"],
            "temperature_2m": [15.0],
        }));

        let rows = Normalizer::new(1).normalize(&record).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].temperature, Some(15.0));
        assert_eq!(rows[1].temperature, None);
    }

    #[test]
    fn test_unparseable_time_skips_only_that_row() {
        let record = hourly_record(json!({
            "time": ["2024-06-01T00:00", "yesterday-ish", "2024-06-01T02:00"],
            "temperature_2m": [15.0, 14.5, 14.0],
        }));

        let normalizer = Normalizer::new(1);
        let (rows, report) = normalizer.normalize_all(std::slice::from_ref(&record));

        assert_eq!(rows.len(), 2);
        assert_eq!(report.rows_skipped, 1);
        assert_eq!(rows[1].temperature, Some(14.0));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let record = hourly_record(json!({
            "time": ["2024-06-01T00:00", "2024-06-01T01:00"],
            "temperature_2m": [15.0, null],
            "wind_speed_10m": [10.0, 12.0],
        }));

        let normalizer = Normalizer::new(1);
        let first = normalizer.normalize(&record).unwrap();
        let second = normalizer.normalize(&record).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_last_write_wins_across_overlapping_fetches() {
        let earlier = FetchRecord::new(
            paris(),
            RecordKind::Hourly,
            Utc.with_ymd_and_hms(2024, 6, 1, 6, 0, 0).unwrap(),
            json!({
                "time": ["2024-06-01T00:00", "2024-06-01T01:00"],
                "temperature_2m": [15.0, 16.0],
            }),
        );
        let later = FetchRecord::new(
            paris(),
            RecordKind::Hourly,
            Utc.with_ymd_and_hms(2024, 6, 1, 18, 0, 0).unwrap(),
            json!({
                "time": ["2024-06-01T01:00", "2024-06-01T02:00"],
                "temperature_2m": [16.5, 17.0],
            }),
        );

        let normalizer = Normalizer::new(1);
        // Deduplication follows fetched_at, not argument order.
        let (rows, report) = normalizer.normalize_all(&[later.clone(), earlier.clone()]);

        assert_eq!(rows.len(), 3);
        assert_eq!(report.duplicates_replaced, 1);
        let overlapped = rows
            .iter()
            .find(|r| r.timestamp.format("%H").to_string() == "01")
            .unwrap();
        assert_eq!(overlapped.temperature, Some(16.5));
        assert_eq!(overlapped.source, later.artifact_stem());
    }

    #[test]
    fn test_structural_payload_errors_are_skipped_in_batch() {
        let broken = FetchRecord::new(
            paris(),
            RecordKind::Hourly,
            Utc.with_ymd_and_hms(2024, 6, 1, 6, 0, 0).unwrap(),
            json!([1, 2, 3]),
        );
        let missing_time = hourly_record(json!({"temperature_2m": [15.0]}));
        let good = hourly_record(json!({
            "time": ["2024-06-01T00:00"],
            "temperature_2m": [15.0],
        }));

        let normalizer = Normalizer::new(1);
        assert!(matches!(
            normalizer.normalize(&broken),
            Err(PipelineError::Schema { .. })
        ));

        let (rows, report) = normalizer.normalize_all(&[broken, missing_time, good]);
        assert_eq!(rows.len(), 1);
        assert_eq!(report.records_skipped, 2);
        assert_eq!(report.records_processed, 3);
    }

    #[test]
    fn test_partition_rows_groups_by_kind_and_slug() {
        let records = vec![
            hourly_record(json!({
                "time": ["2024-06-01T00:00"],
                "temperature_2m": [15.0],
            })),
            FetchRecord::new(
                Location::new("New York City", 40.71, -74.01),
                RecordKind::Daily,
                Utc.with_ymd_and_hms(2024, 6, 1, 6, 0, 0).unwrap(),
                json!({
                    "time": ["2024-06-01"],
                    "temperature_2m_max": [25.0],
                }),
            ),
        ];

        let normalizer = Normalizer::new(1);
        let (rows, _) = normalizer.normalize_all(&records);
        let tables = partition_rows(rows);

        let keys: Vec<_> = tables.keys().cloned().collect();
        assert_eq!(
            keys,
            vec![
                (RecordKind::Hourly, "paris".to_string()),
                (RecordKind::Daily, "new_york_city".to_string()),
            ]
        );
    }

    #[test]
    fn test_archive_normalization_matches_sequential() {
        let records: Vec<FetchRecord> = (0..4)
            .map(|i| {
                FetchRecord::new(
                    paris(),
                    RecordKind::Hourly,
                    Utc.with_ymd_and_hms(2024, 6, 1, 6 + i, 0, 0).unwrap(),
                    json!({
                        "time": [format!("2024-06-01T{:02}:00", i)],
                        "temperature_2m": [15.0 + i as f64],
                    }),
                )
            })
            .collect();

        let normalizer = Normalizer::new(2);
        let (sequential, _) = normalizer.normalize_all(&records);
        let (parallel, report) = normalizer.normalize_archive(&records, None).unwrap();

        assert_eq!(sequential, parallel);
        assert_eq!(report.rows_emitted, 4);
    }
}

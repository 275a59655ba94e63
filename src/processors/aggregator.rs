use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::models::{
    AlertRow, FeatureRow, Metric, MetricAggregate, ObservationRow, Period, RecordKind, SummaryRow,
};

/// Running min/max/sum/count over the non-null values of one metric.
#[derive(Default)]
struct MetricAccumulator {
    min: Option<f64>,
    max: Option<f64>,
    sum: f64,
    count: usize,
}

impl MetricAccumulator {
    fn push(&mut self, value: f64) {
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
        self.sum += value;
        self.count += 1;
    }

    /// `None` when nothing contributed: an empty bucket must never report
    /// a zero aggregate.
    fn finish(&self) -> Option<MetricAggregate> {
        match (self.min, self.max) {
            (Some(min), Some(max)) => Some(MetricAggregate {
                min,
                max,
                mean: self.sum / self.count as f64,
                count: self.count,
            }),
            _ => None,
        }
    }
}

/// Derives the gold tables from silver rows. Every method is a pure
/// function of its input: same rows in, same rows out, no reads or writes.
pub struct Aggregator;

impl Aggregator {
    pub fn new() -> Self {
        Self
    }

    /// Per-metric aggregates of the instantaneous-kind rows, grouped by
    /// (location, period bucket) and sorted by (location, period_start).
    /// A (location, bucket) pair present in the input always yields a row,
    /// even when every metric in it is null.
    pub fn summarize(&self, rows: &[ObservationRow], period: Period) -> Vec<SummaryRow> {
        let mut groups: BTreeMap<(String, NaiveDate), [MetricAccumulator; 4]> = BTreeMap::new();

        for row in rows {
            if row.kind == RecordKind::Daily {
                continue;
            }
            let bucket = period.bucket(row.timestamp);
            let accumulators = groups.entry((row.location.clone(), bucket)).or_default();
            for (slot, metric) in Metric::INSTANTANEOUS.iter().enumerate() {
                if let Some(value) = row.metric(*metric) {
                    accumulators[slot].push(value);
                }
            }
        }

        groups
            .into_iter()
            .map(|((location, period_start), accumulators)| {
                let mut summary = SummaryRow::new(location, period, period_start);
                for (slot, metric) in Metric::INSTANTANEOUS.iter().enumerate() {
                    summary.set_aggregate(*metric, accumulators[slot].finish());
                }
                summary
            })
            .collect()
    }

    /// Alert flags for each daily-kind row, sorted by (location, date).
    pub fn alerts(&self, rows: &[ObservationRow]) -> Vec<AlertRow> {
        let mut alerts: Vec<AlertRow> = rows
            .iter()
            .filter(|row| row.kind == RecordKind::Daily)
            .map(|row| {
                AlertRow::evaluate(
                    row.location.clone(),
                    row.timestamp.date(),
                    row.temp_max,
                    row.wind_speed_max,
                    row.precip_total,
                )
            })
            .collect();
        alerts.sort_by(|a, b| a.location.cmp(&b.location).then_with(|| a.date.cmp(&b.date)));
        alerts
    }

    /// Engineered features for each daily-kind row, sorted by
    /// (location, date).
    pub fn features(&self, rows: &[ObservationRow]) -> Vec<FeatureRow> {
        let mut features: Vec<FeatureRow> = rows
            .iter()
            .filter(|row| row.kind == RecordKind::Daily)
            .map(|row| {
                FeatureRow::derive(
                    row.location.clone(),
                    row.timestamp.date(),
                    row.temp_max,
                    row.temp_min,
                    row.wind_speed_max,
                    row.precip_total,
                )
            })
            .collect();
        features.sort_by(|a, b| a.location.cmp(&b.location).then_with(|| a.date.cmp(&b.date)));
        features
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

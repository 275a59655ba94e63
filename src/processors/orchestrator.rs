use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tracing::{error, info};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::fetchers::Fetcher;
use crate::models::{Location, Period, RecordKind};
use crate::processors::aggregator::Aggregator;
use crate::processors::normalizer::{partition_rows, Normalizer};
use crate::readers::{BronzeReader, SilverReader};
use crate::utils::constants::{
    GOLD_ALERTS, GOLD_DAILY_SUMMARY, GOLD_FEATURES, GOLD_WEEKLY_SUMMARY,
};
use crate::utils::LakeLayout;
use crate::writers::{BronzeWriter, ParquetTableWriter};

/// The pipeline stage an error is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Fetch,
    Normalize,
    Aggregate,
}

impl RunStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStage::Fetch => "fetch",
            RunStage::Normalize => "normalize",
            RunStage::Aggregate => "aggregate",
        }
    }
}

impl std::fmt::Display for RunStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position of one run in its lifecycle. A stage may only start once its
/// predecessor finished; `Failed` is reachable from the active states only,
/// never from `Pending` or a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Pending,
    Fetching,
    Fetched,
    Normalizing,
    Normalized,
    Aggregating,
    Done,
    Failed,
}

impl RunState {
    pub fn can_transition_to(&self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Pending, Fetching)
                | (Fetching, Fetched)
                | (Fetching, Failed)
                | (Fetched, Normalizing)
                | (Normalizing, Normalized)
                | (Normalizing, Failed)
                | (Normalized, Aggregating)
                | (Aggregating, Done)
                | (Aggregating, Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Pending => "pending",
            RunState::Fetching => "fetching",
            RunState::Fetched => "fetched",
            RunState::Normalizing => "normalizing",
            RunState::Normalized => "normalized",
            RunState::Aggregating => "aggregating",
            RunState::Done => "done",
            RunState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded failure, always attributable to a location, an optional
/// record kind, and the stage it happened in.
#[derive(Debug, Clone)]
pub struct RunFailure {
    pub location: String,
    pub kind: Option<RecordKind>,
    pub stage: RunStage,
    pub message: String,
}

/// Everything one run carries: the location list, the shared run timestamp,
/// the state machine position, and accumulated per-location failures. The
/// orchestrator threads this through the stages instead of keeping any
/// global mutable state.
pub struct RunContext {
    locations: Vec<Location>,
    started_at: DateTime<Utc>,
    state: RunState,
    failed: BTreeSet<String>,
    failures: Vec<RunFailure>,
}

impl RunContext {
    pub fn new(locations: Vec<Location>) -> Self {
        Self {
            locations,
            started_at: Utc::now(),
            state: RunState::Pending,
            failed: BTreeSet::new(),
            failures: Vec::new(),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    /// Move the run to `next`, refusing jumps the state machine forbids.
    pub fn advance(&mut self, next: RunState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(PipelineError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        info!(from = %self.state, to = %next, "run state transition");
        self.state = next;
        Ok(())
    }

    /// Record one location's failure. Siblings are unaffected; the failed
    /// location contributes no further data to this run.
    pub fn record_failure(
        &mut self,
        location: &str,
        kind: Option<RecordKind>,
        stage: RunStage,
        message: impl Into<String>,
    ) {
        let message = message.into();
        error!(
            location = %location,
            stage = %stage,
            kind = ?kind,
            message = %message,
            "location failed"
        );
        self.failed.insert(location.to_string());
        self.failures.push(RunFailure {
            location: location.to_string(),
            kind,
            stage,
            message,
        });
    }

    pub fn has_failed(&self, location: &str) -> bool {
        self.failed.contains(location)
    }

    pub fn all_failed(&self) -> bool {
        self.locations
            .iter()
            .all(|l| self.failed.contains(&l.name))
    }

    fn into_report(self, counts: StageCounts) -> RunReport {
        RunReport {
            started_at: self.started_at,
            final_state: self.state,
            locations_total: self.locations.len(),
            locations_failed: self.failed.len(),
            counts,
            failures: self.failures,
        }
    }
}

/// Row and record counts accumulated across the stages of one run.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageCounts {
    pub records_fetched: usize,
    pub artifacts_stored: usize,
    pub rows_normalized: usize,
    pub silver_tables_written: usize,
    pub daily_summaries: usize,
    pub weekly_summaries: usize,
    pub alerts: usize,
    pub features: usize,
}

/// Outcome of one run, consumed by the CLI for its summary and exit code.
#[derive(Debug)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub final_state: RunState,
    pub locations_total: usize,
    pub locations_failed: usize,
    pub counts: StageCounts,
    pub failures: Vec<RunFailure>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.final_state == RunState::Done && self.failures.is_empty()
    }

    pub fn first_failed_stage(&self) -> Option<RunStage> {
        self.failures.first().map(|f| f.stage)
    }

    pub fn generate_summary(&self) -> String {
        let mut summary = String::new();

        summary.push_str("=== Pipeline Run Report ===\n");
        summary.push_str(&format!(
            "Started: {}\n",
            self.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        summary.push_str(&format!("Final state: {}\n", self.final_state));
        summary.push_str(&format!(
            "Locations: {} total, {} failed\n",
            self.locations_total, self.locations_failed
        ));
        summary.push_str(&format!(
            "Fetched: {} records, {} bronze artifacts\n",
            self.counts.records_fetched, self.counts.artifacts_stored
        ));
        summary.push_str(&format!(
            "Silver: {} rows across {} tables\n",
            self.counts.rows_normalized, self.counts.silver_tables_written
        ));
        summary.push_str(&format!(
            "Gold: {} daily, {} weekly, {} alerts, {} features\n",
            self.counts.daily_summaries,
            self.counts.weekly_summaries,
            self.counts.alerts,
            self.counts.features
        ));

        if !self.failures.is_empty() {
            summary.push_str(&format!("\nFailures: {}\n", self.failures.len()));
            for (i, failure) in self.failures.iter().take(10).enumerate() {
                let kind = failure
                    .kind
                    .map(|k| format!(" ({})", k))
                    .unwrap_or_default();
                summary.push_str(&format!(
                    "  {}. {} [{}]{}: {}\n",
                    i + 1,
                    failure.location,
                    failure.stage,
                    kind,
                    failure.message
                ));
            }
        }

        summary
    }
}

/// Drives one run through fetch, normalize and aggregate with strict stage
/// barriers. Location failures are isolated: one location failing never
/// stops its siblings, and only a stage that loses every location marks the
/// whole run failed.
pub struct Orchestrator {
    config: PipelineConfig,
    fetcher: Arc<dyn Fetcher>,
    layout: LakeLayout,
}

impl Orchestrator {
    pub fn new(config: PipelineConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        let layout = config.layout();
        Self {
            config,
            fetcher,
            layout,
        }
    }

    pub async fn execute(&self, mut ctx: RunContext) -> Result<RunReport> {
        self.layout.ensure_dirs()?;
        let mut counts = StageCounts::default();

        ctx.advance(RunState::Fetching)?;
        self.fetch_stage(&mut ctx, &mut counts).await;
        if ctx.all_failed() {
            ctx.advance(RunState::Failed)?;
            return Ok(ctx.into_report(counts));
        }
        ctx.advance(RunState::Fetched)?;

        ctx.advance(RunState::Normalizing)?;
        self.normalize_stage(&mut ctx, &mut counts)?;
        if ctx.all_failed() {
            ctx.advance(RunState::Failed)?;
            return Ok(ctx.into_report(counts));
        }
        ctx.advance(RunState::Normalized)?;

        ctx.advance(RunState::Aggregating)?;
        self.aggregate_stage(&mut counts)?;
        ctx.advance(RunState::Done)?;

        Ok(ctx.into_report(counts))
    }

    /// Fan out one fetch per location, bounded by `max_concurrent_fetches`,
    /// and archive every returned record. A fetch or store failure marks
    /// that location only.
    async fn fetch_stage(&self, ctx: &mut RunContext, counts: &mut StageCounts) {
        let fetched_at = ctx.started_at();
        let fetcher = self.fetcher.clone();

        let outcomes: Vec<_> = stream::iter(ctx.locations().to_vec())
            .map(|location| {
                let fetcher = fetcher.clone();
                async move {
                    let result = fetcher.fetch(&location, fetched_at).await;
                    (location, result)
                }
            })
            .buffer_unordered(self.config.max_concurrent_fetches)
            .collect()
            .await;

        let writer = BronzeWriter::new(self.layout.clone());
        for (location, outcome) in outcomes {
            match outcome {
                Ok(records) => {
                    counts.records_fetched += records.len();
                    for record in &records {
                        match writer.store(record) {
                            Ok(_) => counts.artifacts_stored += 1,
                            Err(e) => {
                                ctx.record_failure(
                                    &location.name,
                                    Some(record.kind),
                                    RunStage::Fetch,
                                    e.to_string(),
                                );
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    let err = PipelineError::Fetch {
                        location: location.name.clone(),
                        source: e,
                    };
                    ctx.record_failure(&location.name, None, RunStage::Fetch, err.to_string());
                }
            }
        }
    }

    /// Rebuild every silver table from the full bronze archive. Rebuilding
    /// (rather than appending) is what keeps one row per key across
    /// overlapping fetch windows. A table write failure marks its location.
    fn normalize_stage(&self, ctx: &mut RunContext, counts: &mut StageCounts) -> Result<()> {
        let records = BronzeReader::new(self.layout.clone()).scan()?;
        let normalizer = Normalizer::new(self.config.max_workers);
        let (rows, report) = normalizer.normalize_all(&records);
        counts.rows_normalized = report.rows_emitted;
        info!(
            rows = report.rows_emitted,
            duplicates = report.duplicates_replaced,
            degraded = report.fields_degraded,
            skipped_records = report.records_skipped,
            "normalized bronze archive"
        );

        let writer = ParquetTableWriter::new().with_compression(&self.config.compression)?;
        for ((kind, slug), table_rows) in partition_rows(rows) {
            let path = self.layout.silver_table(kind, &slug);
            let location = table_rows
                .first()
                .map(|r| r.location.clone())
                .unwrap_or_else(|| slug.clone());
            match writer.write_observations(&table_rows, &path) {
                Ok(()) => counts.silver_tables_written += 1,
                Err(e) => {
                    ctx.record_failure(&location, Some(kind), RunStage::Normalize, e.to_string())
                }
            }
        }

        Ok(())
    }

    /// Recompute all four gold tables from silver. Summaries come from the
    /// hourly table, alerts and features from the daily table.
    fn aggregate_stage(&self, counts: &mut StageCounts) -> Result<()> {
        let reader = SilverReader::new(self.layout.clone());
        let hourly = reader.read_kind(RecordKind::Hourly)?;
        let daily = reader.read_kind(RecordKind::Daily)?;

        let aggregator = Aggregator::new();
        let daily_summaries = aggregator.summarize(&hourly, Period::Day);
        let weekly_summaries = aggregator.summarize(&hourly, Period::Week);
        let alerts = aggregator.alerts(&daily);
        let features = aggregator.features(&daily);

        counts.daily_summaries = daily_summaries.len();
        counts.weekly_summaries = weekly_summaries.len();
        counts.alerts = alerts.len();
        counts.features = features.len();

        let writer = ParquetTableWriter::new().with_compression(&self.config.compression)?;
        writer.write_summaries(&daily_summaries, &self.layout.gold_table(GOLD_DAILY_SUMMARY))?;
        writer.write_summaries(
            &weekly_summaries,
            &self.layout.gold_table(GOLD_WEEKLY_SUMMARY),
        )?;
        writer.write_alerts(&alerts, &self.layout.gold_table(GOLD_ALERTS))?;
        writer.write_features(&features, &self.layout.gold_table(GOLD_FEATURES))?;

        info!(
            daily = counts.daily_summaries,
            weekly = counts.weekly_summaries,
            alerts = counts.alerts,
            features = counts.features,
            "gold tables rebuilt"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiSettings, RetryPolicy};
    use crate::error::FetchError;
    use crate::models::FetchRecord;
    use async_trait::async_trait;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_legal_transition_chain() {
        let chain = [
            RunState::Pending,
            RunState::Fetching,
            RunState::Fetched,
            RunState::Normalizing,
            RunState::Normalized,
            RunState::Aggregating,
            RunState::Done,
        ];
        for pair in chain.windows(2) {
            assert!(
                pair[0].can_transition_to(pair[1]),
                "{} -> {} should be legal",
                pair[0],
                pair[1]
            );
        }
        assert!(RunState::Done.is_terminal());
    }

    #[test]
    fn test_illegal_jumps_rejected() {
        assert!(!RunState::Pending.can_transition_to(RunState::Normalizing));
        assert!(!RunState::Pending.can_transition_to(RunState::Failed));
        assert!(!RunState::Done.can_transition_to(RunState::Failed));
        assert!(!RunState::Fetched.can_transition_to(RunState::Aggregating));
        assert!(!RunState::Failed.can_transition_to(RunState::Fetching));
    }

    #[test]
    fn test_failed_reachable_from_active_states() {
        for state in [
            RunState::Fetching,
            RunState::Normalizing,
            RunState::Aggregating,
        ] {
            assert!(state.can_transition_to(RunState::Failed));
        }
    }

    #[test]
    fn test_advance_refuses_illegal_transition() {
        let mut ctx = RunContext::new(vec![Location::new("Paris", 48.85, 2.35)]);

        assert!(ctx.advance(RunState::Fetching).is_ok());
        let err = ctx.advance(RunState::Aggregating).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidTransition { .. }));
        assert_eq!(ctx.state(), RunState::Fetching);
    }

    #[test]
    fn test_failures_attributed_and_isolated() {
        let mut ctx = RunContext::new(vec![
            Location::new("Paris", 48.85, 2.35),
            Location::new("Tokyo", 35.68, 139.65),
        ]);

        ctx.record_failure("Paris", None, RunStage::Fetch, "boom");

        assert!(ctx.has_failed("Paris"));
        assert!(!ctx.has_failed("Tokyo"));
        assert!(!ctx.all_failed());

        ctx.record_failure("Tokyo", Some(RecordKind::Daily), RunStage::Normalize, "disk");
        assert!(ctx.all_failed());

        let report = ctx.into_report(StageCounts::default());
        assert_eq!(report.locations_failed, 2);
        assert_eq!(report.failures[0].stage, RunStage::Fetch);
        assert_eq!(report.failures[1].kind, Some(RecordKind::Daily));
    }

    #[test]
    fn test_report_summary_names_failures() {
        let mut ctx = RunContext::new(vec![Location::new("Paris", 48.85, 2.35)]);
        ctx.record_failure("Paris", None, RunStage::Fetch, "retries exhausted");

        let report = ctx.into_report(StageCounts::default());
        let summary = report.generate_summary();

        assert!(summary.contains("Paris [fetch]"));
        assert!(summary.contains("retries exhausted"));
        assert!(!report.is_success());
    }

    struct CannedFetcher;

    #[async_trait]
    impl Fetcher for CannedFetcher {
        async fn fetch(
            &self,
            location: &Location,
            fetched_at: DateTime<Utc>,
        ) -> std::result::Result<Vec<FetchRecord>, FetchError> {
            Ok(vec![
                FetchRecord::new(
                    location.clone(),
                    RecordKind::Hourly,
                    fetched_at,
                    json!({
                        "time": ["2024-06-01T00:00", "2024-06-01T01:00"],
                        "temperature_2m": [20.0, 22.0],
                    }),
                ),
                FetchRecord::new(
                    location.clone(),
                    RecordKind::Daily,
                    fetched_at,
                    json!({
                        "time": ["2024-06-01"],
                        "temperature_2m_max": [25.0],
                        "temperature_2m_min": [15.0],
                    }),
                ),
            ])
        }
    }

    fn test_config(root: &std::path::Path) -> PipelineConfig {
        PipelineConfig {
            locations: vec![Location::new("Paris", 48.85, 2.35)],
            api: ApiSettings::default(),
            retry: RetryPolicy::default(),
            lake_root: root.to_path_buf(),
            max_concurrent_fetches: 2,
            max_workers: 1,
            compression: "snappy".to_string(),
        }
    }

    #[tokio::test]
    async fn test_execute_runs_all_stages() {
        let temp = TempDir::new().unwrap();
        let config = test_config(temp.path());
        let locations = config.locations.clone();
        let orchestrator = Orchestrator::new(config, Arc::new(CannedFetcher));

        let report = orchestrator
            .execute(RunContext::new(locations))
            .await
            .unwrap();

        assert_eq!(report.final_state, RunState::Done);
        assert!(report.is_success());
        assert_eq!(report.counts.records_fetched, 2);
        assert_eq!(report.counts.artifacts_stored, 2);
        assert_eq!(report.counts.rows_normalized, 3);
        assert_eq!(report.counts.silver_tables_written, 2);
        assert_eq!(report.counts.daily_summaries, 1);
        assert_eq!(report.counts.alerts, 1);
    }

    struct FailingFetcher;

    #[async_trait]
    impl Fetcher for FailingFetcher {
        async fn fetch(
            &self,
            _location: &Location,
            _fetched_at: DateTime<Utc>,
        ) -> std::result::Result<Vec<FetchRecord>, FetchError> {
            Err(FetchError::Exhausted {
                attempts: 5,
                last: "connection refused".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_execute_fails_run_when_no_location_survives() {
        let temp = TempDir::new().unwrap();
        let config = test_config(temp.path());
        let locations = config.locations.clone();
        let orchestrator = Orchestrator::new(config, Arc::new(FailingFetcher));

        let report = orchestrator
            .execute(RunContext::new(locations))
            .await
            .unwrap();

        assert_eq!(report.final_state, RunState::Failed);
        assert_eq!(report.locations_failed, 1);
        assert_eq!(report.first_failed_stage(), Some(RunStage::Fetch));
        assert!(report.failures[0].message.contains("connection refused"));
    }
}

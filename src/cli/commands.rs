use std::sync::Arc;

use chrono::Utc;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::cli::args::{Cli, Commands};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::fetchers::{Fetcher, OpenMeteoClient};
use crate::models::{ObservationRow, Period, RecordKind};
use crate::processors::{partition_rows, Aggregator, Normalizer, Orchestrator, RunContext, RunStage};
use crate::readers::{BronzeReader, SilverReader};
use crate::utils::constants::{
    DEFAULT_LAKE_ROOT, GOLD_ALERTS, GOLD_DAILY_SUMMARY, GOLD_FEATURES, GOLD_WEEKLY_SUMMARY,
};
use crate::utils::progress::ProgressReporter;
use crate::utils::LakeLayout;
use crate::writers::{BronzeWriter, ParquetTableWriter};

pub async fn run(cli: Cli) -> Result<()> {
    init_logging(cli.verbose)?;

    match cli.command {
        Commands::Run => {
            let config = PipelineConfig::load(&cli.config)?;
            println!("Running pipeline for {} locations", config.locations.len());
            println!("Lake root: {}", config.lake_root.display());

            let fetcher = OpenMeteoClient::new(config.api.clone(), config.retry.clone())
                .map_err(|e| PipelineError::Config(e.to_string()))?;
            let locations = config.locations.clone();
            let orchestrator = Orchestrator::new(config, Arc::new(fetcher));

            let report = orchestrator.execute(RunContext::new(locations)).await?;
            println!("\n{}", report.generate_summary());

            if !report.is_success() {
                return Err(PipelineError::StageFailed {
                    stage: report.first_failed_stage().unwrap_or(RunStage::Fetch),
                    failed: report.locations_failed,
                    total: report.locations_total,
                });
            }

            println!("✅ Pipeline complete");
        }

        Commands::Fetch { location } => {
            let config = PipelineConfig::load(&cli.config)?;
            let locations = match &location {
                Some(name) => {
                    let found = config.location(name).cloned().ok_or_else(|| {
                        PipelineError::Config(format!("location '{}' is not configured", name))
                    })?;
                    vec![found]
                }
                None => config.locations.clone(),
            };

            println!("Fetching forecasts for {} locations...", locations.len());

            let layout = config.layout();
            layout.ensure_dirs()?;
            let fetcher = OpenMeteoClient::new(config.api.clone(), config.retry.clone())
                .map_err(|e| PipelineError::Config(e.to_string()))?;
            let writer = BronzeWriter::new(layout);
            let fetched_at = Utc::now();

            let progress =
                ProgressReporter::new(locations.len() as u64, "Fetching forecasts...", cli.silent);

            let mut stored = 0usize;
            let mut failed = 0usize;
            for location in &locations {
                match fetcher.fetch(location, fetched_at).await {
                    Ok(records) => match writer.store_all(&records) {
                        Ok(paths) => stored += paths.len(),
                        Err(e) => {
                            failed += 1;
                            progress.println(&format!("{}: {}", location.name, e));
                        }
                    },
                    Err(e) => {
                        failed += 1;
                        let err = PipelineError::Fetch {
                            location: location.name.clone(),
                            source: e,
                        };
                        progress.println(&err.to_string());
                    }
                }
                progress.increment(1);
            }
            progress.finish_with_message(&format!("Stored {} bronze artifacts", stored));

            if failed > 0 {
                println!("⚠️  {} of {} locations failed", failed, locations.len());
                return Err(PipelineError::StageFailed {
                    stage: RunStage::Fetch,
                    failed,
                    total: locations.len(),
                });
            }
            println!("✅ Stored {} bronze artifacts", stored);
        }

        Commands::Normalize { max_workers } => {
            let config = PipelineConfig::load(&cli.config)?;
            let layout = config.layout();
            layout.ensure_dirs()?;

            let records = BronzeReader::new(layout.clone()).scan()?;
            if records.is_empty() {
                println!("No bronze artifacts found - run fetch first");
                return Ok(());
            }
            println!("Normalizing {} bronze artifacts...", records.len());
            println!("Workers: {}", max_workers);

            let progress = ProgressReporter::new(
                records.len() as u64,
                "Normalizing archive...",
                cli.silent,
            );

            let normalizer = Normalizer::new(max_workers);
            let (rows, report) = normalizer.normalize_archive(&records, Some(&progress))?;

            println!("\n{}", report.generate_summary());

            let writer = ParquetTableWriter::new().with_compression(&config.compression)?;
            let mut tables = 0usize;
            for ((kind, slug), table_rows) in partition_rows(rows) {
                writer.write_observations(&table_rows, &layout.silver_table(kind, &slug))?;
                tables += 1;
            }

            println!("✅ Rebuilt {} silver tables", tables);
        }

        Commands::Aggregate => {
            let config = PipelineConfig::load(&cli.config)?;
            let layout = config.layout();
            layout.ensure_dirs()?;

            let reader = SilverReader::new(layout.clone());
            let hourly = reader.read_kind(RecordKind::Hourly)?;
            let daily = reader.read_kind(RecordKind::Daily)?;
            if hourly.is_empty() && daily.is_empty() {
                return Err(PipelineError::MissingData(
                    "no silver observations found; run normalize first".to_string(),
                ));
            }
            println!(
                "Aggregating {} hourly and {} daily observations...",
                hourly.len(),
                daily.len()
            );

            let aggregator = Aggregator::new();
            let daily_summaries = aggregator.summarize(&hourly, Period::Day);
            let weekly_summaries = aggregator.summarize(&hourly, Period::Week);
            let alerts = aggregator.alerts(&daily);
            let features = aggregator.features(&daily);

            let writer = ParquetTableWriter::new().with_compression(&config.compression)?;
            writer.write_summaries(&daily_summaries, &layout.gold_table(GOLD_DAILY_SUMMARY))?;
            writer.write_summaries(&weekly_summaries, &layout.gold_table(GOLD_WEEKLY_SUMMARY))?;
            writer.write_alerts(&alerts, &layout.gold_table(GOLD_ALERTS))?;
            writer.write_features(&features, &layout.gold_table(GOLD_FEATURES))?;

            println!("Gold datasets rebuilt:");
            println!("  {}: {} rows", GOLD_DAILY_SUMMARY, daily_summaries.len());
            println!("  {}: {} rows", GOLD_WEEKLY_SUMMARY, weekly_summaries.len());
            println!("  {}: {} rows", GOLD_ALERTS, alerts.len());
            println!("  {}: {} rows", GOLD_FEATURES, features.len());
        }

        Commands::Info { file, sample } => {
            println!("Analyzing Parquet file: {}", file.display());

            let writer = ParquetTableWriter::new();
            let file_info = writer.file_info(&file)?;
            println!("\n{}", file_info.summary());

            if sample > 0 {
                // Layout is irrelevant when reading an explicit path.
                let layout = PipelineConfig::load(&cli.config)
                    .map(|config| config.layout())
                    .unwrap_or_else(|_| LakeLayout::new(DEFAULT_LAKE_ROOT));
                let reader = SilverReader::new(layout);

                println!("\nSample Rows (showing up to {}):", sample);
                match reader.read_table(&file) {
                    Ok(rows) => {
                        for (i, row) in rows.iter().take(sample).enumerate() {
                            println!("{}. {}", i + 1, format_observation(row));
                        }
                    }
                    Err(e) => println!("Error reading sample rows: {}", e),
                }
            }
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| PipelineError::Config(e.to_string()))
}

fn format_observation(row: &ObservationRow) -> String {
    match row.kind {
        RecordKind::Daily => format!(
            "{} on {}: max={}°C, min={}°C, wind_max={} km/h, precip={} mm",
            row.location,
            row.timestamp.date(),
            fmt_metric(row.temp_max),
            fmt_metric(row.temp_min),
            fmt_metric(row.wind_speed_max),
            fmt_metric(row.precip_total),
        ),
        RecordKind::Current | RecordKind::Hourly => format!(
            "{} at {}: temp={}°C, humidity={}%, wind={} km/h, precip={} mm",
            row.location,
            row.timestamp.format("%Y-%m-%d %H:%M"),
            fmt_metric(row.temperature),
            fmt_metric(row.humidity),
            fmt_metric(row.wind_speed),
            fmt_metric(row.precipitation),
        ),
    }
}

fn fmt_metric(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.1}", v))
        .unwrap_or_else(|| "null".to_string())
}

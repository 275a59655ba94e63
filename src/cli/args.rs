use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "weather-lake")]
#[command(about = "Medallion-layered weather data pipeline for Open-Meteo forecasts")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(
        short,
        long,
        global = true,
        default_value = "config/pipeline.toml",
        help = "Pipeline configuration file"
    )]
    pub config: PathBuf,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Suppress progress bars")]
    pub silent: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full pipeline: fetch, normalize, aggregate
    Run,

    /// Fetch forecasts and archive them as bronze artifacts
    Fetch {
        #[arg(short, long, help = "Fetch a single configured location by name")]
        location: Option<String>,
    },

    /// Rebuild all silver tables from the bronze archive
    Normalize {
        #[arg(long, default_value_t = num_cpus::get())]
        max_workers: usize,
    },

    /// Rebuild the gold datasets from the silver tables
    Aggregate,

    /// Display information about a Parquet table in the lake
    Info {
        #[arg(short, long)]
        file: PathBuf,

        #[arg(short, long, default_value = "10")]
        sample: usize,
    },
}

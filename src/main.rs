use clap::Parser;
use weather_lake::cli::{run, Cli};
use weather_lake::error::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    run(cli).await
}

//! listharvest - resumable classifieds listing harvester.

mod cli;

use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    let _ = dotenvy::dotenv();

    let cli = cli::Cli::parse();
    listharvest::telemetry::init_logging(cli.verbose, cli.log_path().as_deref())?;

    cli::run(cli).await
}

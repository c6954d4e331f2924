//! dlt-node - fleet-joined load generation worker

use anyhow::Result;
use clap::Parser;

mod cli;
mod shutdown;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine; real deployments use the environment
    let _ = dotenvy::dotenv();

    let cli = cli::Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "dlt-node starting");

    cli::run(cli).await
}

fn init_tracing(verbose: bool, json: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

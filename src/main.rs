//! prodctl CLI - multi-product build, dist and docker orchestrator
//!
//! Entry point for the prodctl command-line application.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use prodctl::cli::output::display_error;
use prodctl::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let output_config = cli.output_config();
    output_config.apply_global();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(output_config.log_directive()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.run().await {
        Ok(()) => Ok(()),
        Err(e) => {
            display_error(&e);
            std::process::exit(1);
        }
    }
}

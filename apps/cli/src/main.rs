//! TowScout CLI — local-business discovery and enrichment pipeline.
//!
//! Discovers towing companies by geographic zone, scrapes their websites,
//! and classifies impound capability into a local database.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}

//! BODACC CLI: day-range announcement fetcher and SIREN/keyword filter.
//!
//! Fetches published announcements one day at a time into per-day JSON Lines
//! artifacts, then filters them against a registry of known identifiers.

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

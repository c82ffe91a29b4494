//! tractcheck CLI: census-tract tax-benefit eligibility for facility lists.
//!
//! Geocodes each facility address to a census block and checks its tract
//! against the low-income and NMTC reference tables.

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

//! Kafprobe - unified CLI entrypoint.
//!
//! Usage:
//!   kafprobe run --config config/kafprobe.toml
//!   kafprobe run --json
//!   kafprobe check-config --config config/kafprobe.toml

use anyhow::Result;
use clap::Parser;
use kafprobe::cli::commands::{run_check_config, run_probe};
use kafprobe::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run_probe(args).await,
        Commands::CheckConfig(args) => run_check_config(args),
    }
}

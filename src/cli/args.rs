//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Kafprobe - load and correctness probe for Kafka clusters.
#[derive(Parser)]
#[command(name = "kafprobe")]
#[command(version)]
#[command(about = "Kafka load and correctness probe")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Produce, consume, and reconcile one probe run
    Run(RunArgs),

    /// Load and validate a configuration file without running
    CheckConfig(CheckConfigArgs),
}

// -----------------------------------------------------------------------------
// Run command
// -----------------------------------------------------------------------------

#[derive(Args)]
pub struct RunArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/kafprobe.toml")]
    pub config: PathBuf,

    /// Emit the final report as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

// -----------------------------------------------------------------------------
// Check-config command
// -----------------------------------------------------------------------------

#[derive(Args)]
pub struct CheckConfigArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/kafprobe.toml")]
    pub config: PathBuf,

    /// Print the effective configuration as JSON
    #[arg(long)]
    pub json: bool,
}

//! Run command - drives one probe run end to end.

use crate::cli::args::RunArgs;
use crate::config::Config;
use crate::runtime::Harness;
use crate::telemetry;
use crate::time::SystemClock;
use anyhow::{Context, Result};
use std::env;

pub async fn run_probe(args: RunArgs) -> Result<()> {
    // Set config path via environment so Config::load_from_env picks it up
    env::set_var("KAFPROBE_CONFIG", args.config.display().to_string());

    let config = Config::load_from_env()?;
    let log_handle = telemetry::init_tracing(config.telemetry.log_level.as_deref())?;
    let clock = SystemClock;
    let mut harness = Harness::new(config, clock, Some(log_handle))?;
    let summary = harness.run().await?;
    if args.json {
        let encoded = serde_json::to_string_pretty(&summary).context("encoding report")?;
        println!("{encoded}");
    } else {
        println!("{summary}");
    }
    Ok(())
}

//! Check-config command - loads and validates a configuration file.

use crate::cli::args::CheckConfigArgs;
use crate::config::Config;
use anyhow::{Context, Result};

pub fn run_check_config(args: CheckConfigArgs) -> Result<()> {
    let config = Config::load(&args.config)?;
    config.validate()?;
    if args.json {
        let encoded =
            serde_json::to_string_pretty(&config).context("encoding effective configuration")?;
        println!("{encoded}");
        return Ok(());
    }
    let consumer = if config.consumer.enabled {
        "enabled"
    } else {
        "disabled"
    };
    println!(
        "{} is valid: topic \"{}\", {} producer workers, consumer {}",
        args.config.display(),
        config.producer.topic,
        config.producer.concurrency,
        consumer,
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn args(path: PathBuf) -> CheckConfigArgs {
        CheckConfigArgs {
            config: path,
            json: false,
        }
    }

    #[test]
    fn accepts_a_valid_document() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("probe.toml");
        fs::write(&path, "[producer]\ntopic = \"checked\"\n").unwrap();
        assert!(run_check_config(args(path)).is_ok());
    }

    #[test]
    fn json_mode_serializes_the_effective_configuration() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("probe.toml");
        fs::write(&path, "[producer]\ntopic = \"checked\"\n").unwrap();
        let args = CheckConfigArgs {
            config: path,
            json: true,
        };
        assert!(run_check_config(args).is_ok());
    }

    #[test]
    fn rejects_an_invalid_document() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("probe.toml");
        fs::write(&path, "[producer]\nconcurrency = 0\n").unwrap();
        assert!(run_check_config(args(path)).is_err());
    }

    #[test]
    fn rejects_a_missing_file() {
        assert!(run_check_config(args(PathBuf::from("/nonexistent/probe.toml"))).is_err());
    }
}

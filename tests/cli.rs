//! CLI argument parsing tests.

use clap::Parser;
use kafprobe::cli::{Cli, Commands};
use std::path::PathBuf;

/// Helper to parse CLI args, returning the Commands enum.
fn parse_args(args: &[&str]) -> Result<Commands, clap::Error> {
    let mut full_args = vec!["kafprobe"];
    full_args.extend(args);
    Cli::try_parse_from(full_args).map(|cli| cli.command)
}

#[test]
fn run_defaults_to_the_conventional_config_path() {
    let cmd = parse_args(&["run"]).unwrap();
    if let Commands::Run(args) = cmd {
        assert_eq!(args.config, PathBuf::from("config/kafprobe.toml"));
        assert!(!args.json);
    } else {
        panic!("expected Run command");
    }
}

#[test]
fn run_accepts_config_path_and_json_output() {
    let cmd = parse_args(&["run", "--config", "/tmp/probe.toml", "--json"]).unwrap();
    if let Commands::Run(args) = cmd {
        assert_eq!(args.config, PathBuf::from("/tmp/probe.toml"));
        assert!(args.json);
    } else {
        panic!("expected Run command");
    }
}

#[test]
fn check_config_accepts_the_short_config_flag() {
    let cmd = parse_args(&["check-config", "-c", "probe.json", "--json"]).unwrap();
    if let Commands::CheckConfig(args) = cmd {
        assert_eq!(args.config, PathBuf::from("probe.json"));
        assert!(args.json);
    } else {
        panic!("expected CheckConfig command");
    }
}

#[test]
fn unknown_subcommands_are_rejected() {
    assert!(parse_args(&["probe"]).is_err());
    assert!(parse_args(&[]).is_err());
}

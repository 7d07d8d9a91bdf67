//! Kafprobe CLI - unified command-line interface.
//!
//! Provides a single binary entry point for:
//! - `kafprobe run` - Drive a probe run and print the verdict
//! - `kafprobe check-config` - Validate a configuration file

mod args;
pub mod commands;

pub use args::{CheckConfigArgs, Cli, Commands, RunArgs};

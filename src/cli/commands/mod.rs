//! CLI command implementations.

mod check;
mod run;

pub use check::run_check_config;
pub use run::run_probe;

//! Core runtime infrastructure.
//!
//! This module contains the essential components for driving a probe run:
//! - `config` - Configuration parsing and validation
//! - `runtime` - Run orchestration and shutdown
//! - `time` - Deterministic time utilities

pub mod config;
pub mod runtime;
pub mod time;

pub use config::*;
pub use runtime::*;
pub use time::*;

//! Operations and observability.
//!
//! This module provides operational tooling:
//! - `telemetry` - Structured logging and the debug HTTP endpoint

pub mod telemetry;

pub use telemetry::*;

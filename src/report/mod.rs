//! Delivery verdict computation and emission.
//!
//! `summarize` folds a trace snapshot into the counts and latency
//! distribution that make up the run's verdict; `Reporter` emits it
//! periodically and the runtime emits it once more at shutdown.

pub mod librd;
pub mod reporter;
pub mod statsd;

use crate::trace::{Trace, TraceState};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Latency distribution over traces with both timestamps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatencySummary {
    pub samples: u64,
    pub min_ms: i64,
    pub avg_ms: f64,
    pub p95_ms: i64,
    pub p99_ms: i64,
}

/// The run's verdict: census of every trace plus the latency distribution.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportSummary {
    /// Total produce sightings, duplicates included.
    pub produced_total: u64,
    /// Total consume sightings, duplicates included.
    pub consumed_total: u64,
    /// Distinct sequences with at least one produce sighting.
    pub produced_distinct: u64,
    pub delivered: u64,
    pub lost: u64,
    pub unexpected: u64,
    /// Redundant sightings beyond the first, per side.
    pub duplicate_produced: u64,
    pub duplicate_consumed: u64,
    /// Delivered traces whose latency was negative (cross-run
    /// contamination); excluded from the distribution.
    pub flagged_latency: u64,
    pub latency: LatencySummary,
}

/// Fold a snapshot into the verdict. Tolerates an empty store: every count
/// is zero and the percentile math never divides.
pub fn summarize(traces: &HashMap<u64, Trace>) -> ReportSummary {
    let mut summary = ReportSummary::default();
    let mut latencies = Vec::new();
    for trace in traces.values() {
        summary.produced_total += trace.produce_count;
        summary.consumed_total += trace.consume_count;
        if trace.produce_count > 0 {
            summary.produced_distinct += 1;
            summary.duplicate_produced += trace.produce_count - 1;
        }
        if trace.consume_count > 0 {
            summary.duplicate_consumed += trace.consume_count - 1;
        }
        match trace.state() {
            TraceState::Delivered => {
                summary.delivered += 1;
                match trace.latency_ms() {
                    Some(latency) => latencies.push(latency),
                    None => summary.flagged_latency += 1,
                }
            }
            TraceState::Lost => summary.lost += 1,
            TraceState::Unexpected => summary.unexpected += 1,
        }
    }
    summary.latency = latency_summary(&mut latencies);
    summary
}

fn latency_summary(latencies: &mut Vec<i64>) -> LatencySummary {
    if latencies.is_empty() {
        return LatencySummary::default();
    }
    latencies.sort_unstable();
    let samples = latencies.len() as u64;
    let sum: i64 = latencies.iter().sum();
    LatencySummary {
        samples,
        min_ms: latencies[0],
        avg_ms: sum as f64 / samples as f64,
        p95_ms: percentile(latencies, 95.0),
        p99_ms: percentile(latencies, 99.0),
    }
}

/// Nearest-rank percentile over a sorted, non-empty slice.
fn percentile(sorted: &[i64], q: f64) -> i64 {
    let rank = (q / 100.0 * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

impl fmt::Display for ReportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "delivery report")?;
        writeln!(
            f,
            "  produced    {:>10}  (distinct {}, duplicates {})",
            self.produced_total, self.produced_distinct, self.duplicate_produced
        )?;
        writeln!(
            f,
            "  consumed    {:>10}  (duplicates {})",
            self.consumed_total, self.duplicate_consumed
        )?;
        writeln!(f, "  delivered   {:>10}", self.delivered)?;
        writeln!(f, "  lost        {:>10}", self.lost)?;
        writeln!(f, "  unexpected  {:>10}", self.unexpected)?;
        write!(
            f,
            "  latency ms  min {}  avg {:.1}  p95 {}  p99 {}  ({} samples, {} flagged)",
            self.latency.min_ms,
            self.latency.avg_ms,
            self.latency.p95_ms,
            self.latency.p99_ms,
            self.latency.samples,
            self.flagged_latency
        )
    }
}

//! Reconciliation store for produced and consumed message sightings.
//!
//! The store is the single source of truth for the run's verdict. The
//! producer event drain and the consumer pipeline both upsert into it
//! concurrently; the reporter reads consistent snapshots. All access goes
//! through the synchronized API and no internal reference ever escapes.

use parking_lot::Mutex;
use std::collections::HashMap;

/// Where the broker placed a produced message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

/// Reconciliation record for one message identity.
///
/// Counts only grow; timestamps are first-occurrence-wins so retries and
/// redeliveries never shift the latency baseline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trace {
    pub produced_at_ms: Option<i64>,
    pub consumed_at_ms: Option<i64>,
    pub produce_count: u64,
    pub consume_count: u64,
    pub destination: Option<Destination>,
}

/// Terminal classification of a trace at report time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceState {
    /// Produced at least once and consumed at least once.
    Delivered,
    /// Produced but never seen on the consumer side.
    Lost,
    /// Consumed without any produce sighting in this run.
    Unexpected,
}

impl Trace {
    pub fn state(&self) -> TraceState {
        if self.produce_count == 0 {
            TraceState::Unexpected
        } else if self.consume_count == 0 {
            TraceState::Lost
        } else {
            TraceState::Delivered
        }
    }

    /// Round-trip latency, defined only when both sides were sighted and
    /// the delta is non-negative. A negative delta means cross-run
    /// contamination or clock trouble; callers flag it rather than crash.
    pub fn latency_ms(&self) -> Option<i64> {
        match (self.produced_at_ms, self.consumed_at_ms) {
            (Some(produced), Some(consumed)) if consumed >= produced => Some(consumed - produced),
            _ => None,
        }
    }
}

/// Concurrent-safe index of in-flight and completed traces.
#[derive(Default)]
pub struct TraceStore {
    traces: Mutex<HashMap<u64, Trace>>,
}

impl TraceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a producer-side sighting. The produce count always grows;
    /// the timestamp and destination stick at their first value.
    pub fn track_produced(&self, sequence: u64, destination: Option<Destination>, at_ms: i64) {
        let mut traces = self.traces.lock();
        let trace = traces.entry(sequence).or_default();
        trace.produce_count += 1;
        if trace.produced_at_ms.is_none() {
            trace.produced_at_ms = Some(at_ms);
        }
        if trace.destination.is_none() {
            trace.destination = destination;
        }
    }

    /// Record a consumer-side sighting.
    pub fn track_consumed(&self, sequence: u64, at_ms: i64) {
        let mut traces = self.traces.lock();
        let trace = traces.entry(sequence).or_default();
        trace.consume_count += 1;
        if trace.consumed_at_ms.is_none() {
            trace.consumed_at_ms = Some(at_ms);
        }
    }

    /// Independent copy of every trace. The lock is held only for the
    /// duration of the copy, never for report computation.
    pub fn snapshot(&self) -> HashMap<u64, Trace> {
        self.traces.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.traces.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.lock().is_empty()
    }

    /// True when every produce sighting has a matching consume sighting.
    /// Used by the runtime to detect consumer catch-up on bounded runs
    /// without cloning the whole table.
    pub fn fully_consumed(&self) -> bool {
        self.traces
            .lock()
            .values()
            .all(|t| t.produce_count == 0 || t.consume_count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dest(partition: i32, offset: i64) -> Destination {
        Destination {
            topic: "probe".into(),
            partition,
            offset,
        }
    }

    #[test]
    fn upserts_reconcile_in_either_order() {
        let store = TraceStore::new();
        store.track_consumed(5, 200);
        store.track_produced(5, Some(dest(0, 11)), 100);
        let snap = store.snapshot();
        let trace = &snap[&5];
        assert_eq!(trace.produce_count, 1);
        assert_eq!(trace.consume_count, 1);
        assert_eq!(trace.produced_at_ms, Some(100));
        assert_eq!(trace.consumed_at_ms, Some(200));
        assert_eq!(trace.state(), TraceState::Delivered);
        assert_eq!(trace.latency_ms(), Some(100));
    }

    #[test]
    fn first_timestamp_and_destination_win() {
        let store = TraceStore::new();
        store.track_produced(1, Some(dest(0, 7)), 100);
        store.track_produced(1, Some(dest(3, 9)), 150);
        store.track_consumed(1, 300);
        store.track_consumed(1, 250);
        let snap = store.snapshot();
        let trace = &snap[&1];
        assert_eq!(trace.produce_count, 2);
        assert_eq!(trace.consume_count, 2);
        assert_eq!(trace.produced_at_ms, Some(100));
        assert_eq!(trace.consumed_at_ms, Some(300));
        assert_eq!(trace.destination, Some(dest(0, 7)));
    }

    #[test]
    fn classification_covers_all_terminal_shapes() {
        let store = TraceStore::new();
        store.track_produced(1, None, 10);
        store.track_consumed(1, 20);
        store.track_produced(2, None, 10);
        store.track_consumed(3, 30);
        let snap = store.snapshot();
        assert_eq!(snap[&1].state(), TraceState::Delivered);
        assert_eq!(snap[&2].state(), TraceState::Lost);
        assert_eq!(snap[&3].state(), TraceState::Unexpected);
    }

    #[test]
    fn negative_latency_is_flagged_not_computed() {
        let store = TraceStore::new();
        store.track_produced(9, None, 500);
        store.track_consumed(9, 400);
        let snap = store.snapshot();
        assert_eq!(snap[&9].latency_ms(), None);
        assert_eq!(snap[&9].state(), TraceState::Delivered);
    }

    #[test]
    fn fully_consumed_tracks_catch_up() {
        let store = TraceStore::new();
        assert!(store.fully_consumed());
        store.track_produced(1, None, 10);
        store.track_produced(2, None, 10);
        assert!(!store.fully_consumed());
        store.track_consumed(1, 20);
        assert!(!store.fully_consumed());
        store.track_consumed(2, 25);
        assert!(store.fully_consumed());
    }

    #[test]
    fn snapshot_is_independent_of_later_writes() {
        let store = TraceStore::new();
        store.track_produced(1, None, 10);
        let snap = store.snapshot();
        store.track_consumed(1, 20);
        assert_eq!(snap[&1].consume_count, 0);
        assert_eq!(store.snapshot()[&1].consume_count, 1);
    }
}

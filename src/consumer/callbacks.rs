//! Standard callbacks for the consume chain.

use crate::consumer::{ConsumeCallback, InboundRecord};
use crate::report::statsd::StatsdSink;
use crate::trace::TraceStore;
use crate::wire::decode;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info};

/// Records the consume sighting in the trace store.
pub struct Acker {
    store: Arc<TraceStore>,
}

impl Acker {
    pub fn new(store: Arc<TraceStore>) -> Self {
        Self { store }
    }
}

impl ConsumeCallback for Acker {
    fn name(&self) -> &'static str {
        "acker"
    }

    fn on_record(&self, record: &InboundRecord<'_>) -> Result<()> {
        let message = decode(record.payload).context("decoding consumed payload")?;
        self.store
            .track_consumed(message.sequence, record.received_at_ms);
        Ok(())
    }
}

/// Mirrors per-message round-trip latency to statsd as it happens, using
/// the creation time carried inside the frame. The authoritative latency
/// distribution still comes from the trace store at report time.
pub struct LatencyTracker {
    sink: Arc<StatsdSink>,
    tags: Vec<String>,
}

impl LatencyTracker {
    pub fn new(sink: Arc<StatsdSink>, tags: Vec<String>) -> Self {
        Self { sink, tags }
    }
}

impl ConsumeCallback for LatencyTracker {
    fn name(&self) -> &'static str {
        "latency-tracker"
    }

    fn on_record(&self, record: &InboundRecord<'_>) -> Result<()> {
        let message = decode(record.payload).context("decoding consumed payload")?;
        let latency_ms = record.received_at_ms - message.produced_at_ms;
        if latency_ms < 0 {
            debug!(
                sequence = message.sequence,
                latency_ms, "negative latency, frame from an earlier run"
            );
            return Ok(());
        }
        self.sink.timing("consumer.latency", latency_ms, &self.tags);
        Ok(())
    }
}

/// Echoes each arrival; registered only in the dev environment.
pub struct Display;

impl ConsumeCallback for Display {
    fn name(&self) -> &'static str {
        "display"
    }

    fn on_record(&self, record: &InboundRecord<'_>) -> Result<()> {
        match decode(record.payload) {
            Ok(message) => info!(
                sequence = message.sequence,
                topic = record.topic,
                partition = record.partition,
                offset = record.offset,
                "received"
            ),
            Err(_) => info!(
                topic = record.topic,
                partition = record.partition,
                offset = record.offset,
                bytes = record.payload.len(),
                "received undecodable record"
            ),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::time::ManualClock;
    use crate::wire::{encode, MessageFactory};

    fn record<'a>(payload: &'a [u8], received_at_ms: i64) -> InboundRecord<'a> {
        InboundRecord {
            topic: "probe",
            partition: 2,
            offset: 7,
            payload,
            received_at_ms,
        }
    }

    #[test]
    fn acker_folds_the_sighting_into_the_store() {
        let store = Arc::new(TraceStore::new());
        let acker = Acker::new(Arc::clone(&store));
        let factory = MessageFactory::new(4, ManualClock::at(1_000));
        let frame = encode(&factory.next_message());

        acker.on_record(&record(&frame, 1_250)).expect("ack");
        acker.on_record(&record(&frame, 1_900)).expect("ack again");

        let traces = store.snapshot();
        let trace = &traces[&0];
        assert_eq!(trace.consume_count, 2);
        assert_eq!(trace.consumed_at_ms, Some(1_250));
    }

    #[test]
    fn acker_surfaces_decode_failures() {
        let store = Arc::new(TraceStore::new());
        let acker = Acker::new(Arc::clone(&store));
        assert!(acker.on_record(&record(b"junk", 10)).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn latency_tracker_tolerates_time_going_backwards() {
        let tracker = LatencyTracker::new(Arc::new(StatsdSink::disabled()), Vec::new());
        let factory = MessageFactory::new(4, ManualClock::at(5_000));
        let frame = encode(&factory.next_message());

        tracker.on_record(&record(&frame, 5_040)).expect("forward");
        tracker.on_record(&record(&frame, 4_000)).expect("backward");
    }

    #[test]
    fn display_never_fails_even_on_garbage() {
        let display = Display;
        display.on_record(&record(b"junk", 10)).expect("echo");
    }
}

use crate::time::Clock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// One probe message. Immutable once created; the sequence is the identity
/// every downstream component reconciles on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeMessage {
    pub sequence: u64,
    pub produced_at_ms: i64,
    pub payload: Vec<u8>,
}

/// Builds probe messages with a monotonic sequence and a fixed-size payload.
///
/// Cloning shares the sequence counter, so every factory handle in a run
/// draws from the same identity space.
#[derive(Clone)]
pub struct MessageFactory<C: Clock> {
    next_sequence: Arc<AtomicU64>,
    payload_size: usize,
    clock: C,
}

impl<C: Clock> MessageFactory<C> {
    pub fn new(payload_size: usize, clock: C) -> Self {
        Self {
            next_sequence: Arc::new(AtomicU64::new(0)),
            payload_size,
            clock,
        }
    }

    /// Construct the next message. Sequences start at 0 and never repeat
    /// within a run.
    pub fn next_message(&self) -> ProbeMessage {
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        ProbeMessage {
            sequence,
            produced_at_ms: self.clock.epoch_millis(),
            payload: filler(self.payload_size),
        }
    }

    pub fn created(&self) -> u64 {
        self.next_sequence.load(Ordering::SeqCst)
    }
}

/// Incompressible-ish payload body so broker-side batching and compression
/// behave closer to production traffic than a run of zeros would.
fn filler(size: usize) -> Vec<u8> {
    let seed = Uuid::new_v4();
    seed.as_bytes().iter().copied().cycle().take(size).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualClock;

    #[test]
    fn sequences_are_monotonic_and_shared_across_clones() {
        let factory = MessageFactory::new(16, ManualClock::at(1_000));
        let clone = factory.clone();
        let a = factory.next_message();
        let b = clone.next_message();
        let c = factory.next_message();
        assert_eq!((a.sequence, b.sequence, c.sequence), (0, 1, 2));
        assert_eq!(factory.created(), 3);
    }

    #[test]
    fn messages_carry_construction_time_and_payload_size() {
        let clock = ManualClock::at(42);
        let factory = MessageFactory::new(100, clock.clone());
        let msg = factory.next_message();
        assert_eq!(msg.produced_at_ms, 42);
        assert_eq!(msg.payload.len(), 100);
        clock.advance(10);
        assert_eq!(factory.next_message().produced_at_ms, 52);
    }

    #[test]
    fn zero_size_payload_is_allowed() {
        let factory = MessageFactory::new(0, ManualClock::default());
        assert!(factory.next_message().payload.is_empty());
    }
}

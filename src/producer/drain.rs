//! Sole consumer of the producing client's event stream.
//!
//! The client context forwards everything it observes into an unbounded
//! channel: delivery confirmations, statistics documents, transport errors.
//! One drain task classifies each event and folds confirmations into the
//! trace store. The task exits when every sender handle is gone, which
//! happens once the producing client has been flushed and released; joining
//! it is how the runtime knows the producer side is fully quiesced.

use crate::report::librd::LibrdStatsHandler;
use crate::trace::{Destination, TraceStore};
use crate::wire::decode;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// One confirmation from the broker for a single send attempt.
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub payload: Option<Vec<u8>>,
    pub destination: Destination,
    pub error: Option<String>,
}

/// Everything the producing client can hand to the drain.
#[derive(Debug)]
pub enum ClientEvent {
    Delivery(DeliveryOutcome),
    Stats(Vec<u8>),
    ClientError(String),
}

/// Counters exposed on the debug endpoint.
#[derive(Debug, Default)]
pub struct DrainMetrics {
    deliveries: AtomicU64,
    delivery_errors: AtomicU64,
    undecodable: AtomicU64,
    stats_events: AtomicU64,
    client_errors: AtomicU64,
}

impl DrainMetrics {
    pub fn deliveries(&self) -> u64 {
        self.deliveries.load(Ordering::Relaxed)
    }

    pub fn delivery_errors(&self) -> u64 {
        self.delivery_errors.load(Ordering::Relaxed)
    }

    pub fn undecodable(&self) -> u64 {
        self.undecodable.load(Ordering::Relaxed)
    }

    pub fn stats_events(&self) -> u64 {
        self.stats_events.load(Ordering::Relaxed)
    }

    pub fn client_errors(&self) -> u64 {
        self.client_errors.load(Ordering::Relaxed)
    }
}

pub struct EventDrain {
    store: Arc<TraceStore>,
    stats: Option<Arc<LibrdStatsHandler>>,
    metrics: Arc<DrainMetrics>,
}

impl EventDrain {
    /// `stats` is `None` when statistics extraction is disabled; documents
    /// are then counted and dropped without parsing.
    pub fn new(store: Arc<TraceStore>, stats: Option<Arc<LibrdStatsHandler>>) -> Self {
        Self {
            store,
            stats,
            metrics: Arc::new(DrainMetrics::default()),
        }
    }

    pub fn metrics(&self) -> Arc<DrainMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Run until the event stream closes.
    pub fn spawn(self, mut events: mpsc::UnboundedReceiver<ClientEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                self.handle(event);
            }
            debug!("client event stream closed");
        })
    }

    fn handle(&self, event: ClientEvent) {
        match event {
            ClientEvent::Delivery(outcome) => self.track_delivery(outcome),
            ClientEvent::Stats(raw) => {
                self.metrics.stats_events.fetch_add(1, Ordering::Relaxed);
                if let Some(handler) = &self.stats {
                    handler.handle(&raw);
                }
            }
            ClientEvent::ClientError(reason) => {
                self.metrics.client_errors.fetch_add(1, Ordering::Relaxed);
                warn!(reason, "producing client reported an error");
            }
        }
    }

    /// A confirmation carrying a broker error is still tracked; the send
    /// happened, and a missing consume side must surface as loss rather
    /// than vanish.
    fn track_delivery(&self, outcome: DeliveryOutcome) {
        self.metrics.deliveries.fetch_add(1, Ordering::Relaxed);
        if let Some(reason) = &outcome.error {
            self.metrics.delivery_errors.fetch_add(1, Ordering::Relaxed);
            error!(
                topic = %outcome.destination.topic,
                partition = outcome.destination.partition,
                reason,
                "delivery failed"
            );
        }
        let Some(payload) = &outcome.payload else {
            self.metrics.undecodable.fetch_add(1, Ordering::Relaxed);
            error!("delivery confirmation without payload");
            return;
        };
        match decode(payload) {
            Ok(message) => {
                self.store.track_produced(
                    message.sequence,
                    Some(outcome.destination),
                    message.produced_at_ms,
                );
            }
            Err(err) => {
                self.metrics.undecodable.fetch_add(1, Ordering::Relaxed);
                error!(error = %err, "undecodable delivery payload");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::time::ManualClock;
    use crate::report::statsd::StatsdSink;
    use crate::trace::TraceState;
    use crate::wire::{encode, MessageFactory};

    fn destination(offset: i64) -> Destination {
        Destination {
            topic: "probe".to_string(),
            partition: 0,
            offset,
        }
    }

    #[tokio::test]
    async fn confirmations_fold_into_produce_traces() {
        let store = Arc::new(TraceStore::new());
        let drain = EventDrain::new(Arc::clone(&store), None);
        let metrics = drain.metrics();
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = drain.spawn(rx);

        let factory = MessageFactory::new(8, ManualClock::at(5_000));
        for offset in 0..3 {
            let message = factory.next_message();
            tx.send(ClientEvent::Delivery(DeliveryOutcome {
                payload: Some(encode(&message).to_vec()),
                destination: destination(offset),
                error: None,
            }))
            .expect("send event");
        }
        drop(tx);
        handle.await.expect("drain task");

        let traces = store.snapshot();
        assert_eq!(traces.len(), 3);
        for sequence in 0..3 {
            let trace = &traces[&sequence];
            assert_eq!(trace.produce_count, 1);
            assert_eq!(trace.produced_at_ms, Some(5_000));
            assert_eq!(trace.state(), TraceState::Lost);
        }
        assert_eq!(traces[&1].destination.as_ref().map(|d| d.offset), Some(1));
        assert_eq!(metrics.deliveries(), 3);
        assert_eq!(metrics.delivery_errors(), 0);
    }

    #[tokio::test]
    async fn errored_confirmations_are_tracked_not_dropped() {
        let store = Arc::new(TraceStore::new());
        let drain = EventDrain::new(Arc::clone(&store), None);
        let metrics = drain.metrics();
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = drain.spawn(rx);

        let factory = MessageFactory::new(8, ManualClock::at(9_000));
        let message = factory.next_message();
        tx.send(ClientEvent::Delivery(DeliveryOutcome {
            payload: Some(encode(&message).to_vec()),
            destination: destination(0),
            error: Some("broker: message timed out".to_string()),
        }))
        .expect("send event");
        drop(tx);
        handle.await.expect("drain task");

        let traces = store.snapshot();
        assert_eq!(traces[&0].produce_count, 1);
        assert_eq!(metrics.delivery_errors(), 1);
    }

    #[tokio::test]
    async fn garbage_payloads_are_counted_and_skipped() {
        let store = Arc::new(TraceStore::new());
        let drain = EventDrain::new(Arc::clone(&store), None);
        let metrics = drain.metrics();
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = drain.spawn(rx);

        tx.send(ClientEvent::Delivery(DeliveryOutcome {
            payload: Some(b"not a frame".to_vec()),
            destination: destination(0),
            error: None,
        }))
        .expect("send event");
        tx.send(ClientEvent::Delivery(DeliveryOutcome {
            payload: None,
            destination: destination(1),
            error: None,
        }))
        .expect("send event");
        // The drain keeps going after bad payloads.
        let factory = MessageFactory::new(8, ManualClock::at(100));
        tx.send(ClientEvent::Delivery(DeliveryOutcome {
            payload: Some(encode(&factory.next_message()).to_vec()),
            destination: destination(2),
            error: None,
        }))
        .expect("send event");
        drop(tx);
        handle.await.expect("drain task");

        assert_eq!(metrics.undecodable(), 2);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn stats_and_client_errors_route_without_touching_traces() {
        let store = Arc::new(TraceStore::new());
        let handler = Arc::new(LibrdStatsHandler::new(
            Arc::new(StatsdSink::disabled()),
            Vec::new(),
        ));
        let drain = EventDrain::new(Arc::clone(&store), Some(handler));
        let metrics = drain.metrics();
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = drain.spawn(rx);

        tx.send(ClientEvent::Stats(br#"{"txmsgs": 9}"#.to_vec()))
            .expect("send event");
        tx.send(ClientEvent::ClientError("all brokers down".to_string()))
            .expect("send event");
        drop(tx);
        handle.await.expect("drain task");

        assert_eq!(metrics.stats_events(), 1);
        assert_eq!(metrics.client_errors(), 1);
        assert!(store.is_empty());
    }
}

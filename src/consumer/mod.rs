//! Consumption pipeline.
//!
//! Every record the broker delivers runs through an ordered chain of
//! callbacks, registered before the pipeline starts. A failing callback is
//! logged and skipped; later callbacks in the chain still see the record.
//! The pipeline stops on the shared shutdown signal, unsubscribes, and its
//! join handle is the consumer-side quiescence barrier.

pub mod callbacks;

use crate::broker::SubscriberContext;
use crate::core::time::Clock;
use anyhow::Result;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// One delivered record, as seen by callbacks. Borrowed; callbacks copy
/// out anything they keep.
pub struct InboundRecord<'a> {
    pub topic: &'a str,
    pub partition: i32,
    pub offset: i64,
    pub payload: &'a [u8],
    pub received_at_ms: i64,
}

pub trait ConsumeCallback: Send + Sync {
    fn name(&self) -> &'static str;
    fn on_record(&self, record: &InboundRecord<'_>) -> Result<()>;
}

/// Counters exposed on the debug endpoint.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    received: AtomicU64,
    callback_failures: AtomicU64,
}

impl PipelineMetrics {
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn callback_failures(&self) -> u64 {
        self.callback_failures.load(Ordering::Relaxed)
    }
}

/// Ordered callback chain, separated from the transport so dispatch
/// behavior is testable without a broker.
#[derive(Default)]
pub struct CallbackChain {
    callbacks: Vec<Box<dyn ConsumeCallback>>,
    metrics: Arc<PipelineMetrics>,
}

impl CallbackChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, callback: Box<dyn ConsumeCallback>) {
        self.callbacks.push(callback);
    }

    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn dispatch(&self, record: &InboundRecord<'_>) {
        self.metrics.received.fetch_add(1, Ordering::Relaxed);
        for callback in &self.callbacks {
            if let Err(err) = callback.on_record(record) {
                self.metrics.callback_failures.fetch_add(1, Ordering::Relaxed);
                error!(
                    callback = callback.name(),
                    topic = record.topic,
                    partition = record.partition,
                    offset = record.offset,
                    error = %err,
                    "callback failed"
                );
            }
        }
    }
}

pub struct ConsumerPipeline<C> {
    consumer: StreamConsumer<SubscriberContext>,
    chain: CallbackChain,
    clock: C,
}

impl<C: Clock> ConsumerPipeline<C> {
    /// Registration happens on the chain before construction; after this
    /// point the callback set is closed.
    pub fn new(consumer: StreamConsumer<SubscriberContext>, chain: CallbackChain, clock: C) -> Self {
        Self {
            consumer,
            chain,
            clock,
        }
    }

    /// Receive and dispatch until the shutdown signal flips.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    received = self.consumer.recv() => match received {
                        Ok(message) => {
                            let record = InboundRecord {
                                topic: message.topic(),
                                partition: message.partition(),
                                offset: message.offset(),
                                payload: message.payload().unwrap_or_default(),
                                received_at_ms: self.clock.epoch_millis(),
                            };
                            self.chain.dispatch(&record);
                        }
                        Err(err) => warn!(error = %err, "receive failed"),
                    }
                }
            }
            self.consumer.unsubscribe();
            debug!("consumer pipeline stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use parking_lot::Mutex;

    struct Recording {
        name: &'static str,
        seen: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    impl ConsumeCallback for Recording {
        fn name(&self) -> &'static str {
            self.name
        }

        fn on_record(&self, _record: &InboundRecord<'_>) -> Result<()> {
            self.seen.lock().push(self.name);
            if self.fail {
                bail!("{} refused the record", self.name);
            }
            Ok(())
        }
    }

    fn record() -> InboundRecord<'static> {
        InboundRecord {
            topic: "probe",
            partition: 0,
            offset: 0,
            payload: b"",
            received_at_ms: 0,
        }
    }

    #[test]
    fn dispatch_runs_callbacks_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut chain = CallbackChain::new();
        for name in ["first", "second", "third"] {
            chain.register(Box::new(Recording {
                name,
                seen: Arc::clone(&seen),
                fail: false,
            }));
        }

        chain.dispatch(&record());
        assert_eq!(*seen.lock(), vec!["first", "second", "third"]);
        assert_eq!(chain.metrics().received(), 1);
    }

    #[test]
    fn a_failing_callback_does_not_block_the_rest() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut chain = CallbackChain::new();
        chain.register(Box::new(Recording {
            name: "faulty",
            seen: Arc::clone(&seen),
            fail: true,
        }));
        chain.register(Box::new(Recording {
            name: "steady",
            seen: Arc::clone(&seen),
            fail: false,
        }));

        chain.dispatch(&record());
        chain.dispatch(&record());
        assert_eq!(*seen.lock(), vec!["faulty", "steady", "faulty", "steady"]);
        assert_eq!(chain.metrics().callback_failures(), 2);
        assert_eq!(chain.metrics().received(), 2);
    }
}

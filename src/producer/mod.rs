//! Concurrent message production.
//!
//! A single feeder task constructs messages and pushes them into a bounded
//! queue; a fixed set of sender tasks drains the queue and hands encoded
//! frames to the broker client. Senders never wait for confirmations, those
//! arrive later on the client's event stream and are folded into traces by
//! [`drain::EventDrain`].

pub mod drain;

use crate::core::time::Clock;
use crate::wire::{encode, MessageFactory};
use anyhow::{bail, Context, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Target count that keeps the feeder running until cancellation.
pub const UNBOUNDED_MESSAGES: i64 = -1;

// ---------------------------------------------------------------------------
// RecordSink
// ---------------------------------------------------------------------------

/// The producing side of the broker client, reduced to what the pool needs.
pub trait RecordSink: Send + Sync + 'static {
    /// Hand one encoded frame to the client. Fire and forget; the outcome
    /// arrives later on the client's event stream.
    fn submit(&self, frame: &[u8]) -> Result<(), SubmitError>;

    /// Block until buffered sends are confirmed or the timeout passes.
    fn flush(&self, timeout: Duration) -> Result<(), SubmitError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("client rejected the record: {0}")]
    Rejected(String),
    #[error("flush timed out with records unconfirmed")]
    FlushTimedOut,
}

// ---------------------------------------------------------------------------
// ProducerPool
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct PoolOptions {
    /// Number of messages to emit; [`UNBOUNDED_MESSAGES`] runs until cancelled.
    pub total_messages: i64,
    pub concurrency: usize,
    pub queue_capacity: usize,
    /// Pause after each send, for paced load.
    pub delay: Duration,
    pub flush_timeout: Duration,
}

/// Counters exposed on the debug endpoint.
#[derive(Debug, Default)]
pub struct PoolMetrics {
    enqueued: AtomicU64,
    submitted: AtomicU64,
    rejected: AtomicU64,
}

impl PoolMetrics {
    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

/// Handles for one running pool; consumed by [`ProducerPool::close`].
pub struct PoolRun {
    feeder: JoinHandle<u64>,
    senders: Vec<JoinHandle<()>>,
}

pub struct ProducerPool<S, C: Clock> {
    sink: Arc<S>,
    factory: MessageFactory<C>,
    opts: PoolOptions,
    metrics: Arc<PoolMetrics>,
}

impl<S: RecordSink, C: Clock> ProducerPool<S, C> {
    pub fn new(sink: Arc<S>, factory: MessageFactory<C>, opts: PoolOptions) -> Result<Self> {
        if opts.concurrency == 0 {
            bail!("producer concurrency must be positive");
        }
        if opts.queue_capacity == 0 {
            bail!("producer queue capacity must be positive");
        }
        if opts.total_messages < UNBOUNDED_MESSAGES {
            bail!("total_messages must be -1 (unbounded) or non-negative");
        }
        Ok(Self {
            sink,
            factory,
            opts,
            metrics: Arc::new(PoolMetrics::default()),
        })
    }

    pub fn metrics(&self) -> Arc<PoolMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Start the feeder and the sender tasks.
    ///
    /// The feeder stops when the target is reached or the shutdown signal
    /// flips, then drops the queue sender. Senders keep draining whatever is
    /// already queued and exit once the queue is closed and empty, so a
    /// cancelled unbounded run overruns by at most the queue capacity.
    pub fn spawn(&self, shutdown: watch::Receiver<bool>) -> PoolRun {
        let (tx, rx) = mpsc::channel::<crate::wire::ProbeMessage>(self.opts.queue_capacity);
        let queue = Arc::new(Mutex::new(rx));

        let mut senders = Vec::with_capacity(self.opts.concurrency);
        for sender_id in 0..self.opts.concurrency {
            let queue = Arc::clone(&queue);
            let sink = Arc::clone(&self.sink);
            let metrics = Arc::clone(&self.metrics);
            let delay = self.opts.delay;
            senders.push(tokio::spawn(async move {
                loop {
                    let message = {
                        let mut rx = queue.lock().await;
                        rx.recv().await
                    };
                    let Some(message) = message else { break };
                    let frame = encode(&message);
                    match sink.submit(&frame) {
                        Ok(()) => {
                            metrics.submitted.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(err) => {
                            metrics.rejected.fetch_add(1, Ordering::Relaxed);
                            error!(sequence = message.sequence, error = %err, "record submission failed");
                        }
                    }
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                debug!(sender = sender_id, "sender drained");
            }));
        }

        let factory = self.factory.clone();
        let metrics = Arc::clone(&self.metrics);
        let total = self.opts.total_messages;
        let mut shutdown = shutdown;
        let feeder = tokio::spawn(async move {
            let mut fed = 0u64;
            loop {
                if total >= 0 && fed >= total as u64 {
                    break;
                }
                if *shutdown.borrow() {
                    break;
                }
                tokio::select! {
                    biased;
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    permit = tx.reserve() => {
                        let Ok(permit) = permit else { break };
                        permit.send(factory.next_message());
                        fed += 1;
                        metrics.enqueued.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
            info!(fed, "feeder finished");
            fed
        });

        PoolRun { feeder, senders }
    }

    /// Tear the pool down: join the feeder, join the senders once the queue
    /// is drained, then flush the client so every handed-over record gets a
    /// confirmation. Dropping the pool afterwards releases the client, which
    /// is what lets the event drain observe end of stream.
    ///
    /// Returns the number of messages the feeder enqueued.
    pub async fn close(self, run: PoolRun) -> Result<u64> {
        let fed = run.feeder.await.context("joining feeder")?;
        for sender in run.senders {
            sender.await.context("joining sender")?;
        }
        let Self { sink, opts, .. } = self;
        let timeout = opts.flush_timeout;
        let flushed = tokio::task::spawn_blocking(move || {
            let result = sink.flush(timeout);
            drop(sink);
            result
        })
        .await
        .context("joining flush task")?;
        if let Err(err) = flushed {
            warn!(error = %err, "flush left records unconfirmed");
        }
        Ok(fed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

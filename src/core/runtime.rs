use crate::broker;
use crate::config::Config;
use crate::consumer::callbacks::{Acker, Display, LatencyTracker};
use crate::consumer::{CallbackChain, ConsumerPipeline, PipelineMetrics};
use crate::producer::drain::{DrainMetrics, EventDrain};
use crate::producer::{PoolMetrics, PoolOptions, ProducerPool};
use crate::report::librd::LibrdStatsHandler;
use crate::report::reporter::Reporter;
use crate::report::statsd::StatsdSink;
use crate::report::{summarize, ReportSummary};
use crate::telemetry;
use crate::telemetry::{DebugState, LogHandle};
use crate::time::Clock;
use crate::trace::TraceStore;
use crate::wire::MessageFactory;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

const CATCH_UP_POLL: Duration = Duration::from_millis(200);

/// Unified run scaffold: wires the trace store, broker clients, reporter,
/// and shutdown into one probe run.
pub struct Harness<C: Clock> {
    pub(crate) config: Config,
    pub(crate) clock: C,
    store: Arc<TraceStore>,
    sink: Arc<StatsdSink>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    log_handle: Option<LogHandle>,
}

impl<C: Clock> Harness<C> {
    pub fn new(config: Config, clock: C, log_handle: Option<LogHandle>) -> Result<Self> {
        config.validate()?;
        let sink = if config.reporter.statsd.enabled {
            Arc::new(StatsdSink::connect(
                &config.reporter.statsd.host,
                config.reporter.statsd.port,
                &config.reporter.statsd.prefix,
            )?)
        } else {
            Arc::new(StatsdSink::disabled())
        };
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Ok(Self {
            config,
            clock,
            store: Arc::new(TraceStore::new()),
            sink,
            shutdown_tx,
            shutdown_rx,
            log_handle,
        })
    }

    pub fn store(&self) -> Arc<TraceStore> {
        Arc::clone(&self.store)
    }

    /// Ask the run to stop; identical to receiving SIGINT.
    pub fn request_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Drive one probe run to completion and return its verdict.
    ///
    /// Start order: consumer first so it observes the topic before any
    /// message goes out, then the producer side, then the reporter and the
    /// debug endpoint. Teardown holds the reverse contract: the producer
    /// side reaches quiescence (feeder done, queue drained, client flushed
    /// and released, confirmations folded) before the consumer is detached,
    /// and the verdict is computed only after both barriers.
    pub async fn run(&mut self) -> Result<ReportSummary> {
        let cfg = self.config.clone();
        let tags = sample_tags(&cfg);
        let stats = cfg
            .librd_stats
            .enabled
            .then(|| Arc::new(LibrdStatsHandler::new(Arc::clone(&self.sink), tags.clone())));

        let mut pool_metrics = Arc::new(PoolMetrics::default());
        let mut drain_metrics = Arc::new(DrainMetrics::default());
        let mut pipeline_metrics = Arc::new(PipelineMetrics::default());

        let consumer_handle = if cfg.consumer.enabled {
            let consumer = broker::build_consumer(&cfg, stats.clone())?;
            let mut chain = CallbackChain::new();
            chain.register(Box::new(Acker::new(Arc::clone(&self.store))));
            chain.register(Box::new(LatencyTracker::new(
                Arc::clone(&self.sink),
                tags.clone(),
            )));
            if cfg.is_dev() {
                chain.register(Box::new(Display));
            }
            pipeline_metrics = chain.metrics();
            let pipeline = ConsumerPipeline::new(consumer, chain, self.clock.clone());
            Some(pipeline.spawn(self.shutdown_rx.clone()))
        } else {
            None
        };

        let producer = if cfg.producer.enabled {
            let (events_tx, events_rx) = mpsc::unbounded_channel();
            let sink = Arc::new(broker::build_producer_sink(&cfg, events_tx)?);
            let drain = EventDrain::new(Arc::clone(&self.store), stats.clone());
            drain_metrics = drain.metrics();
            let drain_handle = drain.spawn(events_rx);
            let factory = MessageFactory::new(cfg.producer.payload_size, self.clock.clone());
            let pool = ProducerPool::new(
                sink,
                factory,
                PoolOptions {
                    total_messages: cfg.producer.total_messages,
                    concurrency: cfg.producer.concurrency,
                    queue_capacity: cfg.producer.queue_capacity,
                    delay: cfg.producer.delay(),
                    flush_timeout: cfg.producer.flush_timeout(),
                },
            )?;
            pool_metrics = pool.metrics();
            let run = pool.spawn(self.shutdown_rx.clone());
            Some((pool, run, drain_handle))
        } else {
            None
        };

        let reporter = Reporter::new(
            Arc::clone(&self.store),
            Arc::clone(&self.sink),
            cfg.reporter.interval(),
            tags,
        );
        let reporter_handle = tokio::spawn(reporter.run(self.shutdown_rx.clone()));

        if let Some(bind) = &cfg.telemetry.debug_bind {
            let state = DebugState {
                store: Arc::clone(&self.store),
                pool: Arc::clone(&pool_metrics),
                drain: Arc::clone(&drain_metrics),
                pipeline: Arc::clone(&pipeline_metrics),
            };
            telemetry::start_http(bind, state, self.log_handle.clone()).await?;
        }

        let watcher = self.spawn_shutdown_watcher();

        if let Some((pool, run, drain_handle)) = producer {
            let fed = pool.close(run).await?;
            drain_handle.await.context("joining event drain")?;
            tracing::info!(fed, "producer side quiescent");
            if cfg.consumer.enabled
                && cfg.producer.total_messages >= 0
                && !*self.shutdown_rx.borrow()
            {
                self.wait_for_catch_up().await;
            }
        } else {
            let mut rx = self.shutdown_rx.clone();
            while !*rx.borrow() {
                if rx.changed().await.is_err() {
                    break;
                }
            }
        }

        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = consumer_handle {
            handle.await.context("joining consumer pipeline")?;
        }
        let _ = reporter_handle.await;
        watcher.abort();

        let summary = summarize(&self.store.snapshot());
        tracing::info!(
            produced = summary.produced_total,
            consumed = summary.consumed_total,
            lost = summary.lost,
            unexpected = summary.unexpected,
            "run complete"
        );
        Ok(summary)
    }

    /// Flip the shutdown signal on SIGINT, SIGTERM, or the run deadline.
    fn spawn_shutdown_watcher(&self) -> JoinHandle<()> {
        let tx = self.shutdown_tx.clone();
        let mut rx = self.shutdown_rx.clone();
        let deadline = self.config.run_duration();
        tokio::spawn(async move {
            let deadline = async {
                match deadline {
                    Some(limit) => tokio::time::sleep(limit).await,
                    None => std::future::pending().await,
                }
            };
            tokio::select! {
                sig = shutdown_signal() => {
                    tracing::warn!("received {sig}, stopping the run");
                }
                _ = deadline => {
                    tracing::info!("run deadline reached");
                }
                _ = rx.changed() => {}
            }
            let _ = tx.send(true);
        })
    }

    /// Poll until every tracked produce has a matching consume. The feeder
    /// finishing a bounded run does not end the run on its own; confirmed
    /// messages may still be in flight toward the consumer.
    async fn wait_for_catch_up(&self) {
        tracing::debug!("waiting for the consumer to catch up");
        let mut rx = self.shutdown_rx.clone();
        loop {
            if self.store.fully_consumed() {
                tracing::info!("consumer caught up with produced traces");
                return;
            }
            tokio::select! {
                biased;
                changed = rx.changed() => {
                    if changed.is_err() || *rx.borrow() {
                        return;
                    }
                }
                _ = tokio::time::sleep(CATCH_UP_POLL) => {}
            }
        }
    }
}

/// Wait for shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() -> &'static str {
    let mut sigint = signal(SignalKind::interrupt()).expect("register SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("register SIGTERM handler");

    tokio::select! {
        _ = sigint.recv() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
    }
}

/// Tags attached to every statsd sample this run emits.
fn sample_tags(cfg: &Config) -> Vec<String> {
    let mut tags = Vec::new();
    if !cfg.librd_stats.cluster_name.is_empty() {
        tags.push(format!("cluster:{}", cfg.librd_stats.cluster_name));
    }
    tags.push(format!("topic:{}", cfg.producer.topic));
    tags.push(format!("ack:{}", cfg.producer.request_required_acks));
    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::SystemClock;

    #[test]
    fn tags_skip_the_cluster_when_unnamed() {
        let mut cfg = Config::default();
        cfg.producer.topic = "probe".into();
        cfg.producer.request_required_acks = -1;
        assert_eq!(sample_tags(&cfg), vec!["topic:probe", "ack:-1"]);
        cfg.librd_stats.cluster_name = "staging".into();
        assert_eq!(
            sample_tags(&cfg),
            vec!["cluster:staging", "topic:probe", "ack:-1"]
        );
    }

    #[test]
    fn construction_rejects_invalid_configuration() {
        let mut cfg = Config::default();
        cfg.producer.enabled = false;
        cfg.consumer.enabled = false;
        assert!(Harness::new(cfg, SystemClock, None).is_err());
    }

    #[tokio::test]
    async fn consumer_only_run_stops_at_the_deadline() {
        let mut cfg = Config::default();
        cfg.producer.enabled = false;
        cfg.run_duration_secs = 1;
        cfg.reporter.interval_secs = 0;
        let mut harness = Harness::new(cfg, SystemClock, None).expect("harness");
        let summary = harness.run().await.expect("run");
        assert_eq!(summary.produced_total, 0);
        assert_eq!(summary.consumed_total, 0);
        assert_eq!(summary.lost, 0);
    }
}

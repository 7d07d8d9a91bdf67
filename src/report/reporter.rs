//! Periodic verdict emission.
//!
//! The reporter owns read-only access to the trace store. On every tick it
//! folds a snapshot into a [`ReportSummary`], logs the headline counts and
//! mirrors them to statsd. The runtime asks for one final summary after all
//! clients have been torn down.

use crate::report::statsd::StatsdSink;
use crate::report::{summarize, ReportSummary};
use crate::trace::TraceStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::info;

pub struct Reporter {
    store: Arc<TraceStore>,
    sink: Arc<StatsdSink>,
    interval: Duration,
    tags: Vec<String>,
}

impl Reporter {
    pub fn new(
        store: Arc<TraceStore>,
        sink: Arc<StatsdSink>,
        interval: Duration,
        tags: Vec<String>,
    ) -> Self {
        Self {
            store,
            sink,
            interval,
            tags,
        }
    }

    /// Fold the current store contents into a verdict.
    pub fn summary(&self) -> ReportSummary {
        summarize(&self.store.snapshot())
    }

    /// Emit a summary every interval until shutdown. A zero interval
    /// disables periodic emission; the final summary still happens.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        if self.interval.is_zero() {
            while shutdown.changed().await.is_ok() {
                if *shutdown.borrow() {
                    break;
                }
            }
            return;
        }
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => self.emit(),
            }
        }
    }

    fn emit(&self) {
        let summary = self.summary();
        info!(
            produced = summary.produced_total,
            consumed = summary.consumed_total,
            delivered = summary.delivered,
            lost = summary.lost,
            unexpected = summary.unexpected,
            latency_p99_ms = summary.latency.p99_ms,
            "delivery progress"
        );
        self.forward(&summary);
    }

    fn forward(&self, summary: &ReportSummary) {
        let tags = &self.tags;
        self.sink.gauge("report.produced_total", summary.produced_total as f64, tags);
        self.sink.gauge("report.consumed_total", summary.consumed_total as f64, tags);
        self.sink.gauge("report.delivered", summary.delivered as f64, tags);
        self.sink.gauge("report.lost", summary.lost as f64, tags);
        self.sink.gauge("report.unexpected", summary.unexpected as f64, tags);
        self.sink.gauge(
            "report.duplicates.produced",
            summary.duplicate_produced as f64,
            tags,
        );
        self.sink.gauge(
            "report.duplicates.consumed",
            summary.duplicate_consumed as f64,
            tags,
        );
        if summary.latency.samples > 0 {
            self.sink.timing("report.latency.min", summary.latency.min_ms, tags);
            self.sink.timing("report.latency.p95", summary.latency.p95_ms, tags);
            self.sink.timing("report.latency.p99", summary.latency.p99_ms, tags);
            self.sink.gauge("report.latency.avg", summary.latency.avg_ms, tags);
        }
    }
}

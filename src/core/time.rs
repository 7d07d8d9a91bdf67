use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Clock abstraction to enforce deterministic time sourcing in core paths.
///
/// Trace reconciliation compares timestamps embedded in messages against
/// receive times, so the clock is wall time in epoch milliseconds rather
/// than a monotonic instant.
pub trait Clock: Clone + Send + Sync + 'static {
    fn epoch_millis(&self) -> i64;
}

/// System-backed clock; replaceable in tests or deterministic replay.
#[derive(Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn epoch_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Manually advanced clock for deterministic tests.
#[derive(Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn at(millis: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(millis)),
        }
    }

    pub fn advance(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn epoch_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

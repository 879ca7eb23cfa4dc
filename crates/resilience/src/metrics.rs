//! Metrics sink interface for the resilience layers
//!
//! Every component receives an `Arc<dyn MetricsSink>` and reports state
//! transitions, rejections and completions through it. All methods default to
//! no-ops so sinks only implement what they export. [`NoopMetrics`] is used
//! when the host injects nothing; [`InMemoryMetrics`] keeps counters, gauges
//! and duration histograms in memory for tests and health endpoints.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;

use crate::reliability::CircuitState;

/// Metric names reported by [`InMemoryMetrics`]
pub mod names {
    pub const CIRCUIT_REJECTED: &str = "circuit_breaker.rejected";
    pub const CIRCUIT_SUCCESS: &str = "circuit_breaker.success";
    pub const CIRCUIT_FAILURE: &str = "circuit_breaker.failure";
    pub const CIRCUIT_STATE: &str = "circuit_breaker.state";
    pub const BULKHEAD_ACTIVE: &str = "bulkhead.active";
    pub const BULKHEAD_WAITING: &str = "bulkhead.waiting";
    pub const BULKHEAD_REJECTED: &str = "bulkhead.rejected";
    pub const BULKHEAD_WAIT_DURATION: &str = "bulkhead.wait_duration";
    pub const BULKHEAD_EXECUTION_DURATION: &str = "bulkhead.execution_duration";
    pub const RETRY_ATTEMPTS: &str = "retry.attempts";
    pub const RETRY_SUCCESS: &str = "retry.success";
    pub const RETRY_EXHAUSTED: &str = "retry.exhausted";
    pub const TIMEOUT_EXCEEDED: &str = "timeout.exceeded";
    pub const TIMEOUT_DURATION: &str = "timeout.duration";
}

/// Receiver for resilience metrics
///
/// Implementations must be cheap and non-blocking; they are called on the hot
/// path. Components never hold their internal lock while calling a sink.
pub trait MetricsSink: Send + Sync {
    /// Breaker moved between states
    fn circuit_state_changed(&self, _operation: &str, _from: CircuitState, _to: CircuitState) {}

    /// Breaker refused a call
    fn circuit_rejected(&self, _operation: &str) {}

    /// Breaker recorded the outcome of an admitted call
    fn circuit_outcome(&self, _operation: &str, _success: bool) {}

    /// Current bulkhead occupancy
    fn bulkhead_gauges(&self, _operation: &str, _active: usize, _waiting: usize) {}

    /// Bulkhead rejected a call outright
    fn bulkhead_rejected(&self, _operation: &str) {}

    /// Time a call spent queued before it got a slot
    fn bulkhead_wait(&self, _operation: &str, _waited: Duration) {}

    /// Time a call held a slot
    fn bulkhead_execution(&self, _operation: &str, _elapsed: Duration) {}

    /// Retrier is about to make attempt number `attempt` (1-based)
    fn retry_attempt(&self, _operation: &str, _attempt: u32) {}

    /// Retrier finished after `attempts` attempts
    fn retry_finished(&self, _operation: &str, _attempts: u32, _success: bool) {}

    /// An attempt ran past its deadline
    fn timeout_exceeded(&self, _operation: &str, _timeout: Duration) {}

    /// An attempt finished within its deadline
    fn timeout_completed(&self, _operation: &str, _elapsed: Duration) {}
}

/// Sink that drops everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {}

/// Shared no-op sink
pub fn noop() -> Arc<dyn MetricsSink> {
    Arc::new(NoopMetrics)
}

/// Summary of a recorded duration distribution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DurationSummary {
    pub count: u64,
    pub total: Duration,
    pub min: Duration,
    pub max: Duration,
}

impl DurationSummary {
    pub fn mean(&self) -> Duration {
        if self.count == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros((self.total.as_micros() / self.count as u128) as u64)
    }
}

/// Lock-free duration histogram (count, sum, min, max)
#[derive(Debug)]
struct DurationHistogram {
    count: AtomicU64,
    sum_micros: AtomicU64,
    min_micros: AtomicU64,
    max_micros: AtomicU64,
}

impl DurationHistogram {
    fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            sum_micros: AtomicU64::new(0),
            min_micros: AtomicU64::new(u64::MAX),
            max_micros: AtomicU64::new(0),
        }
    }

    fn record(&self, duration: Duration) {
        let micros = duration.as_micros() as u64;

        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_micros.fetch_add(micros, Ordering::Relaxed);
        self.min_micros.fetch_min(micros, Ordering::Relaxed);
        self.max_micros.fetch_max(micros, Ordering::Relaxed);
    }

    fn summary(&self) -> DurationSummary {
        let count = self.count.load(Ordering::Relaxed);
        let min = self.min_micros.load(Ordering::Relaxed);
        DurationSummary {
            count,
            total: Duration::from_micros(self.sum_micros.load(Ordering::Relaxed)),
            min: if min == u64::MAX {
                Duration::ZERO
            } else {
                Duration::from_micros(min)
            },
            max: Duration::from_micros(self.max_micros.load(Ordering::Relaxed)),
        }
    }
}

type MetricKey = (String, String);

fn key(name: &str, operation: &str) -> MetricKey {
    (name.to_string(), operation.to_string())
}

/// In-memory metrics recorder
///
/// Counters, gauges and histograms are keyed by metric name and operation.
///
/// # Example
///
/// ```
/// use noteguard_resilience::metrics::{names, InMemoryMetrics, MetricsSink};
///
/// let metrics = InMemoryMetrics::new();
/// metrics.bulkhead_rejected("database");
/// metrics.bulkhead_rejected("database");
///
/// assert_eq!(metrics.counter(names::BULKHEAD_REJECTED, "database"), 2);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    counters: DashMap<MetricKey, AtomicU64>,
    gauges: DashMap<MetricKey, AtomicU64>,
    histograms: DashMap<MetricKey, DurationHistogram>,
    transitions: DashMap<String, Vec<(CircuitState, CircuitState)>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a counter (zero if never incremented)
    pub fn counter(&self, name: &str, operation: &str) -> u64 {
        self.counters
            .get(&key(name, operation))
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Last value written to a gauge
    pub fn gauge(&self, name: &str, operation: &str) -> Option<u64> {
        self.gauges
            .get(&key(name, operation))
            .map(|g| g.load(Ordering::Relaxed))
    }

    /// Distribution recorded under a histogram name
    pub fn histogram(&self, name: &str, operation: &str) -> Option<DurationSummary> {
        self.histograms
            .get(&key(name, operation))
            .map(|h| h.summary())
    }

    /// Breaker transitions observed for an operation, oldest first
    pub fn transitions(&self, operation: &str) -> Vec<(CircuitState, CircuitState)> {
        self.transitions
            .get(operation)
            .map(|t| t.value().clone())
            .unwrap_or_default()
    }

    fn increment(&self, name: &str, operation: &str, by: u64) {
        self.counters
            .entry(key(name, operation))
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(by, Ordering::Relaxed);
    }

    fn set_gauge(&self, name: &str, operation: &str, value: u64) {
        self.gauges
            .entry(key(name, operation))
            .or_insert_with(|| AtomicU64::new(0))
            .store(value, Ordering::Relaxed);
    }

    fn observe(&self, name: &str, operation: &str, duration: Duration) {
        self.histograms
            .entry(key(name, operation))
            .or_insert_with(DurationHistogram::new)
            .record(duration);
    }
}

impl MetricsSink for InMemoryMetrics {
    fn circuit_state_changed(&self, operation: &str, from: CircuitState, to: CircuitState) {
        self.set_gauge(names::CIRCUIT_STATE, operation, to.as_gauge());
        self.transitions
            .entry(operation.to_string())
            .or_default()
            .push((from, to));
    }

    fn circuit_rejected(&self, operation: &str) {
        self.increment(names::CIRCUIT_REJECTED, operation, 1);
    }

    fn circuit_outcome(&self, operation: &str, success: bool) {
        let name = if success {
            names::CIRCUIT_SUCCESS
        } else {
            names::CIRCUIT_FAILURE
        };
        self.increment(name, operation, 1);
    }

    fn bulkhead_gauges(&self, operation: &str, active: usize, waiting: usize) {
        self.set_gauge(names::BULKHEAD_ACTIVE, operation, active as u64);
        self.set_gauge(names::BULKHEAD_WAITING, operation, waiting as u64);
    }

    fn bulkhead_rejected(&self, operation: &str) {
        self.increment(names::BULKHEAD_REJECTED, operation, 1);
    }

    fn bulkhead_wait(&self, operation: &str, waited: Duration) {
        self.observe(names::BULKHEAD_WAIT_DURATION, operation, waited);
    }

    fn bulkhead_execution(&self, operation: &str, elapsed: Duration) {
        self.observe(names::BULKHEAD_EXECUTION_DURATION, operation, elapsed);
    }

    fn retry_attempt(&self, operation: &str, _attempt: u32) {
        self.increment(names::RETRY_ATTEMPTS, operation, 1);
    }

    fn retry_finished(&self, operation: &str, _attempts: u32, success: bool) {
        let name = if success {
            names::RETRY_SUCCESS
        } else {
            names::RETRY_EXHAUSTED
        };
        self.increment(name, operation, 1);
    }

    fn timeout_exceeded(&self, operation: &str, _timeout: Duration) {
        self.increment(names::TIMEOUT_EXCEEDED, operation, 1);
    }

    fn timeout_completed(&self, operation: &str, elapsed: Duration) {
        self.observe(names::TIMEOUT_DURATION, operation, elapsed);
    }
}

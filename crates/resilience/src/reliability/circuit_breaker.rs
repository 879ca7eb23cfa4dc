//! Circuit breaker
//!
//! Stops calling a failing dependency until it appears to have recovered.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, debug_span, info, warn, Instrument};

use super::layer::Guard;
use crate::config::duration_millis;
use crate::context::Context;
use crate::error::{BoxError, CircuitRejection, ConfigError, ResilienceError, ResilienceResult};
use crate::metrics::MetricsSink;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - all calls allowed
    Closed,

    /// Failure threshold exceeded - all calls rejected
    Open,

    /// Testing if service recovered - limited calls allowed
    HalfOpen,
}

impl CircuitState {
    /// Numeric encoding for gauges (closed = 0, half-open = 1, open = 2)
    pub fn as_gauge(&self) -> u64 {
        match self {
            Self::Closed => 0,
            Self::HalfOpen => 1,
            Self::Open => 2,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Circuit breaker configuration
///
/// # State Machine
///
/// ```text
/// ┌─────────┐  failure ratio    ┌─────────┐    cooldown     ┌──────────┐
/// │ Closed  │ ────────────────► │  Open   │ ──────────────► │ HalfOpen │
/// └─────────┘                   └─────────┘                 └──────────┘
///      ▲                             ▲        probe fails        │
///      │                             └───────────────────────────┤
///      │                    probe succeeds                       │
///      └─────────────────────────────────────────────────────────┘
/// ```
///
/// # Example
///
/// ```
/// use noteguard_resilience::CircuitBreakerConfig;
/// use std::time::Duration;
///
/// let config = CircuitBreakerConfig::default()
///     .with_failure_ratio(0.6)
///     .with_cooldown(Duration::from_secs(30))
///     .with_max_requests(3);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Failure ratio (0.0-1.0) at or above which the circuit opens
    pub failure_ratio: f64,

    /// Calls that must be observed in the current interval before the ratio counts
    pub min_requests: u32,

    /// Rolling interval after which closed-state counts reset (zero = never)
    #[serde(with = "duration_millis")]
    pub interval: Duration,

    /// How long the circuit stays open before admitting probes
    #[serde(with = "duration_millis")]
    pub cooldown: Duration,

    /// Concurrent probe calls admitted while half-open
    pub max_requests: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_ratio: 0.5,
            min_requests: 5,
            interval: Duration::from_secs(60),
            cooldown: Duration::from_secs(30),
            max_requests: 1,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new circuit breaker configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the failure ratio that opens the circuit
    pub fn with_failure_ratio(mut self, ratio: f64) -> Self {
        self.failure_ratio = ratio;
        self
    }

    /// Set the minimum number of calls before the ratio is evaluated
    pub fn with_min_requests(mut self, min_requests: u32) -> Self {
        self.min_requests = min_requests;
        self
    }

    /// Set the rolling evaluation interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the open-state cooldown
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Set the number of half-open probes
    pub fn with_max_requests(mut self, max_requests: u32) -> Self {
        self.max_requests = max_requests;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.failure_ratio > 0.0 && self.failure_ratio <= 1.0) {
            return Err(ConfigError::invalid(
                "circuit breaker",
                format!("failure_ratio must be in (0, 1], got {}", self.failure_ratio),
            ));
        }
        if self.min_requests == 0 {
            return Err(ConfigError::invalid(
                "circuit breaker",
                "min_requests must be at least 1",
            ));
        }
        if self.max_requests == 0 {
            return Err(ConfigError::invalid(
                "circuit breaker",
                "max_requests must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Call tallies for the current generation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub requests: u32,
    pub total_successes: u32,
    pub total_failures: u32,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
}

impl Counts {
    fn on_request(&mut self) {
        self.requests = self.requests.saturating_add(1);
    }

    fn on_success(&mut self) {
        self.total_successes = self.total_successes.saturating_add(1);
        self.consecutive_successes = self.consecutive_successes.saturating_add(1);
        self.consecutive_failures = 0;
    }

    fn on_failure(&mut self) {
        self.total_failures = self.total_failures.saturating_add(1);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_successes = 0;
    }

    /// Failures over admitted requests (zero when nothing was admitted)
    pub fn failure_ratio(&self) -> f64 {
        if self.requests == 0 {
            return 0.0;
        }
        self.total_failures as f64 / self.requests as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Transition {
    from: CircuitState,
    to: CircuitState,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    generation: u64,
    counts: Counts,
    expiry: Option<Instant>,
}

/// Per-operation circuit breaker
///
/// All state lives behind one internal mutex that is never held across an
/// await. Each admitted call carries the generation it was admitted under;
/// outcomes reported against an older generation are discarded, so two probes
/// finishing together cannot close the circuit twice.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
    metrics: Arc<dyn MetricsSink>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &self.inner.lock().state)
            .finish_non_exhaustive()
    }
}

impl CircuitBreaker {
    /// Create a closed circuit breaker
    pub fn new(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_validated(name, config, metrics))
    }

    pub(crate) fn from_validated(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let expiry = interval_expiry(&config, Instant::now());

        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                generation: 0,
                counts: Counts::default(),
                expiry,
            }),
            metrics,
        }
    }

    /// Stable identifier used in logs and metrics
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state, applying any transition that is due by now
    pub fn state(&self) -> CircuitState {
        let (state, transition) = {
            let mut inner = self.inner.lock();
            let transition = self.refresh(&mut inner, Instant::now());
            (inner.state, transition)
        };
        self.announce(transition);
        state
    }

    /// Tallies for the current generation
    pub fn counts(&self) -> Counts {
        let mut inner = self.inner.lock();
        let transition = self.refresh(&mut inner, Instant::now());
        let counts = inner.counts;
        drop(inner);
        self.announce(transition);
        counts
    }

    /// Admit a call or reject it, returning the admitting generation
    fn before_call(&self) -> ResilienceResult<u64> {
        let (admission, transition) = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            let transition = self.refresh(inner, Instant::now());

            let state = inner.state;
            let admission = match state {
                CircuitState::Open => Err(CircuitRejection::OpenState),
                CircuitState::HalfOpen if inner.counts.requests >= self.config.max_requests => {
                    Err(CircuitRejection::TooManyRequests)
                }
                _ => {
                    inner.counts.on_request();
                    Ok(inner.generation)
                }
            };
            (admission, transition)
        };
        self.announce(transition);

        admission.map_err(|cause| {
            self.metrics.circuit_rejected(&self.name);
            debug!(operation = %self.name, reason = %cause, "Circuit breaker rejected call");
            ResilienceError::CircuitOpen {
                operation: self.name.clone(),
                cause,
            }
        })
    }

    /// Record the outcome of a call admitted under `generation`
    fn after_call(&self, generation: u64, success: bool) {
        let (transition, recorded) = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            let now = Instant::now();
            let state = inner.state;

            if let Some(transition) = self.refresh(inner, now) {
                (Some(transition), false)
            } else if inner.generation != generation {
                (None, false)
            } else if success {
                inner.counts.on_success();
                let transition = match state {
                    CircuitState::HalfOpen => self.set_state(inner, CircuitState::Closed, now),
                    _ => None,
                };
                (transition, true)
            } else {
                inner.counts.on_failure();
                let transition = match state {
                    CircuitState::Closed if self.ready_to_trip(&inner.counts) => {
                        self.set_state(inner, CircuitState::Open, now)
                    }
                    CircuitState::HalfOpen => self.set_state(inner, CircuitState::Open, now),
                    _ => None,
                };
                (transition, true)
            }
        };

        if recorded {
            self.metrics.circuit_outcome(&self.name, success);
        }
        self.announce(transition);
    }

    fn ready_to_trip(&self, counts: &Counts) -> bool {
        counts.requests >= self.config.min_requests
            && counts.failure_ratio() >= self.config.failure_ratio
    }

    /// Apply time-based transitions: interval rollover and cooldown expiry
    fn refresh(&self, inner: &mut BreakerState, now: Instant) -> Option<Transition> {
        match (inner.state, inner.expiry) {
            (CircuitState::Closed, Some(expiry)) if expiry <= now => {
                self.start_generation(inner, now);
                None
            }
            (CircuitState::Open, Some(expiry)) if expiry <= now => {
                self.set_state(inner, CircuitState::HalfOpen, now)
            }
            _ => None,
        }
    }

    fn set_state(
        &self,
        inner: &mut BreakerState,
        to: CircuitState,
        now: Instant,
    ) -> Option<Transition> {
        if inner.state == to {
            return None;
        }

        let from = inner.state;
        inner.state = to;
        self.start_generation(inner, now);
        Some(Transition { from, to })
    }

    fn start_generation(&self, inner: &mut BreakerState, now: Instant) {
        inner.generation += 1;
        inner.counts = Counts::default();
        inner.expiry = match inner.state {
            CircuitState::Closed => interval_expiry(&self.config, now),
            // A cooldown too long to represent never elapses
            CircuitState::Open => now.checked_add(self.config.cooldown),
            CircuitState::HalfOpen => None,
        };
    }

    /// Report a transition to logs and metrics (called without the lock held)
    fn announce(&self, transition: Option<Transition>) {
        let Some(Transition { from, to }) = transition else {
            return;
        };

        match to {
            CircuitState::Open => warn!(
                operation = %self.name,
                %from,
                cooldown_ms = self.config.cooldown.as_millis() as u64,
                "Circuit breaker opened"
            ),
            CircuitState::HalfOpen => info!(operation = %self.name, %from, "Circuit breaker half-open"),
            CircuitState::Closed => info!(operation = %self.name, %from, "Circuit breaker closed"),
        }
        self.metrics.circuit_state_changed(&self.name, from, to);
    }
}

/// End of the Closed counting window, or `None` when counts never roll over
fn interval_expiry(config: &CircuitBreakerConfig, now: Instant) -> Option<Instant> {
    if config.interval.is_zero() {
        return None;
    }
    now.checked_add(config.interval)
}

/// Reports the outcome of an admitted call exactly once; a call that is
/// dropped or unwinds before finishing counts as a failure.
struct CallGuard<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    armed: bool,
}

impl<'a> CallGuard<'a> {
    fn new(breaker: &'a CircuitBreaker, generation: u64) -> Self {
        Self {
            breaker,
            generation,
            armed: true,
        }
    }

    fn finish(mut self, success: bool) {
        self.armed = false;
        self.breaker.after_call(self.generation, success);
    }
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.after_call(self.generation, false);
        }
    }
}

impl Guard for CircuitBreaker {
    fn run<'a, F, Fut, T, E>(
        &'a self,
        ctx: &'a Context,
        op: F,
    ) -> impl Future<Output = ResilienceResult<T>> + Send + 'a
    where
        F: Fn(Context) -> Fut + Send + Sync + 'a,
        Fut: Future<Output = Result<T, E>> + Send + 'a,
        T: Send + 'a,
        E: Into<BoxError> + Send + 'a,
    {
        let span = debug_span!("circuit_breaker", operation = %self.name);
        async move {
            let generation = self.before_call()?;
            let guard = CallGuard::new(self, generation);

            let result = op(ctx.clone())
                .await
                .map_err(ResilienceError::from_operation);

            guard.finish(result.is_ok());
            result
        }
        .instrument(span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::metrics::{names, InMemoryMetrics};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Notify;

    fn config() -> CircuitBreakerConfig {
        CircuitBreakerConfig::new()
            .with_failure_ratio(0.5)
            .with_min_requests(4)
            .with_interval(Duration::from_secs(60))
            .with_cooldown(Duration::from_secs(10))
            .with_max_requests(2)
    }

    fn breaker_with(config: CircuitBreakerConfig) -> (Arc<CircuitBreaker>, Arc<InMemoryMetrics>) {
        let metrics = Arc::new(InMemoryMetrics::new());
        let breaker = CircuitBreaker::new("database", config, metrics.clone()).unwrap();
        (Arc::new(breaker), metrics)
    }

    async fn succeed(breaker: &CircuitBreaker) -> ResilienceResult<()> {
        breaker
            .run(&Context::background(), |_| async { Ok::<_, BoxError>(()) })
            .await
    }

    async fn fail(breaker: &CircuitBreaker) -> ResilienceResult<()> {
        breaker
            .run(&Context::background(), |_| async { Err::<(), _>("db down") })
            .await
    }

    async fn trip(breaker: &CircuitBreaker) {
        for _ in 0..4 {
            let _ = fail(breaker).await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn test_default_config() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_ratio, 0.5);
        assert_eq!(config.min_requests, 5);
        assert_eq!(config.cooldown, Duration::from_secs(30));
        assert_eq!(config.max_requests, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        assert!(config().with_failure_ratio(0.0).validate().is_err());
        assert!(config().with_failure_ratio(1.5).validate().is_err());
        assert!(config().with_failure_ratio(f64::NAN).validate().is_err());
        assert!(config().with_max_requests(0).validate().is_err());
        assert!(config().with_min_requests(0).validate().is_err());
        assert!(CircuitBreaker::new("x", config().with_max_requests(0), crate::metrics::noop()).is_err());
    }

    #[test]
    fn test_circuit_state_display() {
        assert_eq!(CircuitState::Closed.to_string(), "closed");
        assert_eq!(CircuitState::Open.to_string(), "open");
        assert_eq!(CircuitState::HalfOpen.to_string(), "half_open");
    }

    #[test]
    fn test_serialization() {
        let config = config();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"cooldown\":10000"));
        let parsed: CircuitBreakerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, parsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_durations_do_not_overflow() {
        let (breaker, _) = breaker_with(
            config()
                .with_interval(Duration::MAX)
                .with_cooldown(Duration::MAX),
        );

        trip(&breaker).await;
        tokio::time::advance(Duration::from_secs(86_400)).await;

        assert_eq!(breaker.state(), CircuitState::Open);
        let err = succeed(&breaker).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::CircuitOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_starts_closed() {
        let (breaker, _) = breaker_with(config());
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.name(), "database");
        assert_eq!(breaker.counts(), Counts::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stays_closed_below_min_requests() {
        let (breaker, _) = breaker_with(config());

        for _ in 0..3 {
            assert!(fail(&breaker).await.is_err());
        }

        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.counts().total_failures, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_when_ratio_reached() {
        let (breaker, metrics) = breaker_with(config());

        succeed(&breaker).await.unwrap();
        succeed(&breaker).await.unwrap();
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Closed);

        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(
            metrics.transitions("database"),
            vec![(CircuitState::Closed, CircuitState::Open)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejects_without_calling_when_open() {
        let (breaker, metrics) = breaker_with(config());
        trip(&breaker).await;

        let calls = AtomicU32::new(0);
        let err = breaker
            .run(&Context::background(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, BoxError>(()) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(err.code(), ErrorCode::CircuitOpen);
        assert!(matches!(
            err,
            ResilienceError::CircuitOpen {
                cause: CircuitRejection::OpenState,
                ..
            }
        ));
        assert_eq!(metrics.counter(names::CIRCUIT_REJECTED, "database"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_after_cooldown() {
        let (breaker, _) = breaker_with(config());
        trip(&breaker).await;

        tokio::time::advance(Duration::from_secs(9)).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_admits_exactly_max_requests() {
        let (breaker, _) = breaker_with(config());
        trip(&breaker).await;
        tokio::time::advance(Duration::from_secs(10)).await;

        let release = Arc::new(Notify::new());
        let mut probes = Vec::new();
        for _ in 0..2 {
            let breaker = breaker.clone();
            let release = release.clone();
            probes.push(tokio::spawn(async move {
                breaker
                    .run(&Context::background(), |_| {
                        let release = release.clone();
                        async move {
                            release.notified().await;
                            Ok::<_, BoxError>(())
                        }
                    })
                    .await
            }));
        }

        while breaker.counts().requests < 2 {
            tokio::task::yield_now().await;
        }

        let err = succeed(&breaker).await.unwrap_err();
        assert!(matches!(
            err,
            ResilienceError::CircuitOpen {
                cause: CircuitRejection::TooManyRequests,
                ..
            }
        ));

        release.notify_waiters();
        for probe in probes {
            probe.await.unwrap().unwrap();
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_failure_reopens() {
        let (breaker, metrics) = breaker_with(config());
        trip(&breaker).await;
        tokio::time::advance(Duration::from_secs(10)).await;

        assert!(fail(&breaker).await.is_err());
        assert_eq!(breaker.state(), CircuitState::Open);

        // Cooldown restarts from the failed probe
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        assert_eq!(
            metrics.transitions("database"),
            vec![
                (CircuitState::Closed, CircuitState::Open),
                (CircuitState::Open, CircuitState::HalfOpen),
                (CircuitState::HalfOpen, CircuitState::Open),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_success_closes_and_resets_counts() {
        let (breaker, _) = breaker_with(config());
        trip(&breaker).await;
        tokio::time::advance(Duration::from_secs(10)).await;

        succeed(&breaker).await.unwrap();

        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.counts(), Counts::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_probe_successes_close_once() {
        let (breaker, metrics) = breaker_with(config());
        trip(&breaker).await;
        tokio::time::advance(Duration::from_secs(10)).await;

        let release = Arc::new(Notify::new());
        let probe = |breaker: Arc<CircuitBreaker>, release: Arc<Notify>| async move {
            breaker
                .run(&Context::background(), |_| {
                    let release = release.clone();
                    async move {
                        release.notified().await;
                        Ok::<_, BoxError>(())
                    }
                })
                .await
        };
        let first = tokio::spawn(probe(breaker.clone(), release.clone()));
        let second = tokio::spawn(probe(breaker.clone(), release.clone()));

        while breaker.counts().requests < 2 {
            tokio::task::yield_now().await;
        }
        release.notify_waiters();
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        let closes = metrics
            .transitions("database")
            .into_iter()
            .filter(|(_, to)| *to == CircuitState::Closed)
            .count();
        assert_eq!(closes, 1);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_counts_roll_over_after_interval() {
        let (breaker, _) = breaker_with(config());

        for _ in 0..3 {
            let _ = fail(&breaker).await;
        }
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(breaker.counts(), Counts::default());

        // A single failure in the new window is below min_requests
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_probe_counts_as_failure() {
        let (breaker, _) = breaker_with(config());
        trip(&breaker).await;
        tokio::time::advance(Duration::from_secs(10)).await;

        let ctx = Context::background();
        {
            let probe = breaker.run(&ctx, |_| std::future::pending::<Result<(), BoxError>>());
            tokio::pin!(probe);
            assert!(futures::poll!(probe.as_mut()).is_pending());
            assert_eq!(breaker.counts().requests, 1);
        }

        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_outcome_metrics() {
        let (breaker, metrics) = breaker_with(config());
        succeed(&breaker).await.unwrap();
        let _ = fail(&breaker).await;

        assert_eq!(metrics.counter(names::CIRCUIT_SUCCESS, "database"), 1);
        assert_eq!(metrics.counter(names::CIRCUIT_FAILURE, "database"), 1);
    }
}

//! Retry with exponential backoff

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, debug_span, warn, Instrument};

use super::layer::Guard;
use crate::config::duration_millis;
use crate::context::Context;
use crate::error::{BoxError, ConfigError, ErrorCode, ResilienceError, ResilienceResult};
use crate::metrics::MetricsSink;

/// Decides whether a failed attempt may be retried
pub type RetryPredicate = Arc<dyn Fn(&ResilienceError) -> bool + Send + Sync>;

/// Codes that are never worth retrying: rejections and a finished caller context
const ALWAYS_TERMINAL: [ErrorCode; 4] = [
    ErrorCode::CircuitOpen,
    ErrorCode::BulkheadFull,
    ErrorCode::Cancelled,
    ErrorCode::DeadlineExceeded,
];

/// Retry configuration
///
/// Supports exponential backoff with jitter to avoid thundering herd.
///
/// # Example
///
/// ```
/// use noteguard_resilience::RetryConfig;
/// use std::time::Duration;
///
/// let config = RetryConfig::exponential()
///     .with_max_attempts(4)
///     .with_initial_interval(Duration::from_millis(50))
///     .with_max_interval(Duration::from_secs(1));
///
/// // First retry after ~50ms
/// // Second retry after ~100ms
/// // Third retry after ~200ms
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts (including initial)
    pub max_attempts: u32,

    /// Initial delay before first retry
    #[serde(with = "duration_millis")]
    pub initial_interval: Duration,

    /// Maximum delay between retries
    #[serde(with = "duration_millis")]
    pub max_interval: Duration,

    /// Backoff multiplier (e.g., 2.0 for exponential)
    pub backoff_coefficient: f64,

    /// Jitter factor (0.0-1.0) to add randomness
    ///
    /// A value of 0.1 means ±10% randomness.
    pub jitter: f64,

    /// Error codes that should NOT be retried
    #[serde(default)]
    pub non_retryable_codes: Vec<ErrorCode>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::exponential()
    }
}

impl RetryConfig {
    /// Create an exponential backoff retry configuration
    ///
    /// - 3 max attempts
    /// - 100ms initial interval
    /// - 2 second max interval
    /// - 2x backoff coefficient
    /// - 10% jitter
    pub fn exponential() -> Self {
        Self {
            max_attempts: 3,
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(2),
            backoff_coefficient: 2.0,
            jitter: 0.1,
            non_retryable_codes: vec![],
        }
    }

    /// Create a configuration that never retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_interval: Duration::ZERO,
            max_interval: Duration::ZERO,
            backoff_coefficient: 1.0,
            jitter: 0.0,
            non_retryable_codes: vec![],
        }
    }

    /// Create a configuration with fixed intervals (no backoff)
    pub fn fixed(interval: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_interval: interval,
            max_interval: interval,
            backoff_coefficient: 1.0,
            jitter: 0.0,
            non_retryable_codes: vec![],
        }
    }

    /// Set the maximum number of attempts
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the initial retry interval
    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    /// Set the maximum retry interval
    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    /// Set the backoff coefficient
    pub fn with_backoff_coefficient(mut self, coefficient: f64) -> Self {
        self.backoff_coefficient = coefficient;
        self
    }

    /// Set the jitter factor (0.0-1.0)
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Add an error code that should not be retried
    pub fn with_non_retryable_code(mut self, code: ErrorCode) -> Self {
        self.non_retryable_codes.push(code);
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid(
                "retry",
                "max_attempts must be at least 1",
            ));
        }
        if !(self.backoff_coefficient >= 1.0 && self.backoff_coefficient.is_finite()) {
            return Err(ConfigError::invalid(
                "retry",
                format!(
                    "backoff_coefficient must be a finite value >= 1.0, got {}",
                    self.backoff_coefficient
                ),
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(ConfigError::invalid(
                "retry",
                format!("jitter must be in [0, 1], got {}", self.jitter),
            ));
        }
        Ok(())
    }

    /// Calculate delay for a given attempt number (1-based)
    ///
    /// Returns the duration to wait before that attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }

        let retry_num = attempt - 1; // First retry is after attempt 1
        let exponent = i32::try_from(retry_num - 1).unwrap_or(i32::MAX);
        let base = self.initial_interval.as_secs_f64() * self.backoff_coefficient.powi(exponent);
        let capped = base.min(self.max_interval.as_secs_f64());

        // Apply jitter
        let jitter_range = capped * self.jitter;
        let jittered = if jitter_range > 0.0 {
            let mut rng = rand::thread_rng();
            let jitter_offset = rng.gen_range(-jitter_range..jitter_range);
            (capped + jitter_offset).max(0.0)
        } else {
            capped
        };

        Duration::from_secs_f64(jittered)
    }

    /// Check if an error should be retried under this configuration
    pub fn should_retry(&self, err: &ResilienceError) -> bool {
        let code = err.code();
        !ALWAYS_TERMINAL.contains(&code) && !self.non_retryable_codes.contains(&code)
    }

    /// Predicate equivalent to [`RetryConfig::should_retry`]
    pub fn default_predicate(&self) -> RetryPredicate {
        let config = self.clone();
        Arc::new(move |err: &ResilienceError| config.should_retry(err))
    }
}

/// Per-operation retrier
pub struct Retrier {
    name: String,
    config: RetryConfig,
    predicate: RetryPredicate,
    metrics: Arc<dyn MetricsSink>,
}

impl fmt::Debug for Retrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retrier")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Retrier {
    pub fn new(
        name: impl Into<String>,
        config: RetryConfig,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_validated(name, config, metrics))
    }

    pub(crate) fn from_validated(
        name: impl Into<String>,
        config: RetryConfig,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            name: name.into(),
            predicate: config.default_predicate(),
            config,
            metrics,
        }
    }

    /// Replace the retryable/terminal classification
    pub fn with_predicate(mut self, predicate: RetryPredicate) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// Backoff before attempt `attempt` (1-based, so attempt 1 has none)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.config.delay_for_attempt(attempt)
    }

    fn finish<T>(&self, attempts: u32, result: ResilienceResult<T>) -> ResilienceResult<T> {
        self.metrics
            .retry_finished(&self.name, attempts, result.is_ok());
        result
    }
}

impl Guard for Retrier {
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
        let span = debug_span!("retry", operation = %self.name);
        async move {
            if let Some(reason) = ctx.err() {
                return Err(reason.into());
            }

            let mut attempt = 0;
            loop {
                attempt += 1;
                self.metrics.retry_attempt(&self.name, attempt);

                let err = match op(ctx.clone()).await {
                    Ok(value) => {
                        if attempt > 1 {
                            debug!(operation = %self.name, attempt, "Succeeded after retry");
                        }
                        return self.finish(attempt, Ok(value));
                    }
                    Err(err) => ResilienceError::from_operation(err),
                };

                if !(self.predicate)(&err) {
                    debug!(operation = %self.name, attempt, code = %err.code(), "Error is not retryable");
                    return self.finish(attempt, Err(err));
                }

                if attempt >= self.config.max_attempts {
                    warn!(
                        operation = %self.name,
                        attempts = attempt,
                        error = %err,
                        "Retries exhausted"
                    );
                    return self.finish(
                        attempt,
                        Err(ResilienceError::MaxRetriesExceeded {
                            operation: self.name.clone(),
                            attempts: attempt,
                            last_error: Box::new(err),
                        }),
                    );
                }

                let delay = self.delay_for_attempt(attempt + 1);
                debug!(
                    operation = %self.name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retrying after failure"
                );

                tokio::select! {
                    biased;
                    reason = ctx.done() => return self.finish(attempt, Err(reason.into())),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
        .instrument(span)
    }
}

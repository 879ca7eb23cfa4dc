//! Per-attempt deadline enforcement

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, debug_span, Instrument};

use super::layer::Guard;
use crate::config::{duration_millis, duration_millis_map};
use crate::context::Context;
use crate::error::{BoxError, ConfigError, ResilienceError, ResilienceResult};
use crate::metrics::{self, MetricsSink};

/// Operation names with a dedicated timeout field
pub const DATABASE: &str = "database";
pub const EXTERNAL_API: &str = "external_api";

/// Named timeouts
///
/// Lookup order for an operation: `operations`, then the named field
/// (`database`, `external_api`), then `default`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Fallback for operations without a specific timeout
    #[serde(with = "duration_millis")]
    pub default: Duration,

    #[serde(with = "duration_millis")]
    pub database: Duration,

    #[serde(with = "duration_millis")]
    pub external_api: Duration,

    /// Per-operation overrides
    #[serde(default, with = "duration_millis_map")]
    pub operations: BTreeMap<String, Duration>,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            default: Duration::from_secs(10),
            database: Duration::from_secs(5),
            external_api: Duration::from_secs(30),
            operations: BTreeMap::new(),
        }
    }
}

impl TimeoutConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default(mut self, timeout: Duration) -> Self {
        self.default = timeout;
        self
    }

    pub fn with_database(mut self, timeout: Duration) -> Self {
        self.database = timeout;
        self
    }

    pub fn with_external_api(mut self, timeout: Duration) -> Self {
        self.external_api = timeout;
        self
    }

    /// Override the timeout for one operation
    pub fn with_operation(mut self, name: impl Into<String>, timeout: Duration) -> Self {
        self.operations.insert(name.into(), timeout);
        self
    }

    /// Timeout that applies to `operation`
    pub fn duration_for(&self, operation: &str) -> Duration {
        if let Some(timeout) = self.operations.get(operation) {
            return *timeout;
        }

        match operation {
            DATABASE => self.database,
            EXTERNAL_API => self.external_api,
            _ => self.default,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let named = [
            ("default", self.default),
            (DATABASE, self.database),
            (EXTERNAL_API, self.external_api),
        ];
        let overrides = self
            .operations
            .iter()
            .map(|(name, timeout)| (name.as_str(), *timeout));

        for (name, timeout) in named.into_iter().chain(overrides) {
            if timeout.is_zero() {
                return Err(ConfigError::invalid(
                    "timeout",
                    format!("timeout for '{name}' must be greater than zero"),
                ));
            }
        }
        Ok(())
    }
}

/// Per-operation timeout
///
/// Each call gets a child context whose deadline is the earlier of the
/// caller's deadline and `now + duration`. When the deadline wins, the attempt
/// future is dropped and the child context is cancelled; work the attempt
/// handed off elsewhere (spawned tasks, blocking threads) keeps running unless
/// it watches that context.
pub struct Timeout {
    name: String,
    duration: Duration,
    metrics: Arc<dyn MetricsSink>,
}

impl std::fmt::Debug for Timeout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timeout")
            .field("name", &self.name)
            .field("duration", &self.duration)
            .finish_non_exhaustive()
    }
}

impl Timeout {
    pub fn new(name: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            duration,
            metrics: metrics::noop(),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

impl Guard for Timeout {
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
        let span = debug_span!(
            "timeout",
            operation = %self.name,
            timeout_ms = self.duration.as_millis() as u64
        );
        async move {
            let attempt_ctx = ctx.with_timeout(self.duration);
            let started = Instant::now();

            tokio::select! {
                biased;
                result = op(attempt_ctx.clone()) => {
                    self.metrics.timeout_completed(&self.name, started.elapsed());
                    result.map_err(ResilienceError::from_operation)
                }
                reason = attempt_ctx.done() => {
                    attempt_ctx.cancel();

                    // The caller's own cancellation or earlier deadline is not ours to report
                    if let Some(parent) = ctx.err() {
                        return Err(parent.into());
                    }

                    self.metrics.timeout_exceeded(&self.name, self.duration);
                    debug!(
                        operation = %self.name,
                        timeout_ms = self.duration.as_millis() as u64,
                        "Attempt timed out"
                    );
                    Err(ResilienceError::TimeoutExceeded {
                        operation: self.name.clone(),
                        timeout: self.duration,
                        cause: reason,
                    })
                }
            }
        }
        .instrument(span)
    }
}

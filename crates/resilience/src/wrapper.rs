//! Single entrypoint that runs a call through every configured layer
//!
//! Layers nest in a fixed order:
//!
//! ```text
//! execute ─► Bulkhead ─► CircuitBreaker ─► Retrier ─► Timeout ─► op
//! ```
//!
//! The breaker sits outside the retrier, so it records one outcome per
//! `execute` call however many attempts the retrier makes. The timeout sits
//! inside the retrier, so every attempt gets its own deadline.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info_span, Instrument};

use crate::config::ResilienceConfig;
use crate::context::Context;
use crate::error::{BoxError, ConfigError, ResilienceResult};
use crate::factory::{ComponentFactory, OperationLayers};
use crate::metrics::MetricsSink;
use crate::reliability::{CircuitState, Counts, Guard, RetryPredicate};

/// Resilience façade for outbound calls
///
/// # Example
///
/// ```
/// use noteguard_resilience::{presets, BoxError, Context, ResilienceWrapper};
///
/// # tokio_test::block_on(async {
/// let wrapper = ResilienceWrapper::new(presets::standard()).unwrap();
/// let ctx = Context::background();
///
/// let title = wrapper
///     .execute(&ctx, presets::DATABASE, |_ctx| async {
///         Ok::<_, BoxError>("Groceries".to_string())
///     })
///     .await
///     .unwrap();
///
/// assert_eq!(title, "Groceries");
/// # });
/// ```
#[derive(Debug)]
pub struct ResilienceWrapper {
    factory: ComponentFactory,
}

impl ResilienceWrapper {
    /// Validate `config` and build a wrapper around it
    pub fn new(config: ResilienceConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            factory: ComponentFactory::new(config)?,
        })
    }

    /// Wrapper with no layers: `execute` calls straight through
    pub fn passthrough() -> Self {
        Self {
            factory: ComponentFactory::unconfigured(),
        }
    }

    pub fn with_metrics(self, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            factory: self.factory.with_metrics(metrics),
        }
    }

    pub fn with_retry_predicate(self, predicate: RetryPredicate) -> Self {
        Self {
            factory: self.factory.with_retry_predicate(predicate),
        }
    }

    pub fn factory(&self) -> &ComponentFactory {
        &self.factory
    }

    /// Run `op` for `operation` through the bulkhead, circuit breaker, retrier
    /// and timeout configured for that name
    ///
    /// `op` may be invoked several times (once per retry attempt) and receives
    /// the context for that attempt, which carries the attempt deadline.
    pub async fn execute<F, Fut, T, E>(
        &self,
        ctx: &Context,
        operation: &str,
        op: F,
    ) -> ResilienceResult<T>
    where
        F: Fn(Context) -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: Into<BoxError> + Send,
    {
        let layers = self.factory.layers(operation);
        let OperationLayers {
            bulkhead,
            circuit_breaker,
            retry,
            timeout,
        } = &*layers;
        let op = &op;

        let span = info_span!("resilience.execute", operation = %operation);
        async move {
            bulkhead
                .run(ctx, move |ctx| async move {
                    circuit_breaker
                        .run(&ctx, move |ctx| async move {
                            retry
                                .run(&ctx, move |ctx| async move { timeout.run(&ctx, op).await })
                                .await
                        })
                        .await
                })
                .await
        }
        .instrument(span)
        .await
    }

    /// Live state of every component created so far
    pub fn snapshot(&self) -> ResilienceSnapshot {
        let operations = self
            .factory
            .operations()
            .into_iter()
            .map(|name| {
                let layers = self.factory.layers(&name);
                (name, OperationSnapshot::capture(&layers))
            })
            .collect();

        ResilienceSnapshot { operations }
    }
}

/// Serializable view of component state, keyed by operation name
#[derive(Debug, Clone, Serialize)]
pub struct ResilienceSnapshot {
    pub operations: BTreeMap<String, OperationSnapshot>,
}

/// State of the layers for one operation (absent layers are unconfigured)
#[derive(Debug, Clone, Serialize)]
pub struct OperationSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circuit_breaker: Option<CircuitSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bulkhead: Option<BulkheadSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub counts: Counts,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct BulkheadSnapshot {
    pub active: usize,
    pub waiting: usize,
    pub max_concurrent: usize,
    pub max_waiting: usize,
}

impl OperationSnapshot {
    fn capture(layers: &OperationLayers) -> Self {
        Self {
            circuit_breaker: layers.circuit_breaker.component().map(|breaker| CircuitSnapshot {
                state: breaker.state(),
                counts: breaker.counts(),
            }),
            bulkhead: layers.bulkhead.component().map(|bulkhead| BulkheadSnapshot {
                active: bulkhead.active_count(),
                waiting: bulkhead.waiting_count(),
                max_concurrent: bulkhead.max_concurrent(),
                max_waiting: bulkhead.max_waiting(),
            }),
            max_attempts: layers.retry.component().map(|retrier| retrier.max_attempts()),
            timeout_ms: layers
                .timeout
                .component()
                .map(|timeout| timeout.duration().as_millis() as u64),
        }
    }
}

//! Per-operation component cache
//!
//! Components are created the first time an operation name is seen and then
//! reused for the life of the process, so every call for "database" shares one
//! breaker and one bulkhead. Creation is an atomic get-or-create on a
//! [`DashMap`] entry; concurrent first calls for the same name end up with the
//! same instance.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::config::ResilienceConfig;
use crate::error::ConfigError;
use crate::metrics::{self, MetricsSink};
use crate::reliability::{Bulkhead, CircuitBreaker, Layer, Retrier, RetryPredicate, Timeout};

/// The four layers resolved for one operation
///
/// Unconfigured layers are passthroughs.
#[derive(Clone)]
pub struct OperationLayers {
    pub bulkhead: Layer<Bulkhead>,
    pub circuit_breaker: Layer<CircuitBreaker>,
    pub retry: Layer<Retrier>,
    pub timeout: Layer<Timeout>,
}

/// Lazily creates and caches one component of each kind per operation name
pub struct ComponentFactory {
    config: ResilienceConfig,
    metrics: Arc<dyn MetricsSink>,
    retry_predicate: Option<RetryPredicate>,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    bulkheads: DashMap<String, Arc<Bulkhead>>,
    retriers: DashMap<String, Arc<Retrier>>,
    timeouts: DashMap<String, Arc<Timeout>>,
    layers: DashMap<String, Arc<OperationLayers>>,
}

impl std::fmt::Debug for ComponentFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentFactory")
            .field("config", &self.config)
            .field("operations", &self.operations())
            .finish_non_exhaustive()
    }
}

fn get_or_create<G>(
    cache: &DashMap<String, Arc<G>>,
    operation: &str,
    create: impl FnOnce() -> G,
) -> Arc<G> {
    if let Some(existing) = cache.get(operation) {
        return Arc::clone(existing.value());
    }

    let entry = cache
        .entry(operation.to_string())
        .or_insert_with(|| Arc::new(create()));
    Arc::clone(entry.value())
}

impl ComponentFactory {
    /// Validate `config` and create an empty cache
    pub fn new(config: ResilienceConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_validated(config))
    }

    /// Factory with every layer unconfigured
    pub fn unconfigured() -> Self {
        Self::from_validated(ResilienceConfig::default())
    }

    fn from_validated(config: ResilienceConfig) -> Self {
        Self {
            config,
            metrics: metrics::noop(),
            retry_predicate: None,
            breakers: DashMap::new(),
            bulkheads: DashMap::new(),
            retriers: DashMap::new(),
            timeouts: DashMap::new(),
            layers: DashMap::new(),
        }
    }

    /// Report metrics from every component created from now on
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self.clear();
        self
    }

    /// Classify retryable errors with `predicate` instead of the config-derived default
    pub fn with_retry_predicate(mut self, predicate: RetryPredicate) -> Self {
        self.retry_predicate = Some(predicate);
        self.clear();
        self
    }

    fn clear(&mut self) {
        self.breakers.clear();
        self.bulkheads.clear();
        self.retriers.clear();
        self.timeouts.clear();
        self.layers.clear();
    }

    pub fn config(&self) -> &ResilienceConfig {
        &self.config
    }

    /// Circuit breaker for `operation`, if circuit breaking is configured
    pub fn circuit_breaker(&self, operation: &str) -> Option<Arc<CircuitBreaker>> {
        let policies = self.config.circuit_breaker.as_ref()?;
        Some(get_or_create(&self.breakers, operation, || {
            debug!(operation, "Creating circuit breaker");
            CircuitBreaker::from_validated(
                operation,
                policies.policy_for(operation).clone(),
                self.metrics.clone(),
            )
        }))
    }

    /// Bulkhead for `operation`, if bulkheads are configured
    pub fn bulkhead(&self, operation: &str) -> Option<Arc<Bulkhead>> {
        let policies = self.config.bulkhead.as_ref()?;
        Some(get_or_create(&self.bulkheads, operation, || {
            debug!(operation, "Creating bulkhead");
            Bulkhead::from_validated(
                operation,
                policies.policy_for(operation).clone(),
                self.metrics.clone(),
            )
        }))
    }

    /// Retrier for `operation`, if retries are configured
    pub fn retrier(&self, operation: &str) -> Option<Arc<Retrier>> {
        let policies = self.config.retry.as_ref()?;
        Some(get_or_create(&self.retriers, operation, || {
            debug!(operation, "Creating retrier");
            let retrier = Retrier::from_validated(
                operation,
                policies.policy_for(operation).clone(),
                self.metrics.clone(),
            );
            match &self.retry_predicate {
                Some(predicate) => retrier.with_predicate(Arc::clone(predicate)),
                None => retrier,
            }
        }))
    }

    /// Timeout for `operation`, if timeouts are configured
    pub fn timeout(&self, operation: &str) -> Option<Arc<Timeout>> {
        let timeouts = self.config.timeout.as_ref()?;
        Some(get_or_create(&self.timeouts, operation, || {
            debug!(operation, "Creating timeout");
            Timeout::new(operation, timeouts.duration_for(operation))
                .with_metrics(self.metrics.clone())
        }))
    }

    /// Every layer for `operation`, resolved once and cached
    pub fn layers(&self, operation: &str) -> Arc<OperationLayers> {
        get_or_create(&self.layers, operation, || OperationLayers {
            bulkhead: self.bulkhead(operation).into(),
            circuit_breaker: self.circuit_breaker(operation).into(),
            retry: self.retrier(operation).into(),
            timeout: self.timeout(operation).into(),
        })
    }

    /// Operation names seen so far, sorted
    pub fn operations(&self) -> Vec<String> {
        let mut names: Vec<String> = self.layers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

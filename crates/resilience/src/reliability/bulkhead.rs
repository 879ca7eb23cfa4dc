//! Bulkhead admission control
//!
//! Caps the number of calls in flight for one operation and queues a bounded
//! number of extra callers. Anything beyond that is rejected immediately.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::time::Instant;
use tracing::{debug, debug_span, Instrument};

use super::layer::Guard;
use crate::context::Context;
use crate::error::{
    BoxError, CapacityExhausted, ConfigError, ResilienceError, ResilienceResult,
};
use crate::metrics::MetricsSink;

/// Bulkhead configuration
///
/// # Example
///
/// ```
/// use noteguard_resilience::BulkheadConfig;
///
/// let config = BulkheadConfig::default()
///     .with_max_concurrent(4)
///     .with_max_waiting(0);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BulkheadConfig {
    /// Calls allowed to run at once
    pub max_concurrent: usize,

    /// Callers allowed to queue for a slot (zero = reject as soon as full)
    pub max_waiting: usize,
}

impl Default for BulkheadConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            max_waiting: 20,
        }
    }
}

impl BulkheadConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn with_max_waiting(mut self, max_waiting: usize) -> Self {
        self.max_waiting = max_waiting;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent == 0 {
            return Err(ConfigError::invalid(
                "bulkhead",
                "max_concurrent must be at least 1",
            ));
        }
        if self.max_concurrent > Semaphore::MAX_PERMITS {
            return Err(ConfigError::invalid(
                "bulkhead",
                format!("max_concurrent must not exceed {}", Semaphore::MAX_PERMITS),
            ));
        }
        Ok(())
    }
}

/// Per-operation bulkhead
///
/// A semaphore hands out execution slots; `active` and `waiting` mirror what
/// the semaphore and the queue hold so they can be read without locking. Both
/// counters are released by guards, so a call that panics or is dropped
/// mid-flight leaves them consistent.
pub struct Bulkhead {
    name: String,
    config: BulkheadConfig,
    slots: Semaphore,
    active: AtomicUsize,
    waiting: AtomicUsize,
    metrics: Arc<dyn MetricsSink>,
}

impl std::fmt::Debug for Bulkhead {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bulkhead")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("active", &self.active_count())
            .field("waiting", &self.waiting_count())
            .finish_non_exhaustive()
    }
}

impl Bulkhead {
    /// Create a bulkhead, failing if the limits cannot be honoured
    pub fn new(
        name: impl Into<String>,
        config: BulkheadConfig,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_validated(name, config, metrics))
    }

    pub(crate) fn from_validated(
        name: impl Into<String>,
        config: BulkheadConfig,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            name: name.into(),
            slots: Semaphore::new(config.max_concurrent),
            config,
            active: AtomicUsize::new(0),
            waiting: AtomicUsize::new(0),
            metrics,
        }
    }

    /// Create a bulkhead from signed limits as they arrive from loosely typed sources
    pub fn from_limits(
        name: impl Into<String>,
        max_concurrent: i64,
        max_waiting: i64,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self, ConfigError> {
        let max_concurrent = usize::try_from(max_concurrent).map_err(|_| {
            ConfigError::invalid(
                "bulkhead",
                format!("max_concurrent must be at least 1, got {max_concurrent}"),
            )
        })?;
        let max_waiting = usize::try_from(max_waiting).map_err(|_| {
            ConfigError::invalid(
                "bulkhead",
                format!("max_waiting must not be negative, got {max_waiting}"),
            )
        })?;

        Self::new(
            name,
            BulkheadConfig {
                max_concurrent,
                max_waiting,
            },
            metrics,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Calls currently holding a slot
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Calls currently queued for a slot
    pub fn waiting_count(&self) -> usize {
        self.waiting.load(Ordering::Acquire)
    }

    pub fn max_concurrent(&self) -> usize {
        self.config.max_concurrent
    }

    pub fn max_waiting(&self) -> usize {
        self.config.max_waiting
    }

    fn publish_gauges(&self) {
        self.metrics
            .bulkhead_gauges(&self.name, self.active_count(), self.waiting_count());
    }

    fn rejected(&self) -> ResilienceError {
        self.metrics.bulkhead_rejected(&self.name);
        debug!(
            operation = %self.name,
            max_concurrent = self.config.max_concurrent,
            max_waiting = self.config.max_waiting,
            "Bulkhead rejected call"
        );
        ResilienceError::BulkheadFull {
            operation: self.name.clone(),
            cause: CapacityExhausted {
                max_concurrent: self.config.max_concurrent,
                max_waiting: self.config.max_waiting,
            },
        }
    }

    /// Claim a place in the wait queue, or fail if it is full
    fn enqueue(&self) -> ResilienceResult<QueuedCall<'_>> {
        let mut current = self.waiting.load(Ordering::Acquire);
        loop {
            if current >= self.config.max_waiting {
                return Err(self.rejected());
            }
            match self.waiting.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        self.publish_gauges();
        Ok(QueuedCall { bulkhead: self })
    }

    /// Take a slot, queueing for one if necessary
    async fn admit(&self, ctx: &Context) -> ResilienceResult<SemaphorePermit<'_>> {
        if let Some(reason) = ctx.err() {
            return Err(reason.into());
        }
        if let Ok(permit) = self.slots.try_acquire() {
            return Ok(permit);
        }

        let queued = self.enqueue()?;
        let started = Instant::now();
        debug!(operation = %self.name, waiting = self.waiting_count(), "Waiting for bulkhead slot");

        let permit = tokio::select! {
            biased;
            permit = self.slots.acquire() => permit.map_err(|_| self.rejected())?,
            reason = ctx.done() => {
                debug!(operation = %self.name, %reason, "Gave up waiting for bulkhead slot");
                return Err(reason.into());
            }
        };

        drop(queued);
        self.metrics.bulkhead_wait(&self.name, started.elapsed());
        Ok(permit)
    }
}

/// Holds a place in the wait queue until dropped
struct QueuedCall<'a> {
    bulkhead: &'a Bulkhead,
}

impl Drop for QueuedCall<'_> {
    fn drop(&mut self) {
        self.bulkhead.waiting.fetch_sub(1, Ordering::AcqRel);
        self.bulkhead.publish_gauges();
    }
}

/// Marks a slot as in use until dropped (the permit itself returns the slot)
struct ActiveCall<'a> {
    bulkhead: &'a Bulkhead,
    _permit: SemaphorePermit<'a>,
    started: Instant,
}

impl<'a> ActiveCall<'a> {
    fn enter(bulkhead: &'a Bulkhead, permit: SemaphorePermit<'a>) -> Self {
        bulkhead.active.fetch_add(1, Ordering::AcqRel);
        bulkhead.publish_gauges();
        Self {
            bulkhead,
            _permit: permit,
            started: Instant::now(),
        }
    }
}

impl Drop for ActiveCall<'_> {
    fn drop(&mut self) {
        self.bulkhead.active.fetch_sub(1, Ordering::AcqRel);
        self.bulkhead
            .metrics
            .bulkhead_execution(&self.bulkhead.name, self.started.elapsed());
        self.bulkhead.publish_gauges();
    }
}

impl Guard for Bulkhead {
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
        let span = debug_span!("bulkhead", operation = %self.name);
        async move {
            let permit = self.admit(ctx).await?;
            let _active = ActiveCall::enter(self, permit);

            op(ctx.clone())
                .await
                .map_err(ResilienceError::from_operation)
        }
        .instrument(span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ContextError, ErrorCode};
    use crate::metrics::{names, noop, InMemoryMetrics};
    use std::time::Duration;
    use tokio::task::JoinHandle;

    fn bulkhead(max_concurrent: usize, max_waiting: usize) -> Arc<Bulkhead> {
        let config = BulkheadConfig::new()
            .with_max_concurrent(max_concurrent)
            .with_max_waiting(max_waiting);
        Arc::new(Bulkhead::new("database", config, noop()).unwrap())
    }

    /// Start a call that holds its slot until `gate` gets a permit
    fn blocked_call(bulkhead: &Arc<Bulkhead>, gate: &Arc<Semaphore>) -> JoinHandle<ResilienceResult<()>> {
        let bulkhead = bulkhead.clone();
        let gate = gate.clone();
        tokio::spawn(async move {
            let ctx = Context::background();
            bulkhead
                .run(&ctx, |_| {
                    let gate = gate.clone();
                    async move {
                        let _permit = gate.acquire().await?;
                        Ok::<_, BoxError>(())
                    }
                })
                .await
        })
    }

    async fn settle(bulkhead: &Bulkhead, active: usize, waiting: usize) {
        while bulkhead.active_count() != active || bulkhead.waiting_count() != waiting {
            tokio::task::yield_now().await;
        }
    }

    async fn explode() -> Result<(), BoxError> {
        panic!("note renderer crashed")
    }

    #[test]
    fn test_default_config() {
        let config = BulkheadConfig::default();
        assert_eq!(config.max_concurrent, 10);
        assert_eq!(config.max_waiting, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let err = Bulkhead::new("database", BulkheadConfig::new().with_max_concurrent(0), noop())
            .unwrap_err();
        assert!(err.to_string().contains("max_concurrent"));
    }

    #[test]
    fn test_from_limits_rejects_negative_values() {
        assert!(Bulkhead::from_limits("database", 0, 0, noop()).is_err());
        assert!(Bulkhead::from_limits("database", -1, 0, noop()).is_err());
        assert!(Bulkhead::from_limits("database", 2, -1, noop()).is_err());

        let bulkhead = Bulkhead::from_limits("database", 2, 0, noop()).unwrap();
        assert_eq!(bulkhead.max_concurrent(), 2);
        assert_eq!(bulkhead.max_waiting(), 0);
        assert_eq!(bulkhead.name(), "database");
    }

    #[test]
    fn test_negative_waiting_rejected_at_deserialization() {
        let result: Result<BulkheadConfig, _> =
            serde_json::from_str(r#"{"max_concurrent": 2, "max_waiting": -1}"#);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_runs_call_when_slot_free() {
        let bulkhead = bulkhead(1, 0);
        let ctx = Context::background();

        let value = bulkhead
            .run(&ctx, |_| async { Ok::<_, BoxError>(42) })
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(bulkhead.active_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_caller_takes_no_slot() {
        let bulkhead = bulkhead(1, 0);
        let ctx = Context::background();
        ctx.cancel();
        let calls = AtomicUsize::new(0);

        let err = bulkhead
            .run(&ctx, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, BoxError>(()) }
            })
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(bulkhead.active_count(), 0);
    }

    #[tokio::test]
    async fn test_capacity_and_queue_then_reject() {
        let (n, m) = (2, 3);
        let bulkhead = bulkhead(n, m);
        let gate = Arc::new(Semaphore::new(0));

        let calls: Vec<_> = (0..n + m).map(|_| blocked_call(&bulkhead, &gate)).collect();
        settle(&bulkhead, n, m).await;

        let ctx = Context::background();
        let err = bulkhead
            .run(&ctx, |_| async { Ok::<_, BoxError>(()) })
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::BulkheadFull);
        assert_eq!(bulkhead.active_count(), n);
        assert_eq!(bulkhead.waiting_count(), m);

        gate.add_permits(n + m);
        for call in calls {
            call.await.unwrap().unwrap();
        }
        assert_eq!(bulkhead.active_count(), 0);
        assert_eq!(bulkhead.waiting_count(), 0);
    }

    #[tokio::test]
    async fn test_no_queue_rejects_third_call() {
        let bulkhead = bulkhead(2, 0);
        let gate = Arc::new(Semaphore::new(0));

        let first = blocked_call(&bulkhead, &gate);
        let second = blocked_call(&bulkhead, &gate);
        settle(&bulkhead, 2, 0).await;

        let third = blocked_call(&bulkhead, &gate).await.unwrap();
        assert!(third.unwrap_err().is_bulkhead_full());

        gate.add_permits(2);
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_cancel_while_waiting_leaves_queue() {
        let bulkhead = bulkhead(1, 1);
        let gate = Arc::new(Semaphore::new(0));
        let holder = blocked_call(&bulkhead, &gate);
        settle(&bulkhead, 1, 0).await;

        let ctx = Context::background();
        let waiter = {
            let bulkhead = bulkhead.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move {
                bulkhead
                    .run(&ctx, |_| async { Ok::<_, BoxError>(()) })
                    .await
            })
        };
        settle(&bulkhead, 1, 1).await;

        ctx.cancel();
        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err, ResilienceError::Context(ContextError::Cancelled)));
        assert_eq!(bulkhead.waiting_count(), 0);

        gate.add_permits(1);
        holder.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiter_deadline() {
        let bulkhead = bulkhead(1, 1);
        let gate = Arc::new(Semaphore::new(0));
        let holder = blocked_call(&bulkhead, &gate);
        settle(&bulkhead, 1, 0).await;

        let ctx = Context::background().with_timeout(Duration::from_millis(100));
        let err = bulkhead
            .run(&ctx, |_| async { Ok::<_, BoxError>(()) })
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::DeadlineExceeded);
        assert_eq!(bulkhead.waiting_count(), 0);

        gate.add_permits(1);
        holder.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_dropped_waiter_leaves_queue() {
        let bulkhead = bulkhead(1, 1);
        let gate = Arc::new(Semaphore::new(0));
        let holder = blocked_call(&bulkhead, &gate);
        settle(&bulkhead, 1, 0).await;

        let ctx = Context::background();
        {
            let waiter = bulkhead.run(&ctx, |_| async { Ok::<_, BoxError>(()) });
            tokio::pin!(waiter);
            assert!(futures::poll!(waiter.as_mut()).is_pending());
            assert_eq!(bulkhead.waiting_count(), 1);
        }
        assert_eq!(bulkhead.waiting_count(), 0);

        gate.add_permits(1);
        holder.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_panic_releases_slot() {
        let bulkhead = bulkhead(1, 0);

        let crashed = {
            let bulkhead = bulkhead.clone();
            tokio::spawn(async move {
                let ctx = Context::background();
                bulkhead.run(&ctx, |_| explode()).await
            })
        }
        .await
        .unwrap_err();

        assert!(crashed.is_panic());
        assert_eq!(bulkhead.active_count(), 0);

        let ctx = Context::background();
        let value = bulkhead
            .run(&ctx, |_| async { Ok::<_, BoxError>("recovered") })
            .await
            .unwrap();
        assert_eq!(value, "recovered");
    }

    #[tokio::test]
    async fn test_metrics_reported() {
        let metrics = Arc::new(InMemoryMetrics::new());
        let bulkhead = Arc::new(
            Bulkhead::new(
                "database",
                BulkheadConfig::new().with_max_concurrent(1).with_max_waiting(1),
                metrics.clone(),
            )
            .unwrap(),
        );
        let gate = Arc::new(Semaphore::new(0));

        let holder = blocked_call(&bulkhead, &gate);
        settle(&bulkhead, 1, 0).await;
        let waiter = blocked_call(&bulkhead, &gate);
        settle(&bulkhead, 1, 1).await;
        assert_eq!(metrics.gauge(names::BULKHEAD_WAITING, "database"), Some(1));

        let ctx = Context::background();
        let _ = bulkhead
            .run(&ctx, |_| async { Ok::<_, BoxError>(()) })
            .await;
        assert_eq!(metrics.counter(names::BULKHEAD_REJECTED, "database"), 1);

        gate.add_permits(2);
        holder.await.unwrap().unwrap();
        waiter.await.unwrap().unwrap();

        let executions = metrics
            .histogram(names::BULKHEAD_EXECUTION_DURATION, "database")
            .unwrap();
        assert_eq!(executions.count, 2);
        assert_eq!(
            metrics
                .histogram(names::BULKHEAD_WAIT_DURATION, "database")
                .unwrap()
                .count,
            1
        );
        assert_eq!(metrics.gauge(names::BULKHEAD_ACTIVE, "database"), Some(0));
    }
}

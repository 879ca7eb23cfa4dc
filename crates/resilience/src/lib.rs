//! # Resilience Composition Engine
//!
//! Fault-tolerance middleware for outbound calls from the notes service
//! (database queries, third-party APIs).
//!
//! ## Features
//!
//! - **Bulkhead**: caps concurrent calls per operation, with a bounded wait queue
//! - **Circuit breaker**: stops calling a failing dependency and probes for recovery
//! - **Retry**: bounded re-execution with exponential backoff and jitter
//! - **Timeout**: a deadline for every individual attempt
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ResilienceWrapper                         │
//! │  execute(ctx, "database", op)                                │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ComponentFactory                          │
//! │  (one Bulkhead / CircuitBreaker / Retrier / Timeout per name)│
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//!      Bulkhead ─► CircuitBreaker ─► Retrier ─► Timeout ─► op
//! ```
//!
//! ## Example
//!
//! ```
//! use noteguard_resilience::prelude::*;
//!
//! # tokio_test::block_on(async {
//! let wrapper = ResilienceWrapper::new(presets::standard())?;
//! let ctx = Context::background();
//!
//! let result = wrapper
//!     .execute(&ctx, presets::DATABASE, |_ctx| async {
//!         Err::<(), _>("connection reset")
//!     })
//!     .await;
//!
//! let err = result.unwrap_err();
//! assert!(is_max_retries_exceeded(&err));
//! # Ok::<_, ConfigError>(())
//! # });
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod factory;
pub mod metrics;
pub mod presets;
pub mod reliability;
pub mod wrapper;

pub use config::{OperationPolicies, ResilienceConfig};
pub use context::Context;
pub use error::{
    is_bulkhead_full, is_circuit_open, is_max_retries_exceeded, is_timeout_exceeded, BoxError,
    CapacityExhausted, CircuitRejection, ConfigError, ContextError, ErrorCode, ResilienceError,
    ResilienceResult,
};
pub use factory::{ComponentFactory, OperationLayers};
pub use metrics::{InMemoryMetrics, MetricsSink, NoopMetrics};
pub use reliability::{
    Bulkhead, BulkheadConfig, CircuitBreaker, CircuitBreakerConfig, CircuitState, Counts, Guard,
    Layer, Passthrough, Retrier, RetryConfig, RetryPredicate, Timeout, TimeoutConfig,
};
pub use wrapper::{ResilienceSnapshot, ResilienceWrapper};

/// Prelude for common imports
pub mod prelude {
    pub use crate::config::{OperationPolicies, ResilienceConfig};
    pub use crate::context::Context;
    pub use crate::error::{
        is_bulkhead_full, is_circuit_open, is_max_retries_exceeded, is_timeout_exceeded,
        BoxError, ConfigError, ErrorCode, ResilienceError, ResilienceResult,
    };
    pub use crate::presets;
    pub use crate::reliability::{
        BulkheadConfig, CircuitBreakerConfig, CircuitState, Guard, RetryConfig, TimeoutConfig,
    };
    pub use crate::wrapper::ResilienceWrapper;
}

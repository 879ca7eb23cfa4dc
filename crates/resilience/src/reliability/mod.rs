//! Protective components
//!
//! This module provides:
//! - [`Bulkhead`] - Concurrency admission with a bounded wait queue
//! - [`CircuitBreaker`] - Ratio-based breaker with half-open probes
//! - [`Retrier`] - Bounded retry with exponential backoff and jitter
//! - [`Timeout`] - Per-attempt deadline
//!
//! All of them implement [`Guard`].

mod bulkhead;
mod circuit_breaker;
mod layer;
mod retry;
mod timeout;

pub use bulkhead::{Bulkhead, BulkheadConfig};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState, Counts};
pub use layer::{Guard, Layer, Passthrough};
pub use retry::{RetryConfig, RetryPredicate, Retrier};
pub use timeout::{Timeout, TimeoutConfig, DATABASE, EXTERNAL_API};

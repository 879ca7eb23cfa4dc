//! Stock policies for the two kinds of outbound call the service makes
//!
//! Database calls are short and frequent: tight timeouts, quick retries and a
//! wide bulkhead. External APIs are slow and flaky: long timeouts, a narrow
//! bulkhead and a breaker that trips earlier and cools down longer.

use std::time::Duration;

use crate::config::{OperationPolicies, ResilienceConfig};
use crate::reliability::{BulkheadConfig, CircuitBreakerConfig, RetryConfig, TimeoutConfig};

pub use crate::reliability::{DATABASE, EXTERNAL_API};

/// Policies for one operation
#[derive(Debug, Clone, PartialEq)]
pub struct Preset {
    pub circuit_breaker: CircuitBreakerConfig,
    pub bulkhead: BulkheadConfig,
    pub retry: RetryConfig,
    pub timeout: Duration,
}

/// Policies for database queries
pub fn database() -> Preset {
    Preset {
        circuit_breaker: CircuitBreakerConfig::new()
            .with_failure_ratio(0.5)
            .with_min_requests(10)
            .with_interval(Duration::from_secs(60))
            .with_cooldown(Duration::from_secs(15))
            .with_max_requests(3),
        bulkhead: BulkheadConfig::new()
            .with_max_concurrent(20)
            .with_max_waiting(50),
        retry: RetryConfig::exponential()
            .with_max_attempts(3)
            .with_initial_interval(Duration::from_millis(50))
            .with_max_interval(Duration::from_secs(1)),
        timeout: Duration::from_secs(5),
    }
}

/// Policies for third-party HTTP APIs
pub fn external_api() -> Preset {
    Preset {
        circuit_breaker: CircuitBreakerConfig::new()
            .with_failure_ratio(0.4)
            .with_min_requests(5)
            .with_interval(Duration::from_secs(60))
            .with_cooldown(Duration::from_secs(60))
            .with_max_requests(1),
        bulkhead: BulkheadConfig::new()
            .with_max_concurrent(10)
            .with_max_waiting(10),
        retry: RetryConfig::exponential()
            .with_max_attempts(4)
            .with_initial_interval(Duration::from_millis(200))
            .with_max_interval(Duration::from_secs(5)),
        timeout: Duration::from_secs(30),
    }
}

/// Policies for any other operation name
pub fn fallback() -> Preset {
    Preset {
        circuit_breaker: CircuitBreakerConfig::default(),
        bulkhead: BulkheadConfig::default(),
        retry: RetryConfig::default(),
        timeout: Duration::from_secs(10),
    }
}

/// Every layer configured, with dedicated policies for [`DATABASE`] and
/// [`EXTERNAL_API`] and [`fallback`] for everything else
pub fn standard() -> ResilienceConfig {
    let default = fallback();
    let database = database();
    let external_api = external_api();

    ResilienceConfig {
        circuit_breaker: Some(
            OperationPolicies::new(default.circuit_breaker)
                .with_operation(DATABASE, database.circuit_breaker)
                .with_operation(EXTERNAL_API, external_api.circuit_breaker),
        ),
        bulkhead: Some(
            OperationPolicies::new(default.bulkhead)
                .with_operation(DATABASE, database.bulkhead)
                .with_operation(EXTERNAL_API, external_api.bulkhead),
        ),
        retry: Some(
            OperationPolicies::new(default.retry)
                .with_operation(DATABASE, database.retry)
                .with_operation(EXTERNAL_API, external_api.retry),
        ),
        timeout: Some(
            TimeoutConfig::new()
                .with_default(default.timeout)
                .with_database(database.timeout)
                .with_external_api(external_api.timeout),
        ),
    }
}

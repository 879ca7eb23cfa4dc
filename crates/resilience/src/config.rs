//! Resilience configuration
//!
//! Plain serde structs handed in by the host's configuration loader. Durations
//! are written as integer milliseconds. A missing section leaves that layer
//! unconfigured, which makes it a passthrough for every operation.
//!
//! ```
//! use noteguard_resilience::ResilienceConfig;
//!
//! let config: ResilienceConfig = serde_json::from_str(r#"{
//!     "bulkhead": { "default": { "max_concurrent": 8, "max_waiting": 16 } },
//!     "timeout": { "default": 2000, "database": 500, "external_api": 5000 }
//! }"#).unwrap();
//!
//! assert!(config.circuit_breaker.is_none());
//! assert!(config.validate().is_ok());
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::reliability::{BulkheadConfig, CircuitBreakerConfig, RetryConfig, TimeoutConfig};

/// A default policy plus per-operation overrides
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationPolicies<C> {
    /// Policy for operations without an override
    pub default: C,

    /// Overrides keyed by operation name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub operations: BTreeMap<String, C>,
}

impl<C: Default> Default for OperationPolicies<C> {
    fn default() -> Self {
        Self::new(C::default())
    }
}

impl<C> OperationPolicies<C> {
    pub fn new(default: C) -> Self {
        Self {
            default,
            operations: BTreeMap::new(),
        }
    }

    /// Override the policy for one operation
    pub fn with_operation(mut self, name: impl Into<String>, policy: C) -> Self {
        self.operations.insert(name.into(), policy);
        self
    }

    /// Policy that applies to `operation`
    pub fn policy_for(&self, operation: &str) -> &C {
        self.operations.get(operation).unwrap_or(&self.default)
    }

    /// The default policy followed by every override
    pub fn policies(&self) -> impl Iterator<Item = &C> {
        std::iter::once(&self.default).chain(self.operations.values())
    }
}

impl<C> From<C> for OperationPolicies<C> {
    fn from(default: C) -> Self {
        Self::new(default)
    }
}

/// Configuration for every layer of the resilience stack
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResilienceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circuit_breaker: Option<OperationPolicies<CircuitBreakerConfig>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bulkhead: Option<OperationPolicies<BulkheadConfig>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<OperationPolicies<RetryConfig>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<TimeoutConfig>,
}

impl ResilienceConfig {
    /// Configuration with every layer unconfigured
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_circuit_breaker(
        mut self,
        policies: impl Into<OperationPolicies<CircuitBreakerConfig>>,
    ) -> Self {
        self.circuit_breaker = Some(policies.into());
        self
    }

    pub fn with_bulkhead(mut self, policies: impl Into<OperationPolicies<BulkheadConfig>>) -> Self {
        self.bulkhead = Some(policies.into());
        self
    }

    pub fn with_retry(mut self, policies: impl Into<OperationPolicies<RetryConfig>>) -> Self {
        self.retry = Some(policies.into());
        self
    }

    pub fn with_timeout(mut self, timeout: TimeoutConfig) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Whether no layer is configured at all
    pub fn is_empty(&self) -> bool {
        self.circuit_breaker.is_none()
            && self.bulkhead.is_none()
            && self.retry.is_none()
            && self.timeout.is_none()
    }

    /// Validate every configured policy
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(breakers) = &self.circuit_breaker {
            breakers.policies().try_for_each(CircuitBreakerConfig::validate)?;
        }
        if let Some(bulkheads) = &self.bulkhead {
            bulkheads.policies().try_for_each(BulkheadConfig::validate)?;
        }
        if let Some(retries) = &self.retry {
            retries.policies().try_for_each(RetryConfig::validate)?;
        }
        if let Some(timeout) = &self.timeout {
            timeout.validate()?;
        }
        Ok(())
    }
}

/// Serde support for Duration as milliseconds
pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Serde support for a name -> Duration map with millisecond values
pub(crate) mod duration_millis_map {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::collections::BTreeMap;
    use std::time::Duration;

    pub fn serialize<S>(map: &BTreeMap<String, Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_map(map.iter().map(|(name, duration)| {
            (name, u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
        }))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<String, Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = BTreeMap::<String, u64>::deserialize(deserializer)?;
        Ok(raw
            .into_iter()
            .map(|(name, millis)| (name, Duration::from_millis(millis)))
            .collect())
    }
}

//! Error taxonomy for the resilience layers
//!
//! Fast-reject signals ([`ResilienceError::CircuitOpen`],
//! [`ResilienceError::BulkheadFull`]) mean "do not attempt the call right now".
//! [`ResilienceError::TimeoutExceeded`] covers a single attempt and is itself
//! retryable. [`ResilienceError::MaxRetriesExceeded`] is terminal and wraps the
//! last failure. Every variant exposes its cause through
//! [`std::error::Error::source`] and maps to a stable [`ErrorCode`].

use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Boxed error returned by wrapped operations
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Result type for resilience operations
pub type ResilienceResult<T> = Result<T, ResilienceError>;

/// Why an execution context stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    /// The context was explicitly cancelled
    #[error("context cancelled")]
    Cancelled,

    /// The context deadline passed
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Cause attached to a circuit breaker rejection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CircuitRejection {
    /// Breaker is open and the cooldown has not elapsed
    #[error("circuit breaker is open")]
    OpenState,

    /// Breaker is half-open and all probe slots are taken
    #[error("too many requests while half-open")]
    TooManyRequests,
}

/// Cause attached to a bulkhead rejection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("all {max_concurrent} slots busy and wait queue of {max_waiting} full")]
pub struct CapacityExhausted {
    pub max_concurrent: usize,
    pub max_waiting: usize,
}

/// Stable, machine-readable error codes
///
/// HTTP error mappers match on these rather than on messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    CircuitOpen,
    BulkheadFull,
    TimeoutExceeded,
    MaxRetriesExceeded,
    Cancelled,
    DeadlineExceeded,
    OperationFailed,
}

impl ErrorCode {
    /// The code as it appears on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CircuitOpen => "CIRCUIT_OPEN",
            Self::BulkheadFull => "BULKHEAD_FULL",
            Self::TimeoutExceeded => "TIMEOUT_EXCEEDED",
            Self::MaxRetriesExceeded => "MAX_RETRIES_EXCEEDED",
            Self::Cancelled => "CANCELLED",
            Self::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Self::OperationFailed => "OPERATION_FAILED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by the resilience layers
#[derive(Debug, Error)]
pub enum ResilienceError {
    /// The circuit breaker refused the call
    #[error("circuit breaker '{operation}' rejected the call")]
    CircuitOpen {
        operation: String,
        #[source]
        cause: CircuitRejection,
    },

    /// No bulkhead slot and no room in the wait queue
    #[error("bulkhead '{operation}' is full")]
    BulkheadFull {
        operation: String,
        #[source]
        cause: CapacityExhausted,
    },

    /// A single attempt ran past its deadline
    #[error("operation '{operation}' exceeded its {timeout:?} timeout")]
    TimeoutExceeded {
        operation: String,
        timeout: Duration,
        #[source]
        cause: ContextError,
    },

    /// Every attempt failed
    #[error("operation '{operation}' failed after {attempts} attempts")]
    MaxRetriesExceeded {
        operation: String,
        attempts: u32,
        #[source]
        last_error: Box<ResilienceError>,
    },

    /// The caller's context was cancelled or its deadline passed
    #[error(transparent)]
    Context(#[from] ContextError),

    /// The wrapped operation returned its own error
    #[error("operation failed: {0}")]
    Operation(#[source] BoxError),
}

impl ResilienceError {
    /// Convert an operation error, unwrapping resilience errors that were boxed
    /// by nested wrappers so their kind survives.
    pub fn from_operation(err: impl Into<BoxError>) -> Self {
        let err: BoxError = err.into();
        match err.downcast::<ResilienceError>() {
            Ok(inner) => *inner,
            Err(err) => match err.downcast::<ContextError>() {
                Ok(ctx) => Self::Context(*ctx),
                Err(err) => Self::Operation(err),
            },
        }
    }

    /// Stable code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::CircuitOpen { .. } => ErrorCode::CircuitOpen,
            Self::BulkheadFull { .. } => ErrorCode::BulkheadFull,
            Self::TimeoutExceeded { .. } => ErrorCode::TimeoutExceeded,
            Self::MaxRetriesExceeded { .. } => ErrorCode::MaxRetriesExceeded,
            Self::Context(ContextError::Cancelled) => ErrorCode::Cancelled,
            Self::Context(ContextError::DeadlineExceeded) => ErrorCode::DeadlineExceeded,
            Self::Operation(_) => ErrorCode::OperationFailed,
        }
    }

    /// Whether this is a fast-reject signal (breaker or bulkhead)
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. } | Self::BulkheadFull { .. })
    }

    pub fn is_circuit_open(&self) -> bool {
        is_circuit_open(self)
    }

    pub fn is_bulkhead_full(&self) -> bool {
        is_bulkhead_full(self)
    }

    pub fn is_timeout_exceeded(&self) -> bool {
        is_timeout_exceeded(self)
    }

    pub fn is_max_retries_exceeded(&self) -> bool {
        is_max_retries_exceeded(self)
    }

    /// The caller's original error, looking through retry exhaustion
    pub fn operation_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        match self {
            Self::Operation(err) => Some(err.as_ref()),
            Self::MaxRetriesExceeded { last_error, .. } => last_error.operation_error(),
            _ => None,
        }
    }
}

/// Every [`ResilienceError`] in the `source()` chain of `err`, outermost first
///
/// `MaxRetriesExceeded` exposes its last error as a `Box<ResilienceError>`,
/// whose own `source()` skips the boxed error, so boxes are unwrapped here.
fn resilience_chain<'a>(
    err: &'a (dyn StdError + 'static),
) -> impl Iterator<Item = &'a ResilienceError> + 'a {
    std::iter::successors(Some(err), |&e| e.source()).filter_map(|e| {
        e.downcast_ref::<ResilienceError>().or_else(|| {
            e.downcast_ref::<Box<ResilienceError>>()
                .map(|boxed| boxed.as_ref())
        })
    })
}

/// Whether a circuit breaker rejection appears anywhere in the error chain
pub fn is_circuit_open(err: &(dyn StdError + 'static)) -> bool {
    resilience_chain(err).any(|e| matches!(e, ResilienceError::CircuitOpen { .. }))
}

/// Whether a bulkhead rejection appears anywhere in the error chain
pub fn is_bulkhead_full(err: &(dyn StdError + 'static)) -> bool {
    resilience_chain(err).any(|e| matches!(e, ResilienceError::BulkheadFull { .. }))
}

/// Whether an attempt timeout appears anywhere in the error chain
pub fn is_timeout_exceeded(err: &(dyn StdError + 'static)) -> bool {
    resilience_chain(err).any(|e| matches!(e, ResilienceError::TimeoutExceeded { .. }))
}

/// Whether retry exhaustion appears anywhere in the error chain
pub fn is_max_retries_exceeded(err: &(dyn StdError + 'static)) -> bool {
    resilience_chain(err).any(|e| matches!(e, ResilienceError::MaxRetriesExceeded { .. }))
}

/// Construction-time misconfiguration
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A component was configured with values it cannot honour
    #[error("invalid {component} configuration: {reason}")]
    InvalidConfig {
        component: &'static str,
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(component: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            component,
            reason: reason.into(),
        }
    }
}

//! Execution context threaded through every resilience layer
//!
//! A [`Context`] carries a cancellation signal and an optional deadline.
//! Clones share the same cancellation state; derived contexts
//! ([`Context::child`], [`Context::with_timeout`]) are cancelled together
//! with their parent but can also be cancelled on their own.
//!
//! Deadlines use [`tokio::time::Instant`] so they follow a paused test clock.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::ContextError;

/// Cancellable, deadline-bearing execution context
///
/// # Example
///
/// ```
/// use noteguard_resilience::Context;
/// use std::time::Duration;
///
/// let root = Context::background();
/// let request = root.with_timeout(Duration::from_secs(2));
///
/// assert!(request.deadline().is_some());
/// assert!(request.err().is_none());
///
/// root.cancel();
/// assert!(request.is_done());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// Root context with no deadline that is only cancelled explicitly
    pub fn background() -> Self {
        Self::default()
    }

    /// Derive a context that can be cancelled independently of this one
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Derive a context whose deadline is at most `timeout` from now
    ///
    /// A timeout too long to represent as an instant adds no deadline.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self.child(),
        }
    }

    /// Derive a context with the given deadline
    ///
    /// An earlier deadline inherited from this context always wins.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(existing) if existing <= deadline => existing,
            _ => deadline,
        };

        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// Cancel this context, every clone of it and every context derived from it
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// The deadline, if one was set
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left until the deadline (zero once it has passed)
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Whether the context was explicitly cancelled
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Whether the context is cancelled or past its deadline
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Why the context is done, or `None` while it is still live
    pub fn err(&self) -> Option<ContextError> {
        if self.token.is_cancelled() {
            return Some(ContextError::Cancelled);
        }

        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Wait until the context is cancelled or its deadline passes
    pub async fn done(&self) -> ContextError {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => ContextError::Cancelled,
                    _ = tokio::time::sleep_until(deadline) => ContextError::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                ContextError::Cancelled
            }
        }
    }

    /// The underlying token, for handing to spawned work
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }
}

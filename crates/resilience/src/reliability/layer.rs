//! Uniform layer interface
//!
//! Every protective component implements [`Guard`]. Unconfigured layers are
//! represented by [`Passthrough`], selected once when an operation's stack is
//! assembled, so the composition code never branches on whether a layer
//! exists.

use std::future::Future;
use std::sync::Arc;

use crate::context::Context;
use crate::error::{BoxError, ResilienceError, ResilienceResult};

/// A layer that runs an operation under some protection
///
/// `op` receives the context it should observe (a layer may derive a child
/// context, e.g. with a tighter deadline). Layers that re-invoke `op`
/// (the retrier) call it once per attempt; every other layer calls it at most
/// once.
pub trait Guard: Send + Sync {
    fn run<'a, F, Fut, T, E>(
        &'a self,
        ctx: &'a Context,
        op: F,
    ) -> impl Future<Output = ResilienceResult<T>> + Send + 'a
    where
        F: Fn(Context) -> Fut + Send + Sync + 'a,
        Fut: Future<Output = Result<T, E>> + Send + 'a,
        T: Send + 'a,
        E: Into<BoxError> + Send + 'a;
}

/// Null-object layer: calls straight through to the operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Passthrough;

impl Guard for Passthrough {
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
        let ctx = ctx.clone();
        async move { op(ctx).await.map_err(ResilienceError::from_operation) }
    }
}

/// A configured component or a passthrough in its place
pub enum Layer<G> {
    Active(Arc<G>),
    Passthrough(Passthrough),
}

impl<G> Layer<G> {
    pub fn active(component: Arc<G>) -> Self {
        Self::Active(component)
    }

    pub fn passthrough() -> Self {
        Self::Passthrough(Passthrough)
    }

    /// The underlying component, if this layer is configured
    pub fn component(&self) -> Option<&Arc<G>> {
        match self {
            Self::Active(component) => Some(component),
            Self::Passthrough(_) => None,
        }
    }

    pub fn is_passthrough(&self) -> bool {
        matches!(self, Self::Passthrough(_))
    }
}

impl<G> From<Option<Arc<G>>> for Layer<G> {
    fn from(component: Option<Arc<G>>) -> Self {
        match component {
            Some(component) => Self::Active(component),
            None => Self::passthrough(),
        }
    }
}

impl<G> Clone for Layer<G> {
    fn clone(&self) -> Self {
        match self {
            Self::Active(component) => Self::Active(Arc::clone(component)),
            Self::Passthrough(p) => Self::Passthrough(*p),
        }
    }
}

impl<G: Guard> Guard for Layer<G> {
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
        async move {
            match self {
                Self::Active(component) => component.run(ctx, op).await,
                Self::Passthrough(p) => p.run(ctx, op).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::reliability::Timeout;
    use std::time::Duration;

    #[tokio::test]
    async fn test_passthrough_returns_value() {
        let ctx = Context::background();
        let result = Passthrough
            .run(&ctx, |_| async { Ok::<_, BoxError>(7) })
            .await
            .unwrap();
        assert_eq!(result, 7);
    }

    #[tokio::test]
    async fn test_passthrough_wraps_operation_error() {
        let ctx = Context::background();
        let err = Passthrough
            .run(&ctx, |_| async { Err::<(), _>("note not found") })
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::OperationFailed);
        assert_eq!(err.operation_error().unwrap().to_string(), "note not found");
    }

    #[tokio::test]
    async fn test_layer_from_option() {
        let none: Layer<Timeout> = None.into();
        assert!(none.is_passthrough());
        assert!(none.component().is_none());

        let some: Layer<Timeout> =
            Some(Arc::new(Timeout::new("database", Duration::from_secs(1)))).into();
        assert!(!some.is_passthrough());
        assert_eq!(some.component().unwrap().duration(), Duration::from_secs(1));

        let ctx = Context::background();
        let value = some
            .run(&ctx, |_| async { Ok::<_, BoxError>("ok") })
            .await
            .unwrap();
        assert_eq!(value, "ok");
    }
}

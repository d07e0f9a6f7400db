//! Tower layer that turns any cloneable service into a retrying one.
//!
//! Each call replays a clone of the request through [`RetryPolicy::execute`]; readiness is
//! awaited per attempt, so a readiness failure counts as a failed attempt. Wrap plain async
//! functions with `tower::service_fn`.
//!
//! ```rust
//! use pulse_retry::{RetryLayer, RetryPolicy};
//! use std::time::Duration;
//! use tower::{service_fn, ServiceBuilder, ServiceExt};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let policy = RetryPolicy::<std::io::Error>::builder()
//!     .base_delay(Duration::from_millis(1))
//!     .jitter_max(Duration::ZERO)
//!     .build()
//!     .unwrap();
//! let verses = ServiceBuilder::new()
//!     .layer(RetryLayer::new(policy))
//!     .service(service_fn(|surah: u16| async move {
//!         Ok::<_, std::io::Error>(format!("surah {surah}"))
//!     }));
//! assert_eq!(verses.oneshot(1).await.unwrap(), "surah 1");
//! # });
//! ```

use crate::error::RetryError;
use crate::retry::RetryPolicy;
use futures::future::BoxFuture;
use futures::TryFutureExt;
use std::task::{Context, Poll};
use tower::ServiceExt;
use tower_layer::Layer;
use tower_service::Service;

/// Tower-native retry layer.
pub struct RetryLayer<E> {
    policy: RetryPolicy<E>,
}

impl<E> RetryLayer<E> {
    pub fn new(policy: RetryPolicy<E>) -> Self {
        Self { policy }
    }
}

impl<E> Clone for RetryLayer<E> {
    fn clone(&self) -> Self {
        Self { policy: self.policy.clone() }
    }
}

impl<S, E> Layer<S> for RetryLayer<E> {
    type Service = RetryService<S, E>;

    fn layer(&self, service: S) -> Self::Service {
        RetryService { inner: service, policy: self.policy.clone() }
    }
}

/// Retry service produced by `RetryLayer`.
pub struct RetryService<S, E> {
    inner: S,
    policy: RetryPolicy<E>,
}

impl<S: Clone, E> Clone for RetryService<S, E> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone(), policy: self.policy.clone() }
    }
}

impl<S, E, Request> Service<Request> for RetryService<S, E>
where
    Request: Clone + Send + 'static,
    S: Service<Request> + Clone + Send + 'static,
    S::Response: Send + 'static,
    S::Error: Into<E>,
    S::Future: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    type Response = S::Response;
    type Error = RetryError<E>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let policy = self.policy.clone();
        let inner = self.inner.clone();
        Box::pin(async move {
            let attempt = move || inner.clone().oneshot(req.clone()).map_err(Into::into);
            policy.execute(attempt).await
        })
    }
}

//! Load-shedding middleware.
//!
//! Rejects operations with `OperationError::Overloaded` while
//! `max_concurrent_operations` are already in flight. Shed operations are
//! counted by the metrics layer under `outcome="overloaded"`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::Semaphore;
use tower::{Layer, Service};

use crate::service::operation::{Operation, OperationError, OperationResponse};

// ---------------------------------------------------------------------------
// LoadShedLayer
// ---------------------------------------------------------------------------

/// Tower layer that limits concurrent operations via a semaphore.
///
/// Operations arriving with no permit left fail immediately instead of
/// queueing. All services built from one layer share its permits.
#[derive(Debug, Clone)]
pub struct LoadShedLayer {
    semaphore: Arc<Semaphore>,
}

impl LoadShedLayer {
    #[must_use]
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
        }
    }
}

impl<S> Layer<S> for LoadShedLayer {
    type Service = LoadShedService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LoadShedService {
            inner,
            semaphore: Arc::clone(&self.semaphore),
        }
    }
}

// ---------------------------------------------------------------------------
// LoadShedService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LoadShedService<S> {
    inner: S,
    semaphore: Arc<Semaphore>,
}

impl<S> Service<Operation> for LoadShedService<S>
where
    S: Service<Operation, Response = OperationResponse, Error = OperationError> + Send,
    S::Future: Send + 'static,
{
    type Response = OperationResponse;
    type Error = OperationError;
    type Future = Pin<Box<dyn Future<Output = Result<OperationResponse, OperationError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, op: Operation) -> Self::Future {
        match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => {
                let fut = self.inner.call(op);
                Box::pin(async move {
                    let _permit = permit;
                    fut.await
                })
            }
            Err(_) => Box::pin(std::future::ready(Err(OperationError::Overloaded))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tower::ServiceExt;

    use super::*;
    use crate::service::middleware::testing::{exists_op, Delay};

    #[tokio::test]
    async fn allows_operations_under_limit() {
        let svc = LoadShedLayer::new(10).layer(Delay { delay_ms: 1 });
        let resp = svc.oneshot(exists_op(5000)).await.unwrap();
        assert!(matches!(resp, OperationResponse::Empty));
    }

    #[tokio::test]
    async fn rejects_when_overloaded() {
        let mut svc = LoadShedLayer::new(1).layer(Delay { delay_ms: 500 });

        ServiceExt::ready(&mut svc).await.unwrap();
        let in_flight = svc.call(exists_op(5000));
        let in_flight = tokio::spawn(in_flight);
        tokio::time::sleep(Duration::from_millis(10)).await;

        let err = svc.call(exists_op(5000)).await.unwrap_err();
        assert!(matches!(err, OperationError::Overloaded));

        // The permit comes back once the first call finishes.
        in_flight.await.unwrap().unwrap();
        assert!(svc.call(exists_op(5000)).await.is_ok());
    }
}

//! Operation routing: dispatches `Operation` to domain services by service name.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tower::util::BoxCloneSyncService;
use tower::{Service, ServiceExt};

use super::operation::{Operation, OperationError, OperationResponse};

type BoxedService = BoxCloneSyncService<Operation, OperationResponse, OperationError>;

/// Routes `Operation` values to the domain service registered for
/// [`Operation::service_name`].
///
/// Cloning the router clones the handles of its services, so every clone
/// dispatches into the same shared storage.
#[derive(Clone, Default)]
pub struct OperationRouter {
    services: HashMap<&'static str, BoxedService>,
}

impl OperationRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the service handling `name`, replacing any previous one.
    pub fn register<S>(&mut self, name: &'static str, service: S)
    where
        S: Service<Operation, Response = OperationResponse, Error = OperationError>
            + Clone
            + Send
            + Sync
            + 'static,
        S::Future: Send + 'static,
    {
        self.services.insert(name, BoxCloneSyncService::new(service));
    }

    #[must_use]
    pub fn handles(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }
}

impl Service<Operation> for OperationRouter {
    type Response = OperationResponse;
    type Error = OperationError;
    type Future = Pin<Box<dyn Future<Output = Result<OperationResponse, OperationError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, op: Operation) -> Self::Future {
        let service_name = op.service_name();
        match self.services.get(service_name) {
            // Each call drives its own clone to readiness, so one busy
            // domain never stalls the others.
            Some(svc) => Box::pin(svc.clone().oneshot(op)),
            None => Box::pin(async move {
                Err(OperationError::UnknownService {
                    name: service_name.to_string(),
                })
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::operation::{service_names, OperationContext};

    /// Answers every operation with `Exists(true)`.
    #[derive(Clone)]
    struct Yes;

    impl Service<Operation> for Yes {
        type Response = OperationResponse;
        type Error = OperationError;
        type Future = Pin<Box<dyn Future<Output = Result<OperationResponse, OperationError>> + Send>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _op: Operation) -> Self::Future {
            Box::pin(async { Ok(OperationResponse::Exists(true)) })
        }
    }

    fn exists_op() -> Operation {
        Operation::QueueExists {
            ctx: OperationContext::new(1, "p", 5000),
            queue: "q".into(),
        }
    }

    #[tokio::test]
    async fn routes_to_registered_service() {
        let mut router = OperationRouter::new();
        router.register(service_names::QUEUES, Yes);
        assert!(router.handles(service_names::QUEUES));

        let resp = router.oneshot(exists_op()).await.unwrap();
        assert!(matches!(resp, OperationResponse::Exists(true)));
    }

    #[tokio::test]
    async fn unknown_service_returns_error() {
        let mut router = OperationRouter::new();
        router.register(service_names::CLAIMS, Yes);

        let err = router.oneshot(exists_op()).await.unwrap_err();
        assert!(matches!(
            err,
            OperationError::UnknownService { name } if name == "queues"
        ));
    }

    #[tokio::test]
    async fn clones_share_services() {
        let mut router = OperationRouter::new();
        router.register(service_names::QUEUES, Yes);
        let clone = router.clone();

        assert!(router.oneshot(exists_op()).await.is_ok());
        assert!(clone.oneshot(exists_op()).await.is_ok());
    }
}

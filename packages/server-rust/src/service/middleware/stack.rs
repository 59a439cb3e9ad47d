//! Composes the middleware layers over the operation router.

use tower::ServiceBuilder;

use super::load_shed::{LoadShedLayer, LoadShedService};
use super::metrics::{MetricsLayer, MetricsService};
use super::timeout::{TimeoutLayer, TimeoutService};
use crate::service::config::ServerConfig;
use crate::service::router::OperationRouter;

/// The full operation service. Cheap to clone; clones share the load-shed
/// permits and every domain service.
pub type ServiceStack = MetricsService<LoadShedService<TimeoutService<OperationRouter>>>;

/// Wraps `router` with, outermost first:
///
/// 1. `MetricsLayer`, timing and labelling every outcome, rejections included
/// 2. `LoadShedLayer`, rejecting work beyond `max_concurrent_operations`
/// 3. `TimeoutLayer`, enforcing each operation's `call_timeout_ms`
#[must_use]
pub fn build_service_stack(router: OperationRouter, config: &ServerConfig) -> ServiceStack {
    ServiceBuilder::new()
        .layer(MetricsLayer)
        .layer(LoadShedLayer::new(config.max_concurrent_operations))
        .layer(TimeoutLayer)
        .service(router)
}

#[cfg(test)]
mod tests {
    use tower::ServiceExt;

    use super::*;
    use crate::service::middleware::testing::{exists_op, Delay};
    use crate::service::operation::{service_names, OperationError, OperationResponse};

    #[tokio::test]
    async fn routes_through_all_layers() {
        let mut router = OperationRouter::new();
        router.register(service_names::QUEUES, Delay { delay_ms: 0 });

        let svc = build_service_stack(router, &ServerConfig::default());
        let resp = svc.oneshot(exists_op(5000)).await.unwrap();
        assert!(matches!(resp, OperationResponse::Empty));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_applies_inside_the_stack() {
        let mut router = OperationRouter::new();
        router.register(service_names::QUEUES, Delay { delay_ms: 1000 });

        let svc = build_service_stack(router, &ServerConfig::default());
        let err = svc.oneshot(exists_op(10)).await.unwrap_err();
        assert!(matches!(err, OperationError::Timeout { timeout_ms: 10 }));
    }
}

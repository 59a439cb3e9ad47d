//! Domain services: one `tower::Service<Operation>` per operation family.
//!
//! Queue, message and claim services call the storage pipeline; the pool
//! service calls the pool registry, which only exists in pooled
//! deployments.

mod claims;
mod messages;
mod pools;
mod queues;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tower::Service;

use crate::pooling::PoolController;
use crate::service::operation::{Operation, OperationError, OperationResponse};
use crate::storage::DataDriver;

type BoxedFuture = Pin<Box<dyn Future<Output = Result<OperationResponse, OperationError>> + Send>>;

/// Defines a cloneable domain service holding one shared handle, whose
/// `call` forwards the operation to `$handler`.
macro_rules! domain_service {
    (
        $(#[$meta:meta])*
        $name:ident { $field:ident : $ty:ty }, $handler:path
    ) => {
        $(#[$meta])*
        #[derive(Clone)]
        pub struct $name {
            $field: $ty,
        }

        impl $name {
            #[must_use]
            pub fn new($field: $ty) -> Self {
                Self { $field }
            }
        }

        impl Service<Operation> for $name {
            type Response = OperationResponse;
            type Error = OperationError;
            type Future = BoxedFuture;

            fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
                Poll::Ready(Ok(()))
            }

            fn call(&mut self, op: Operation) -> Self::Future {
                let $field = self.$field.clone();
                Box::pin(async move { $handler(&$field, op).await })
            }
        }
    };
}

domain_service!(
    /// Queue lifecycle, metadata, listing and stats.
    QueueService { driver: Arc<dyn DataDriver> }, queues::handle
);

domain_service!(
    /// Message posting, listing, reads and deletes.
    MessageService { driver: Arc<dyn DataDriver> }, messages::handle
);

domain_service!(
    /// The claim lease protocol.
    ClaimService { driver: Arc<dyn DataDriver> }, claims::handle
);

domain_service!(
    /// Pool registry management. `None` when pooling is disabled.
    PoolService { pools: Option<PoolController> }, pools::handle
);

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tower::ServiceExt;
    use wharf_core::{Metadata, NewClaim, NewMessage, PoolRecord, StorageError};

    use super::*;
    use crate::service::operation::OperationContext;
    use crate::storage::{DriverContext, MemoryDriver};

    fn ctx() -> OperationContext {
        OperationContext::new(1, "480924", 5000)
    }

    fn driver() -> Arc<dyn DataDriver> {
        Arc::new(MemoryDriver::new(DriverContext::default()))
    }

    #[tokio::test]
    async fn queue_message_claim_round() {
        let driver = driver();
        let queues = QueueService::new(Arc::clone(&driver));
        let messages = MessageService::new(Arc::clone(&driver));
        let claims = ClaimService::new(driver);

        let resp = queues
            .clone()
            .oneshot(Operation::CreateQueue {
                ctx: ctx(),
                queue: "fizbit".into(),
                metadata: Metadata::new(),
            })
            .await
            .unwrap();
        assert!(matches!(resp, OperationResponse::Created(true)));

        let resp = messages
            .clone()
            .oneshot(Operation::PostMessages {
                ctx: ctx(),
                queue: "fizbit".into(),
                messages: vec![NewMessage { body: json!(1), ttl: 60 }],
            })
            .await
            .unwrap();
        let OperationResponse::Posted(ids) = resp else {
            panic!("expected posted ids, got {resp:?}");
        };
        assert_eq!(ids.len(), 1);

        let resp = claims
            .clone()
            .oneshot(Operation::CreateClaim {
                ctx: ctx(),
                queue: "fizbit".into(),
                claim: NewClaim { ttl: 60, grace: 60, limit: None },
            })
            .await
            .unwrap();
        let OperationResponse::Claimed(batch) = resp else {
            panic!("expected a claim batch, got {resp:?}");
        };
        assert_eq!(batch.messages[0].id, ids[0]);

        let err = messages
            .oneshot(Operation::DeleteMessage {
                ctx: ctx(),
                queue: "fizbit".into(),
                message_id: ids[0].clone(),
                claim_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OperationError::Storage(StorageError::MessageIsClaimed { .. })
        ));

        let resp = queues
            .oneshot(Operation::QueueStats {
                ctx: ctx(),
                queue: "fizbit".into(),
            })
            .await
            .unwrap();
        let OperationResponse::Stats(stats) = resp else {
            panic!("expected stats, got {resp:?}");
        };
        assert_eq!(stats.claimed, 1);
    }

    #[tokio::test]
    async fn misrouted_operation_is_rejected() {
        let err = ClaimService::new(driver())
            .oneshot(Operation::QueueExists {
                ctx: ctx(),
                queue: "fizbit".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OperationError::WrongService {
                operation: "queue.exists"
            }
        ));
    }

    #[tokio::test]
    async fn pool_operations_need_pooling() {
        let err = PoolService::new(None)
            .oneshot(Operation::CreatePool {
                ctx: ctx(),
                pool: PoolRecord::new("p1", "memory://p1", 1),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::PoolingDisabled));
    }
}

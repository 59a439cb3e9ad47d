use std::sync::Arc;

use crate::service::operation::{Operation, OperationError, OperationResponse};
use crate::storage::DataDriver;

pub(super) async fn handle(
    driver: &Arc<dyn DataDriver>,
    op: Operation,
) -> Result<OperationResponse, OperationError> {
    let queues = driver.queues();
    let response = match op {
        Operation::CreateQueue { ctx, queue, metadata } => {
            OperationResponse::Created(queues.create(&ctx.queue(&queue), metadata).await?)
        }
        Operation::GetQueueMetadata { ctx, queue } => {
            OperationResponse::Metadata(queues.get_metadata(&ctx.queue(&queue)).await?)
        }
        Operation::SetQueueMetadata { ctx, queue, metadata } => {
            queues.set_metadata(&ctx.queue(&queue), metadata).await?;
            OperationResponse::Empty
        }
        Operation::QueueExists { ctx, queue } => {
            OperationResponse::Exists(queues.exists(&ctx.queue(&queue)).await?)
        }
        Operation::DeleteQueue { ctx, queue } => {
            queues.delete(&ctx.queue(&queue)).await?;
            OperationResponse::Empty
        }
        Operation::ListQueues {
            ctx,
            marker,
            limit,
            detailed,
        } => OperationResponse::Queues(
            queues
                .list(&ctx.project_id, marker.as_deref(), limit, detailed)
                .await?,
        ),
        Operation::QueueStats { ctx, queue } => {
            OperationResponse::Stats(queues.stats(&ctx.queue(&queue)).await?)
        }
        other => {
            return Err(OperationError::WrongService {
                operation: other.name(),
            })
        }
    };
    Ok(response)
}

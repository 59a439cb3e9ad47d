use std::sync::Arc;

use crate::service::operation::{Operation, OperationError, OperationResponse};
use crate::storage::DataDriver;

pub(super) async fn handle(
    driver: &Arc<dyn DataDriver>,
    op: Operation,
) -> Result<OperationResponse, OperationError> {
    let messages = driver.messages();
    let response = match op {
        Operation::PostMessages {
            ctx,
            queue,
            messages: batch,
        } => OperationResponse::Posted(messages.post(&ctx.queue(&queue), batch).await?),
        Operation::ListMessages { ctx, queue, options } => {
            OperationResponse::Page(messages.list(&ctx.queue(&queue), &options).await?)
        }
        Operation::GetMessage {
            ctx,
            queue,
            message_id,
        } => OperationResponse::Message(Box::new(
            messages.get(&ctx.queue(&queue), &message_id).await?,
        )),
        Operation::BulkGetMessages {
            ctx,
            queue,
            message_ids,
        } => OperationResponse::Messages(messages.bulk_get(&ctx.queue(&queue), &message_ids).await?),
        Operation::DeleteMessage {
            ctx,
            queue,
            message_id,
            claim_id,
        } => {
            messages
                .delete(&ctx.queue(&queue), &message_id, claim_id.as_deref())
                .await?;
            OperationResponse::Empty
        }
        Operation::BulkDeleteMessages {
            ctx,
            queue,
            message_ids,
        } => {
            messages.bulk_delete(&ctx.queue(&queue), &message_ids).await?;
            OperationResponse::Empty
        }
        other => {
            return Err(OperationError::WrongService {
                operation: other.name(),
            })
        }
    };
    Ok(response)
}

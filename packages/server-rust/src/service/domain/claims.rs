use std::sync::Arc;

use crate::service::operation::{Operation, OperationError, OperationResponse};
use crate::storage::DataDriver;

pub(super) async fn handle(
    driver: &Arc<dyn DataDriver>,
    op: Operation,
) -> Result<OperationResponse, OperationError> {
    let claims = driver.claims();
    let response = match op {
        Operation::CreateClaim { ctx, queue, claim } => {
            OperationResponse::Claimed(claims.create(&ctx.queue(&queue), claim).await?)
        }
        Operation::GetClaim {
            ctx,
            queue,
            claim_id,
        } => OperationResponse::Claim(Box::new(claims.get(&ctx.queue(&queue), &claim_id).await?)),
        Operation::UpdateClaim {
            ctx,
            queue,
            claim_id,
            ttl,
            grace,
        } => {
            claims
                .update(&ctx.queue(&queue), &claim_id, ttl, grace)
                .await?;
            OperationResponse::Empty
        }
        Operation::DeleteClaim {
            ctx,
            queue,
            claim_id,
        } => {
            claims.delete(&ctx.queue(&queue), &claim_id).await?;
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

use crate::pooling::PoolController;
use crate::service::operation::{Operation, OperationError, OperationResponse};

pub(super) async fn handle(
    pools: &Option<PoolController>,
    op: Operation,
) -> Result<OperationResponse, OperationError> {
    let Some(pools) = pools else {
        return Err(OperationError::PoolingDisabled);
    };
    let response = match op {
        Operation::CreatePool { pool, .. } => {
            pools.create(pool).await?;
            OperationResponse::Empty
        }
        Operation::GetPool { name, detailed, .. } => {
            OperationResponse::Pool(Box::new(pools.get(&name, detailed).await?))
        }
        Operation::UpdatePool { name, update, .. } => {
            OperationResponse::Pool(Box::new(pools.update(&name, update).await?))
        }
        Operation::DeletePool { name, .. } => {
            pools.delete(&name).await?;
            OperationResponse::Empty
        }
        Operation::ListPools {
            marker,
            limit,
            detailed,
            ..
        } => OperationResponse::Pools(pools.list(marker.as_deref(), limit, detailed).await?),
        other => {
            return Err(OperationError::WrongService {
                operation: other.name(),
            })
        }
    };
    Ok(response)
}

//! Stage that traces every operation at debug level and declines.

use async_trait::async_trait;
use tracing::debug;
use wharf_core::{
    ClaimBatch, ClaimDetails, ListOptions, Message, MessagePage, Metadata, NewClaim, NewMessage,
    QueueId, QueueStats, QueueSummary, StorageResult,
};

use crate::storage::pipeline::{ClaimStage, MessageStage, QueueStage, Stage};

#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingStage;

impl LoggingStage {
    pub const NAME: &'static str = "logging";
}

impl Stage for LoggingStage {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn queues(&self) -> Option<&dyn QueueStage> {
        Some(self)
    }

    fn messages(&self) -> Option<&dyn MessageStage> {
        Some(self)
    }

    fn claims(&self) -> Option<&dyn ClaimStage> {
        Some(self)
    }
}

#[async_trait]
impl QueueStage for LoggingStage {
    async fn create(&self, queue: &QueueId, metadata: &Metadata) -> Option<StorageResult<bool>> {
        debug!(queue = %queue, keys = metadata.len(), "queue.create");
        None
    }

    async fn get_metadata(&self, queue: &QueueId) -> Option<StorageResult<Metadata>> {
        debug!(queue = %queue, "queue.get_metadata");
        None
    }

    async fn set_metadata(&self, queue: &QueueId, _metadata: &Metadata) -> Option<StorageResult<()>> {
        debug!(queue = %queue, "queue.set_metadata");
        None
    }

    async fn exists(&self, queue: &QueueId) -> Option<StorageResult<bool>> {
        debug!(queue = %queue, "queue.exists");
        None
    }

    async fn delete(&self, queue: &QueueId) -> Option<StorageResult<()>> {
        debug!(queue = %queue, "queue.delete");
        None
    }

    async fn list(
        &self,
        project: &str,
        marker: Option<&str>,
        limit: usize,
        detailed: bool,
    ) -> Option<StorageResult<Vec<QueueSummary>>> {
        debug!(project, marker, limit, detailed, "queue.list");
        None
    }

    async fn stats(&self, queue: &QueueId) -> Option<StorageResult<QueueStats>> {
        debug!(queue = %queue, "queue.stats");
        None
    }
}

#[async_trait]
impl MessageStage for LoggingStage {
    async fn post(&self, queue: &QueueId, messages: &[NewMessage]) -> Option<StorageResult<Vec<String>>> {
        debug!(queue = %queue, count = messages.len(), "message.post");
        None
    }

    async fn list(&self, queue: &QueueId, options: &ListOptions) -> Option<StorageResult<MessagePage>> {
        debug!(
            queue = %queue,
            marker = options.marker.as_deref(),
            limit = options.limit,
            include_claimed = options.include_claimed,
            "message.list"
        );
        None
    }

    async fn get(&self, queue: &QueueId, message_id: &str) -> Option<StorageResult<Message>> {
        debug!(queue = %queue, message = message_id, "message.get");
        None
    }

    async fn bulk_get(&self, queue: &QueueId, message_ids: &[String]) -> Option<StorageResult<Vec<Message>>> {
        debug!(queue = %queue, count = message_ids.len(), "message.bulk_get");
        None
    }

    async fn delete(
        &self,
        queue: &QueueId,
        message_id: &str,
        claim_id: Option<&str>,
    ) -> Option<StorageResult<()>> {
        debug!(queue = %queue, message = message_id, claim = claim_id, "message.delete");
        None
    }

    async fn bulk_delete(&self, queue: &QueueId, message_ids: &[String]) -> Option<StorageResult<()>> {
        debug!(queue = %queue, count = message_ids.len(), "message.bulk_delete");
        None
    }
}

#[async_trait]
impl ClaimStage for LoggingStage {
    async fn create(&self, queue: &QueueId, claim: NewClaim) -> Option<StorageResult<ClaimBatch>> {
        debug!(queue = %queue, ttl = claim.ttl, grace = claim.grace, limit = claim.limit, "claim.create");
        None
    }

    async fn get(&self, queue: &QueueId, claim_id: &str) -> Option<StorageResult<ClaimDetails>> {
        debug!(queue = %queue, claim = claim_id, "claim.get");
        None
    }

    async fn update(
        &self,
        queue: &QueueId,
        claim_id: &str,
        ttl: u32,
        grace: Option<u32>,
    ) -> Option<StorageResult<()>> {
        debug!(queue = %queue, claim = claim_id, ttl, grace, "claim.update");
        None
    }

    async fn delete(&self, queue: &QueueId, claim_id: &str) -> Option<StorageResult<()>> {
        debug!(queue = %queue, claim = claim_id, "claim.delete");
        None
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::storage::driver::DataDriver;
    use crate::storage::engines::MemoryDriver;
    use crate::storage::factory::DriverContext;
    use crate::storage::pipeline::Pipeline;

    #[tokio::test]
    async fn logging_stage_never_changes_results() {
        let pipeline = Pipeline::new(
            vec![Arc::new(LoggingStage) as Arc<dyn Stage>],
            Arc::new(MemoryDriver::new(DriverContext::default())),
        );
        let queue = QueueId::new("p", "q");

        assert!(pipeline.queues().create(&queue, Metadata::new()).await.unwrap());
        assert!(!pipeline.queues().create(&queue, Metadata::new()).await.unwrap());
        let err = pipeline.claims().get(&queue, "missing").await.unwrap_err();
        assert_eq!(err.kind(), wharf_core::ErrorKind::DoesNotExist);
    }
}

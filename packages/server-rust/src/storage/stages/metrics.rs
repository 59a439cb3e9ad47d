//! Stage that counts operations with the `metrics` crate and declines.
//!
//! Emits `wharf_storage_operations_total{operation}`. With no recorder
//! installed the macros are no-ops.

use async_trait::async_trait;
use wharf_core::{
    ClaimBatch, ClaimDetails, ListOptions, Message, MessagePage, Metadata, NewClaim, NewMessage,
    QueueId, QueueStats, QueueSummary, StorageResult,
};

use crate::storage::pipeline::{ClaimStage, MessageStage, QueueStage, Stage};

fn count(operation: &'static str) {
    metrics::counter!("wharf_storage_operations_total", "operation" => operation).increment(1);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsStage;

impl MetricsStage {
    pub const NAME: &'static str = "metrics";
}

impl Stage for MetricsStage {
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
impl QueueStage for MetricsStage {
    async fn create(&self, _queue: &QueueId, _metadata: &Metadata) -> Option<StorageResult<bool>> {
        count("queue.create");
        None
    }

    async fn get_metadata(&self, _queue: &QueueId) -> Option<StorageResult<Metadata>> {
        count("queue.get_metadata");
        None
    }

    async fn set_metadata(&self, _queue: &QueueId, _metadata: &Metadata) -> Option<StorageResult<()>> {
        count("queue.set_metadata");
        None
    }

    async fn exists(&self, _queue: &QueueId) -> Option<StorageResult<bool>> {
        count("queue.exists");
        None
    }

    async fn delete(&self, _queue: &QueueId) -> Option<StorageResult<()>> {
        count("queue.delete");
        None
    }

    async fn list(
        &self,
        _project: &str,
        _marker: Option<&str>,
        _limit: usize,
        _detailed: bool,
    ) -> Option<StorageResult<Vec<QueueSummary>>> {
        count("queue.list");
        None
    }

    async fn stats(&self, _queue: &QueueId) -> Option<StorageResult<QueueStats>> {
        count("queue.stats");
        None
    }
}

#[async_trait]
impl MessageStage for MetricsStage {
    async fn post(&self, _queue: &QueueId, messages: &[NewMessage]) -> Option<StorageResult<Vec<String>>> {
        count("message.post");
        metrics::counter!("wharf_messages_posted_total").increment(messages.len() as u64);
        None
    }

    async fn list(&self, _queue: &QueueId, _options: &ListOptions) -> Option<StorageResult<MessagePage>> {
        count("message.list");
        None
    }

    async fn get(&self, _queue: &QueueId, _message_id: &str) -> Option<StorageResult<Message>> {
        count("message.get");
        None
    }

    async fn bulk_get(&self, _queue: &QueueId, _message_ids: &[String]) -> Option<StorageResult<Vec<Message>>> {
        count("message.bulk_get");
        None
    }

    async fn delete(
        &self,
        _queue: &QueueId,
        _message_id: &str,
        _claim_id: Option<&str>,
    ) -> Option<StorageResult<()>> {
        count("message.delete");
        None
    }

    async fn bulk_delete(&self, _queue: &QueueId, _message_ids: &[String]) -> Option<StorageResult<()>> {
        count("message.bulk_delete");
        None
    }
}

#[async_trait]
impl ClaimStage for MetricsStage {
    async fn create(&self, _queue: &QueueId, _claim: NewClaim) -> Option<StorageResult<ClaimBatch>> {
        count("claim.create");
        None
    }

    async fn get(&self, _queue: &QueueId, _claim_id: &str) -> Option<StorageResult<ClaimDetails>> {
        count("claim.get");
        None
    }

    async fn update(
        &self,
        _queue: &QueueId,
        _claim_id: &str,
        _ttl: u32,
        _grace: Option<u32>,
    ) -> Option<StorageResult<()>> {
        count("claim.update");
        None
    }

    async fn delete(&self, _queue: &QueueId, _claim_id: &str) -> Option<StorageResult<()>> {
        count("claim.delete");
        None
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::storage::driver::DataDriver;
    use crate::storage::engines::MemoryDriver;
    use crate::storage::factory::DriverContext;
    use crate::storage::pipeline::Pipeline;

    #[tokio::test]
    async fn metrics_stage_declines_every_operation() {
        let pipeline = Pipeline::new(
            vec![Arc::new(MetricsStage) as Arc<dyn Stage>],
            Arc::new(MemoryDriver::new(DriverContext::default())),
        );
        let queue = QueueId::new("p", "q");
        pipeline.queues().create(&queue, Metadata::new()).await.unwrap();
        pipeline
            .messages()
            .post(&queue, vec![NewMessage { body: json!(1), ttl: 60 }])
            .await
            .unwrap();

        let batch = pipeline
            .claims()
            .create(&queue, NewClaim { ttl: 60, grace: 60, limit: None })
            .await
            .unwrap();
        assert_eq!(batch.messages.len(), 1);
        assert_eq!(pipeline.queues().stats(&queue).await.unwrap().claimed, 1);
    }
}

//! Ordered chain of stages in front of a terminal driver.
//!
//! For every operation the stages run in registration order. A stage may
//! decline (return `None`), short-circuit with a result, or perform a side
//! effect and decline. When every stage declines, the terminal driver
//! handles the call. [`Pipeline`] implements [`DataDriver`] itself, so
//! pipelines nest.

use std::sync::Arc;

use async_trait::async_trait;
use wharf_core::{
    ClaimBatch, ClaimDetails, ListOptions, Message, MessagePage, Metadata, NewClaim, NewMessage,
    QueueId, QueueStats, QueueSummary, StorageResult,
};

use crate::storage::driver::{ClaimController, DataDriver, MessageController, QueueController};

// ---------------------------------------------------------------------------
// Stage contracts
// ---------------------------------------------------------------------------

/// Queue operations a stage may intercept. Every method declines by default.
#[async_trait]
pub trait QueueStage: Send + Sync {
    async fn create(&self, _queue: &QueueId, _metadata: &Metadata) -> Option<StorageResult<bool>> {
        None
    }

    async fn get_metadata(&self, _queue: &QueueId) -> Option<StorageResult<Metadata>> {
        None
    }

    async fn set_metadata(
        &self,
        _queue: &QueueId,
        _metadata: &Metadata,
    ) -> Option<StorageResult<()>> {
        None
    }

    async fn exists(&self, _queue: &QueueId) -> Option<StorageResult<bool>> {
        None
    }

    async fn delete(&self, _queue: &QueueId) -> Option<StorageResult<()>> {
        None
    }

    async fn list(
        &self,
        _project: &str,
        _marker: Option<&str>,
        _limit: usize,
        _detailed: bool,
    ) -> Option<StorageResult<Vec<QueueSummary>>> {
        None
    }

    async fn stats(&self, _queue: &QueueId) -> Option<StorageResult<QueueStats>> {
        None
    }
}

/// Message operations a stage may intercept. Every method declines by default.
#[async_trait]
pub trait MessageStage: Send + Sync {
    async fn post(
        &self,
        _queue: &QueueId,
        _messages: &[NewMessage],
    ) -> Option<StorageResult<Vec<String>>> {
        None
    }

    async fn list(
        &self,
        _queue: &QueueId,
        _options: &ListOptions,
    ) -> Option<StorageResult<MessagePage>> {
        None
    }

    async fn get(&self, _queue: &QueueId, _message_id: &str) -> Option<StorageResult<Message>> {
        None
    }

    async fn bulk_get(
        &self,
        _queue: &QueueId,
        _message_ids: &[String],
    ) -> Option<StorageResult<Vec<Message>>> {
        None
    }

    async fn delete(
        &self,
        _queue: &QueueId,
        _message_id: &str,
        _claim_id: Option<&str>,
    ) -> Option<StorageResult<()>> {
        None
    }

    async fn bulk_delete(
        &self,
        _queue: &QueueId,
        _message_ids: &[String],
    ) -> Option<StorageResult<()>> {
        None
    }
}

/// Claim operations a stage may intercept. Every method declines by default.
#[async_trait]
pub trait ClaimStage: Send + Sync {
    async fn create(&self, _queue: &QueueId, _claim: NewClaim) -> Option<StorageResult<ClaimBatch>> {
        None
    }

    async fn get(&self, _queue: &QueueId, _claim_id: &str) -> Option<StorageResult<ClaimDetails>> {
        None
    }

    async fn update(
        &self,
        _queue: &QueueId,
        _claim_id: &str,
        _ttl: u32,
        _grace: Option<u32>,
    ) -> Option<StorageResult<()>> {
        None
    }

    async fn delete(&self, _queue: &QueueId, _claim_id: &str) -> Option<StorageResult<()>> {
        None
    }
}

/// A named member of a pipeline.
///
/// A stage exposes the subset of contracts it cares about; the others are
/// skipped for it.
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;

    fn queues(&self) -> Option<&dyn QueueStage> {
        None
    }

    fn messages(&self) -> Option<&dyn MessageStage> {
        None
    }

    fn claims(&self) -> Option<&dyn ClaimStage> {
        None
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

struct Chain {
    stages: Vec<Arc<dyn Stage>>,
    terminal: Arc<dyn DataDriver>,
}

/// Runs each stage that exposes `$facet` in order, returning the first
/// short-circuit result, then falls through to the terminal driver.
/// Stage arguments come before `=>`, terminal arguments after it.
macro_rules! dispatch {
    ($chain:expr, $facet:ident . $method:ident ( $($stage_arg:expr),* ) => ( $($arg:expr),* )) => {{
        for stage in &$chain.stages {
            if let Some(facet) = stage.$facet() {
                if let Some(result) = facet.$method($($stage_arg),*).await {
                    tracing::trace!(
                        stage = stage.name(),
                        operation = concat!(stringify!($facet), ".", stringify!($method)),
                        "stage short-circuited"
                    );
                    return result;
                }
            }
        }
        $chain.terminal.$facet().$method($($arg),*).await
    }};
}

/// A driver composed of stages over a terminal driver.
pub struct Pipeline {
    queues: PipelineQueues,
    messages: PipelineMessages,
    claims: PipelineClaims,
    chain: Arc<Chain>,
}

impl Pipeline {
    #[must_use]
    pub fn new(stages: Vec<Arc<dyn Stage>>, terminal: Arc<dyn DataDriver>) -> Self {
        let chain = Arc::new(Chain { stages, terminal });
        Self {
            queues: PipelineQueues(Arc::clone(&chain)),
            messages: PipelineMessages(Arc::clone(&chain)),
            claims: PipelineClaims(Arc::clone(&chain)),
            chain,
        }
    }

    /// Names of the stages, in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.chain.stages.iter().map(|stage| stage.name()).collect()
    }
}

#[async_trait]
impl DataDriver for Pipeline {
    fn queues(&self) -> &dyn QueueController {
        &self.queues
    }

    fn messages(&self) -> &dyn MessageController {
        &self.messages
    }

    fn claims(&self) -> &dyn ClaimController {
        &self.claims
    }

    async fn is_alive(&self) -> bool {
        self.chain.terminal.is_alive().await
    }
}

struct PipelineQueues(Arc<Chain>);

#[async_trait]
impl QueueController for PipelineQueues {
    async fn create(&self, queue: &QueueId, metadata: Metadata) -> StorageResult<bool> {
        dispatch!(self.0, queues.create(queue, &metadata) => (queue, metadata))
    }

    async fn get_metadata(&self, queue: &QueueId) -> StorageResult<Metadata> {
        dispatch!(self.0, queues.get_metadata(queue) => (queue))
    }

    async fn set_metadata(&self, queue: &QueueId, metadata: Metadata) -> StorageResult<()> {
        dispatch!(self.0, queues.set_metadata(queue, &metadata) => (queue, metadata))
    }

    async fn exists(&self, queue: &QueueId) -> StorageResult<bool> {
        dispatch!(self.0, queues.exists(queue) => (queue))
    }

    async fn delete(&self, queue: &QueueId) -> StorageResult<()> {
        dispatch!(self.0, queues.delete(queue) => (queue))
    }

    async fn list(
        &self,
        project: &str,
        marker: Option<&str>,
        limit: usize,
        detailed: bool,
    ) -> StorageResult<Vec<QueueSummary>> {
        dispatch!(self.0, queues.list(project, marker, limit, detailed) => (project, marker, limit, detailed))
    }

    async fn stats(&self, queue: &QueueId) -> StorageResult<QueueStats> {
        dispatch!(self.0, queues.stats(queue) => (queue))
    }
}

struct PipelineMessages(Arc<Chain>);

#[async_trait]
impl MessageController for PipelineMessages {
    async fn post(&self, queue: &QueueId, messages: Vec<NewMessage>) -> StorageResult<Vec<String>> {
        dispatch!(self.0, messages.post(queue, &messages) => (queue, messages))
    }

    async fn list(&self, queue: &QueueId, options: &ListOptions) -> StorageResult<MessagePage> {
        dispatch!(self.0, messages.list(queue, options) => (queue, options))
    }

    async fn get(&self, queue: &QueueId, message_id: &str) -> StorageResult<Message> {
        dispatch!(self.0, messages.get(queue, message_id) => (queue, message_id))
    }

    async fn bulk_get(&self, queue: &QueueId, message_ids: &[String]) -> StorageResult<Vec<Message>> {
        dispatch!(self.0, messages.bulk_get(queue, message_ids) => (queue, message_ids))
    }

    async fn delete(
        &self,
        queue: &QueueId,
        message_id: &str,
        claim_id: Option<&str>,
    ) -> StorageResult<()> {
        dispatch!(self.0, messages.delete(queue, message_id, claim_id) => (queue, message_id, claim_id))
    }

    async fn bulk_delete(&self, queue: &QueueId, message_ids: &[String]) -> StorageResult<()> {
        dispatch!(self.0, messages.bulk_delete(queue, message_ids) => (queue, message_ids))
    }
}

struct PipelineClaims(Arc<Chain>);

#[async_trait]
impl ClaimController for PipelineClaims {
    async fn create(&self, queue: &QueueId, claim: NewClaim) -> StorageResult<ClaimBatch> {
        dispatch!(self.0, claims.create(queue, claim) => (queue, claim))
    }

    async fn get(&self, queue: &QueueId, claim_id: &str) -> StorageResult<ClaimDetails> {
        dispatch!(self.0, claims.get(queue, claim_id) => (queue, claim_id))
    }

    async fn update(
        &self,
        queue: &QueueId,
        claim_id: &str,
        ttl: u32,
        grace: Option<u32>,
    ) -> StorageResult<()> {
        dispatch!(self.0, claims.update(queue, claim_id, ttl, grace) => (queue, claim_id, ttl, grace))
    }

    async fn delete(&self, queue: &QueueId, claim_id: &str) -> StorageResult<()> {
        dispatch!(self.0, claims.delete(queue, claim_id) => (queue, claim_id))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;
    use serde_json::json;
    use wharf_core::StorageError;

    use super::*;
    use crate::storage::engines::MemoryDriver;
    use crate::storage::factory::DriverContext;

    /// Records the order it saw claim creates in, then declines.
    struct Recorder {
        name: String,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl ClaimStage for Recorder {
        async fn create(&self, _queue: &QueueId, _claim: NewClaim) -> Option<StorageResult<ClaimBatch>> {
            self.log.lock().push(self.name.clone());
            None
        }
    }

    impl Stage for Recorder {
        fn name(&self) -> &str {
            &self.name
        }

        fn claims(&self) -> Option<&dyn ClaimStage> {
            Some(self)
        }
    }

    /// Rejects posts to queues named `frozen`.
    struct Freezer {
        rejected: AtomicUsize,
    }

    #[async_trait]
    impl MessageStage for Freezer {
        async fn post(
            &self,
            queue: &QueueId,
            _messages: &[NewMessage],
        ) -> Option<StorageResult<Vec<String>>> {
            (queue.name == "frozen").then(|| {
                self.rejected.fetch_add(1, Ordering::SeqCst);
                Err(StorageError::bad_request("queue is frozen"))
            })
        }
    }

    impl Stage for Freezer {
        fn name(&self) -> &str {
            "freezer"
        }

        fn messages(&self) -> Option<&dyn MessageStage> {
            Some(self)
        }
    }

    fn terminal() -> Arc<dyn DataDriver> {
        Arc::new(MemoryDriver::new(DriverContext::default()))
    }

    fn one_message() -> Vec<NewMessage> {
        vec![NewMessage {
            body: json!("hi"),
            ttl: 60,
        }]
    }

    #[tokio::test]
    async fn empty_pipeline_forwards_to_terminal() {
        let pipeline = Pipeline::new(Vec::new(), terminal());
        let queue = QueueId::new("p", "q");

        assert!(pipeline.queues().create(&queue, Metadata::new()).await.unwrap());
        let ids = pipeline.messages().post(&queue, one_message()).await.unwrap();
        assert_eq!(ids.len(), 1);
        assert!(pipeline.is_alive().await);
    }

    #[tokio::test]
    async fn stages_run_in_order_before_terminal() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let stages: Vec<Arc<dyn Stage>> = ["first", "second"]
            .into_iter()
            .map(|name| {
                Arc::new(Recorder {
                    name: name.to_string(),
                    log: Arc::clone(&log),
                }) as Arc<dyn Stage>
            })
            .collect();
        let pipeline = Pipeline::new(stages, terminal());
        assert_eq!(pipeline.stage_names(), ["first", "second"]);

        let queue = QueueId::new("p", "q");
        pipeline.queues().create(&queue, Metadata::new()).await.unwrap();
        pipeline.messages().post(&queue, one_message()).await.unwrap();

        let claim = NewClaim {
            ttl: 60,
            grace: 60,
            limit: None,
        };
        let batch = pipeline.claims().create(&queue, claim).await.unwrap();
        assert_eq!(batch.messages.len(), 1);
        assert_eq!(*log.lock(), ["first", "second"]);
    }

    #[tokio::test]
    async fn short_circuit_skips_terminal() {
        let freezer = Arc::new(Freezer {
            rejected: AtomicUsize::new(0),
        });
        let pipeline = Pipeline::new(vec![freezer.clone() as Arc<dyn Stage>], terminal());

        let frozen = QueueId::new("p", "frozen");
        pipeline.queues().create(&frozen, Metadata::new()).await.unwrap();
        let err = pipeline.messages().post(&frozen, one_message()).await.unwrap_err();
        assert_eq!(err.kind(), wharf_core::ErrorKind::BadRequest);
        assert_eq!(freezer.rejected.load(Ordering::SeqCst), 1);

        let page = pipeline
            .messages()
            .list(&frozen, &ListOptions::default())
            .await
            .unwrap();
        assert!(page.messages.is_empty());

        // Stages that don't expose a facet never see its operations.
        pipeline.claims().delete(&frozen, "nope").await.unwrap();
    }

    #[tokio::test]
    async fn pipelines_nest() {
        let freezer: Arc<dyn Stage> = Arc::new(Freezer {
            rejected: AtomicUsize::new(0),
        });
        let inner: Arc<dyn DataDriver> = Arc::new(Pipeline::new(vec![freezer], terminal()));
        let outer = Pipeline::new(Vec::new(), inner);

        let frozen = QueueId::new("p", "frozen");
        outer.queues().create(&frozen, Metadata::new()).await.unwrap();
        assert!(outer.messages().post(&frozen, one_message()).await.is_err());
    }
}

//! [`DataDriver`] that routes each queue to the pool it was assigned.
//!
//! Queue creation is the only operation that may assign a pool. Everything
//! else goes through [`Catalog::lookup`]: an unrouted queue does not exist,
//! except for deletes, which succeed silently.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;
use wharf_core::{
    flavor_of, validation, ClaimBatch, ClaimDetails, ErrorKind, ListOptions, Message, MessagePage,
    Metadata, NewClaim, NewMessage, QueueId, QueueStats, QueueSummary, StorageError, StorageResult,
};

use super::catalog::Catalog;
use crate::storage::{ClaimController, DataDriver, MessageController, QueueController};

async fn route(catalog: &Catalog, queue: &QueueId) -> StorageResult<Arc<dyn DataDriver>> {
    catalog
        .lookup(queue)
        .await?
        .ok_or_else(|| StorageError::QueueDoesNotExist(queue.clone()))
}

/// Terminal driver for pooled deployments.
pub struct PooledDriver {
    queues: PooledQueues,
    messages: PooledMessages,
    claims: PooledClaims,
    catalog: Arc<Catalog>,
}

impl PooledDriver {
    #[must_use]
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            queues: PooledQueues(Arc::clone(&catalog)),
            messages: PooledMessages(Arc::clone(&catalog)),
            claims: PooledClaims(Arc::clone(&catalog)),
            catalog,
        }
    }
}

#[async_trait]
impl DataDriver for PooledDriver {
    fn queues(&self) -> &dyn QueueController {
        &self.queues
    }

    fn messages(&self) -> &dyn MessageController {
        &self.messages
    }

    fn claims(&self) -> &dyn ClaimController {
        &self.claims
    }

    /// Alive while the control store answers.
    async fn is_alive(&self) -> bool {
        self.catalog.control().list_pools(None, 1).await.is_ok()
    }
}

// ---------------------------------------------------------------------------
// Queues
// ---------------------------------------------------------------------------

struct PooledQueues(Arc<Catalog>);

#[async_trait]
impl QueueController for PooledQueues {
    async fn create(&self, queue: &QueueId, metadata: Metadata) -> StorageResult<bool> {
        validation::name("queue", &queue.name)?;

        let flavor = flavor_of(&metadata).map(str::to_string);
        let route = self.0.resolve(queue, flavor.as_deref()).await?;
        match route.driver.queues().create(queue, metadata).await {
            Ok(created) => Ok(created),
            Err(err) => {
                if route.assigned {
                    if let Err(forget_err) = self.0.forget(queue).await {
                        warn!(queue = %queue, error = %forget_err, "failed to release assignment after create error");
                    }
                }
                Err(err)
            }
        }
    }

    async fn get_metadata(&self, queue: &QueueId) -> StorageResult<Metadata> {
        route(&self.0, queue).await?.queues().get_metadata(queue).await
    }

    async fn set_metadata(&self, queue: &QueueId, metadata: Metadata) -> StorageResult<()> {
        route(&self.0, queue)
            .await?
            .queues()
            .set_metadata(queue, metadata)
            .await
    }

    async fn exists(&self, queue: &QueueId) -> StorageResult<bool> {
        match self.0.lookup(queue).await? {
            Some(driver) => driver.queues().exists(queue).await,
            None => Ok(false),
        }
    }

    async fn delete(&self, queue: &QueueId) -> StorageResult<()> {
        if let Some(driver) = self.0.lookup(queue).await? {
            driver.queues().delete(queue).await?;
        }
        self.0.forget(queue).await
    }

    async fn list(
        &self,
        project: &str,
        marker: Option<&str>,
        limit: usize,
        detailed: bool,
    ) -> StorageResult<Vec<QueueSummary>> {
        let entries = self.0.entries(project, marker, limit).await?;
        let mut summaries = Vec::with_capacity(entries.len());
        for entry in entries {
            let metadata = if detailed {
                let driver = self.0.driver(&entry.pool).await?;
                match driver.queues().get_metadata(&entry.queue).await {
                    Ok(metadata) => Some(metadata),
                    // Routed but not (yet) created in its pool.
                    Err(err) if err.kind() == ErrorKind::DoesNotExist => continue,
                    Err(err) => return Err(err),
                }
            } else {
                None
            };
            summaries.push(QueueSummary {
                name: entry.queue.name,
                metadata,
            });
        }
        Ok(summaries)
    }

    async fn stats(&self, queue: &QueueId) -> StorageResult<QueueStats> {
        route(&self.0, queue).await?.queues().stats(queue).await
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

struct PooledMessages(Arc<Catalog>);

#[async_trait]
impl MessageController for PooledMessages {
    async fn post(&self, queue: &QueueId, messages: Vec<NewMessage>) -> StorageResult<Vec<String>> {
        route(&self.0, queue)
            .await?
            .messages()
            .post(queue, messages)
            .await
    }

    async fn list(&self, queue: &QueueId, options: &ListOptions) -> StorageResult<MessagePage> {
        route(&self.0, queue)
            .await?
            .messages()
            .list(queue, options)
            .await
    }

    async fn get(&self, queue: &QueueId, message_id: &str) -> StorageResult<Message> {
        route(&self.0, queue)
            .await?
            .messages()
            .get(queue, message_id)
            .await
    }

    async fn bulk_get(&self, queue: &QueueId, message_ids: &[String]) -> StorageResult<Vec<Message>> {
        route(&self.0, queue)
            .await?
            .messages()
            .bulk_get(queue, message_ids)
            .await
    }

    async fn delete(
        &self,
        queue: &QueueId,
        message_id: &str,
        claim_id: Option<&str>,
    ) -> StorageResult<()> {
        match self.0.lookup(queue).await? {
            Some(driver) => driver.messages().delete(queue, message_id, claim_id).await,
            None => Ok(()),
        }
    }

    async fn bulk_delete(&self, queue: &QueueId, message_ids: &[String]) -> StorageResult<()> {
        match self.0.lookup(queue).await? {
            Some(driver) => driver.messages().bulk_delete(queue, message_ids).await,
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Claims
// ---------------------------------------------------------------------------

struct PooledClaims(Arc<Catalog>);

#[async_trait]
impl ClaimController for PooledClaims {
    async fn create(&self, queue: &QueueId, claim: NewClaim) -> StorageResult<ClaimBatch> {
        route(&self.0, queue).await?.claims().create(queue, claim).await
    }

    async fn get(&self, queue: &QueueId, claim_id: &str) -> StorageResult<ClaimDetails> {
        route(&self.0, queue).await?.claims().get(queue, claim_id).await
    }

    async fn update(
        &self,
        queue: &QueueId,
        claim_id: &str,
        ttl: u32,
        grace: Option<u32>,
    ) -> StorageResult<()> {
        route(&self.0, queue)
            .await?
            .claims()
            .update(queue, claim_id, ttl, grace)
            .await
    }

    async fn delete(&self, queue: &QueueId, claim_id: &str) -> StorageResult<()> {
        match self.0.lookup(queue).await? {
            Some(driver) => driver.claims().delete(queue, claim_id).await,
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

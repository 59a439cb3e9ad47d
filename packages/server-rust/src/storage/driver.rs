//! Operation contracts shared by every backend, the pooled router and the pipeline.
//!
//! A [`DataDriver`] bundles the three controllers a transport talks to:
//! [`QueueController`], [`MessageController`] and [`ClaimController`].
//! Backends, the pooled driver and pipelines all implement the same
//! contracts, so any of them can sit behind another.

use async_trait::async_trait;
use wharf_core::{
    ClaimBatch, ClaimDetails, ListOptions, Message, MessagePage, Metadata, NewClaim, NewMessage,
    QueueId, QueueStats, QueueSummary, StorageResult,
};

/// Queue lifecycle and metadata.
#[async_trait]
pub trait QueueController: Send + Sync {
    /// Creates a queue. Returns `false` if it already existed, in which case
    /// its metadata is left untouched.
    async fn create(&self, queue: &QueueId, metadata: Metadata) -> StorageResult<bool>;

    async fn get_metadata(&self, queue: &QueueId) -> StorageResult<Metadata>;

    async fn set_metadata(&self, queue: &QueueId, metadata: Metadata) -> StorageResult<()>;

    async fn exists(&self, queue: &QueueId) -> StorageResult<bool>;

    /// Deletes a queue with all of its messages and claims. Deleting an
    /// absent queue succeeds.
    async fn delete(&self, queue: &QueueId) -> StorageResult<()>;

    /// Lists a project's queues ordered by name, starting after `marker`.
    async fn list(
        &self,
        project: &str,
        marker: Option<&str>,
        limit: usize,
        detailed: bool,
    ) -> StorageResult<Vec<QueueSummary>>;

    async fn stats(&self, queue: &QueueId) -> StorageResult<QueueStats>;
}

/// Message posting, listing and deletion.
#[async_trait]
pub trait MessageController: Send + Sync {
    /// Appends messages in order and returns their ids.
    async fn post(&self, queue: &QueueId, messages: Vec<NewMessage>) -> StorageResult<Vec<String>>;

    /// Lists live messages in post order.
    async fn list(&self, queue: &QueueId, options: &ListOptions) -> StorageResult<MessagePage>;

    async fn get(&self, queue: &QueueId, message_id: &str) -> StorageResult<Message>;

    /// Fetches several messages; unknown or expired ids are skipped.
    async fn bulk_get(&self, queue: &QueueId, message_ids: &[String]) -> StorageResult<Vec<Message>>;

    /// Deletes one message. A message bound to a live claim can only be
    /// deleted by presenting that claim's id. Deleting an absent message
    /// succeeds.
    async fn delete(
        &self,
        queue: &QueueId,
        message_id: &str,
        claim_id: Option<&str>,
    ) -> StorageResult<()>;

    /// Deletes several unclaimed messages; claimed ones are left in place.
    async fn bulk_delete(&self, queue: &QueueId, message_ids: &[String]) -> StorageResult<()>;
}

/// The lease protocol over a queue's messages.
#[async_trait]
pub trait ClaimController: Send + Sync {
    /// Atomically leases up to `claim.limit` free messages, oldest first.
    ///
    /// Returns [`ClaimBatch::empty`] when nothing is claimable.
    async fn create(&self, queue: &QueueId, claim: NewClaim) -> StorageResult<ClaimBatch>;

    async fn get(&self, queue: &QueueId, claim_id: &str) -> StorageResult<ClaimDetails>;

    /// Restarts the lease with a new `ttl` (and optionally a new `grace`).
    async fn update(
        &self,
        queue: &QueueId,
        claim_id: &str,
        ttl: u32,
        grace: Option<u32>,
    ) -> StorageResult<()>;

    /// Releases the claim. Releasing an absent or expired claim succeeds.
    async fn delete(&self, queue: &QueueId, claim_id: &str) -> StorageResult<()>;
}

/// A complete storage backend.
///
/// Used as `Arc<dyn DataDriver>`.
#[async_trait]
pub trait DataDriver: Send + Sync {
    fn queues(&self) -> &dyn QueueController;

    fn messages(&self) -> &dyn MessageController;

    fn claims(&self) -> &dyn ClaimController;

    /// Lightweight connectivity probe.
    async fn is_alive(&self) -> bool;
}

//! Durable home of pool records and catalog entries.
//!
//! Every method that changes state is a single transactional step in the
//! backing store, so registry and catalog invariants hold across
//! concurrent callers:
//!
//! - a pool referenced by any catalog entry can't be removed
//! - a catalog entry can only name an existing pool
//! - at most one entry exists per queue; the first writer wins

use async_trait::async_trait;
use wharf_core::{CatalogEntry, PoolRecord, PoolUpdate, QueueId, StorageResult};

/// Persistence contract for the pool registry and the queue catalog.
///
/// Used as `Arc<dyn ControlStore>`.
#[async_trait]
pub trait ControlStore: Send + Sync {
    /// Stores a new pool.
    ///
    /// # Errors
    ///
    /// `PoolAlreadyExists` if the name is taken.
    async fn insert_pool(&self, pool: &PoolRecord) -> StorageResult<()>;

    async fn get_pool(&self, name: &str) -> StorageResult<Option<PoolRecord>>;

    /// Applies `update` and returns the stored record.
    ///
    /// # Errors
    ///
    /// `PoolDoesNotExist` if there is no such pool.
    async fn update_pool(&self, name: &str, update: &PoolUpdate) -> StorageResult<PoolRecord>;

    /// Removes a pool unless a catalog entry references it. Removing an
    /// absent pool succeeds.
    ///
    /// # Errors
    ///
    /// `PoolInUse` while referenced.
    async fn remove_pool_if_unused(&self, name: &str) -> StorageResult<()>;

    /// Pools ordered by name, starting after `marker`.
    async fn list_pools(&self, marker: Option<&str>, limit: usize) -> StorageResult<Vec<PoolRecord>>;

    /// Pool the queue is routed to, if any.
    async fn get_entry(&self, queue: &QueueId) -> StorageResult<Option<String>>;

    /// Routes `queue` to `pool` unless an entry already exists. Returns the
    /// existing owner in that case, `None` when this call wrote the entry.
    ///
    /// # Errors
    ///
    /// `PoolDoesNotExist` if `pool` vanished before the entry was written.
    async fn insert_entry_if_absent(
        &self,
        queue: &QueueId,
        pool: &str,
    ) -> StorageResult<Option<String>>;

    /// Removes the queue's entry. Idempotent.
    async fn remove_entry(&self, queue: &QueueId) -> StorageResult<()>;

    /// A project's entries ordered by queue name, starting after `marker`.
    async fn list_entries(
        &self,
        project: &str,
        marker: Option<&str>,
        limit: usize,
    ) -> StorageResult<Vec<CatalogEntry>>;
}

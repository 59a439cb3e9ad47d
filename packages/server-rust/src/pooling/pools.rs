//! Operator-facing registry of storage pools.

use std::sync::Arc;

use tracing::info;
use wharf_core::{validation, PoolRecord, PoolUpdate, StorageError, StorageResult};

use super::catalog::Catalog;

/// Creates, reads, updates and deletes pool records.
///
/// Uris are probed before they are stored, and every change that affects
/// how a pool is reached evicts the catalog's cached driver for it.
#[derive(Clone)]
pub struct PoolController {
    catalog: Arc<Catalog>,
}

impl PoolController {
    #[must_use]
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    async fn probe(&self, uri: &str) -> StorageResult<()> {
        if self.catalog.registry().can_connect(uri).await {
            Ok(())
        } else {
            Err(StorageError::PoolUnreachable {
                uri: uri.to_string(),
            })
        }
    }

    /// # Errors
    ///
    /// `BadRequest` for an invalid name, `PoolUnreachable` if the uri can't
    /// be probed, `PoolAlreadyExists` for a duplicate name.
    pub async fn create(&self, pool: PoolRecord) -> StorageResult<()> {
        validation::name("pool", &pool.name)?;
        self.probe(&pool.uri).await?;
        self.catalog.control().insert_pool(&pool).await?;
        info!(pool = %pool.name, uri = %pool.uri, weight = pool.weight, flavor = pool.flavor.as_deref(), "pool registered");
        Ok(())
    }

    /// Reads a pool; `detailed = false` omits its options.
    pub async fn get(&self, name: &str, detailed: bool) -> StorageResult<PoolRecord> {
        let pool = self
            .catalog
            .control()
            .get_pool(name)
            .await?
            .ok_or_else(|| StorageError::PoolDoesNotExist(name.to_string()))?;
        Ok(if detailed { pool } else { pool.summary() })
    }

    /// # Errors
    ///
    /// `BadRequest` for an empty update, `PoolUnreachable` if a new uri can't
    /// be probed, `PoolDoesNotExist` for an unknown pool.
    pub async fn update(&self, name: &str, update: PoolUpdate) -> StorageResult<PoolRecord> {
        if update.is_empty() {
            return Err(StorageError::bad_request("pool update sets no fields"));
        }
        if let Some(uri) = &update.uri {
            self.probe(uri).await?;
        }

        let pool = self.catalog.control().update_pool(name, &update).await?;
        if update.uri.is_some() {
            self.catalog.invalidate(name);
        }
        info!(pool = %name, uri = %pool.uri, weight = pool.weight, "pool updated");
        Ok(pool)
    }

    /// Deletes a pool. Deleting an absent pool succeeds.
    ///
    /// # Errors
    ///
    /// `PoolInUse` while any queue is routed to it.
    pub async fn delete(&self, name: &str) -> StorageResult<()> {
        self.catalog.control().remove_pool_if_unused(name).await?;
        self.catalog.invalidate(name);
        info!(pool = %name, "pool deleted");
        Ok(())
    }

    pub async fn list(
        &self,
        marker: Option<&str>,
        limit: usize,
        detailed: bool,
    ) -> StorageResult<Vec<PoolRecord>> {
        let pools = self.catalog.control().list_pools(marker, limit).await?;
        Ok(if detailed {
            pools
        } else {
            pools.iter().map(PoolRecord::summary).collect()
        })
    }
}

//! Queue-to-pool routing.
//!
//! [`Catalog::resolve`] assigns a pool to a queue the first time it is
//! created and persists that choice; every later operation uses
//! [`Catalog::lookup`], which never assigns. Assignments are sticky until
//! [`Catalog::forget`] removes them on queue deletion.
//!
//! One terminal driver is cached per pool and rebuilt when the pool's uri
//! changes.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info};
use wharf_core::{CatalogEntry, PoolRecord, QueueId, StorageError, StorageResult};

use super::control::ControlStore;
use super::selection;
use crate::storage::{DataDriver, DriverRegistry};

const POOL_PAGE: usize = 100;

struct CachedDriver {
    uri: String,
    driver: Arc<dyn DataDriver>,
}

/// Outcome of [`Catalog::resolve`].
pub struct Route {
    pub pool: String,
    pub driver: Arc<dyn DataDriver>,
    /// `true` when this call wrote the catalog entry.
    pub assigned: bool,
}

pub struct Catalog {
    control: Arc<dyn ControlStore>,
    registry: Arc<DriverRegistry>,
    drivers: DashMap<String, CachedDriver>,
}

impl Catalog {
    #[must_use]
    pub fn new(control: Arc<dyn ControlStore>, registry: Arc<DriverRegistry>) -> Self {
        Self {
            control,
            registry,
            drivers: DashMap::new(),
        }
    }

    #[must_use]
    pub fn control(&self) -> &Arc<dyn ControlStore> {
        &self.control
    }

    #[must_use]
    pub fn registry(&self) -> &DriverRegistry {
        &self.registry
    }

    /// Returns the queue's pool, assigning one if the queue has none.
    ///
    /// A new assignment draws among pools matching `flavor` with non-zero
    /// weight, probes the chosen pool and records the entry. When another
    /// caller records an entry first, its choice is adopted.
    ///
    /// # Errors
    ///
    /// `NoPoolAvailable` when nothing is eligible, `PoolUnreachable` when the
    /// chosen pool fails its probe.
    pub async fn resolve(&self, queue: &QueueId, flavor: Option<&str>) -> StorageResult<Route> {
        if let Some(pool) = self.control.get_entry(queue).await? {
            return self.existing(pool).await;
        }

        let pools = self.all_pools().await?;
        let candidates = selection::eligible(&pools, flavor);
        let chosen = selection::pick(&candidates, &mut rand::rng())
            .cloned()
            .ok_or_else(|| StorageError::NoPoolAvailable {
                queue: queue.clone(),
                flavor: flavor.map(str::to_string),
            })?;

        let driver = self.install(&chosen)?;
        if !driver.is_alive().await {
            return Err(StorageError::PoolUnreachable { uri: chosen.uri });
        }

        match self.control.insert_entry_if_absent(queue, &chosen.name).await? {
            None => {
                info!(queue = %queue, pool = %chosen.name, flavor, "queue assigned to pool");
                Ok(Route {
                    pool: chosen.name,
                    driver,
                    assigned: true,
                })
            }
            Some(owner) => {
                debug!(queue = %queue, pool = %owner, "adopted concurrent assignment");
                self.existing(owner).await
            }
        }
    }

    /// Driver for the queue's pool, or `None` if the queue is not routed.
    pub async fn lookup(&self, queue: &QueueId) -> StorageResult<Option<Arc<dyn DataDriver>>> {
        match self.control.get_entry(queue).await? {
            Some(pool) => self.driver(&pool).await.map(Some),
            None => Ok(None),
        }
    }

    /// Removes the queue's assignment. Idempotent.
    pub async fn forget(&self, queue: &QueueId) -> StorageResult<()> {
        self.control.remove_entry(queue).await?;
        debug!(queue = %queue, "queue assignment removed");
        Ok(())
    }

    pub async fn entries(
        &self,
        project: &str,
        marker: Option<&str>,
        limit: usize,
    ) -> StorageResult<Vec<CatalogEntry>> {
        self.control.list_entries(project, marker, limit).await
    }

    /// Drops the cached driver for `pool`.
    pub fn invalidate(&self, pool: &str) {
        if self.drivers.remove(pool).is_some() {
            debug!(pool, "pool driver evicted");
        }
    }

    /// Driver for `pool`, built on first use.
    ///
    /// The record is re-read on every call, so a uri changed through a
    /// shared control store by another process swaps the driver here too.
    pub async fn driver(&self, pool: &str) -> StorageResult<Arc<dyn DataDriver>> {
        let record = self
            .control
            .get_pool(pool)
            .await?
            .ok_or_else(|| StorageError::PoolDoesNotExist(pool.to_string()))?;
        self.install(&record)
    }

    async fn existing(&self, pool: String) -> StorageResult<Route> {
        let driver = self.driver(&pool).await?;
        Ok(Route {
            pool,
            driver,
            assigned: false,
        })
    }

    /// Returns the cached driver for `record`, rebuilding it if the uri
    /// differs from the one it was built for.
    fn install(&self, record: &PoolRecord) -> StorageResult<Arc<dyn DataDriver>> {
        match self.drivers.entry(record.name.clone()) {
            Entry::Occupied(cached) if cached.get().uri == record.uri => {
                Ok(Arc::clone(&cached.get().driver))
            }
            entry => {
                let driver = self.registry.create(&record.uri)?;
                entry.insert(CachedDriver {
                    uri: record.uri.clone(),
                    driver: Arc::clone(&driver),
                });
                debug!(pool = %record.name, uri = %record.uri, "pool driver built");
                Ok(driver)
            }
        }
    }

    async fn all_pools(&self) -> StorageResult<Vec<PoolRecord>> {
        let mut pools = Vec::new();
        loop {
            let marker = pools.last().map(|pool: &PoolRecord| pool.name.clone());
            let page = self.control.list_pools(marker.as_deref(), POOL_PAGE).await?;
            let done = page.len() < POOL_PAGE;
            pools.extend(page);
            if done {
                return Ok(pools);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use wharf_core::{ErrorKind, PoolUpdate};

    use super::*;
    use crate::pooling::control_stores::MemoryControlStore;
    use crate::storage::DriverContext;

    async fn catalog_with(pools: &[PoolRecord]) -> Arc<Catalog> {
        let control = Arc::new(MemoryControlStore::new());
        for pool in pools {
            control.insert_pool(pool).await.unwrap();
        }
        let registry = Arc::new(DriverRegistry::with_builtin(DriverContext::default()));
        Arc::new(Catalog::new(control, registry))
    }

    #[tokio::test]
    async fn resolution_is_sticky() {
        let catalog = catalog_with(&[
            PoolRecord::new("a", "memory://a", 1),
            PoolRecord::new("b", "memory://b", 1),
        ])
        .await;
        let queue = QueueId::new("p", "q");

        let first = catalog.resolve(&queue, None).await.unwrap();
        assert!(first.assigned);
        for _ in 0..20 {
            let again = catalog.resolve(&queue, None).await.unwrap();
            assert_eq!(again.pool, first.pool);
            assert!(!again.assigned);
        }
        assert!(catalog.lookup(&queue).await.unwrap().is_some());

        catalog.forget(&queue).await.unwrap();
        catalog.forget(&queue).await.unwrap();
        assert!(catalog.lookup(&queue).await.unwrap().is_none());
    }

    /// Holds every caller at `get_entry` until all of them have arrived, so
    /// they all miss the entry and race on `insert_entry_if_absent`.
    struct RacingStore {
        inner: MemoryControlStore,
        gate: tokio::sync::Barrier,
        lost: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ControlStore for RacingStore {
        async fn insert_pool(&self, pool: &PoolRecord) -> StorageResult<()> {
            self.inner.insert_pool(pool).await
        }

        async fn get_pool(&self, name: &str) -> StorageResult<Option<PoolRecord>> {
            tokio::task::yield_now().await;
            self.inner.get_pool(name).await
        }

        async fn update_pool(&self, name: &str, update: &PoolUpdate) -> StorageResult<PoolRecord> {
            self.inner.update_pool(name, update).await
        }

        async fn remove_pool_if_unused(&self, name: &str) -> StorageResult<()> {
            self.inner.remove_pool_if_unused(name).await
        }

        async fn list_pools(
            &self,
            marker: Option<&str>,
            limit: usize,
        ) -> StorageResult<Vec<PoolRecord>> {
            tokio::task::yield_now().await;
            self.inner.list_pools(marker, limit).await
        }

        async fn get_entry(&self, queue: &QueueId) -> StorageResult<Option<String>> {
            let entry = self.inner.get_entry(queue).await;
            self.gate.wait().await;
            entry
        }

        async fn insert_entry_if_absent(
            &self,
            queue: &QueueId,
            pool: &str,
        ) -> StorageResult<Option<String>> {
            tokio::task::yield_now().await;
            let owner = self.inner.insert_entry_if_absent(queue, pool).await?;
            if owner.is_some() {
                self.lost.fetch_add(1, Ordering::SeqCst);
            }
            Ok(owner)
        }

        async fn remove_entry(&self, queue: &QueueId) -> StorageResult<()> {
            self.inner.remove_entry(queue).await
        }

        async fn list_entries(
            &self,
            project: &str,
            marker: Option<&str>,
            limit: usize,
        ) -> StorageResult<Vec<CatalogEntry>> {
            self.inner.list_entries(project, marker, limit).await
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_first_resolution_agrees() {
        const CALLERS: usize = 32;

        let inner = MemoryControlStore::new();
        for i in 0..5 {
            inner
                .insert_pool(&PoolRecord::new(format!("p{i}"), format!("memory://p{i}"), 10))
                .await
                .unwrap();
        }
        let store = Arc::new(RacingStore {
            inner,
            gate: tokio::sync::Barrier::new(CALLERS),
            lost: AtomicUsize::new(0),
        });
        let registry = Arc::new(DriverRegistry::with_builtin(DriverContext::default()));
        let catalog = Arc::new(Catalog::new(
            Arc::clone(&store) as Arc<dyn ControlStore>,
            registry,
        ));
        let queue = QueueId::new("p", "contended");

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..CALLERS {
            let catalog = Arc::clone(&catalog);
            let queue = queue.clone();
            tasks.spawn(async move { catalog.resolve(&queue, None).await.unwrap() });
        }

        let mut chosen = HashSet::new();
        let mut drivers: Vec<Arc<dyn DataDriver>> = Vec::new();
        let mut assigned = 0;
        while let Some(route) = tasks.join_next().await {
            let route = route.unwrap();
            assigned += usize::from(route.assigned);
            chosen.insert(route.pool);
            drivers.push(route.driver);
        }
        assert_eq!(chosen.len(), 1);
        assert_eq!(assigned, 1);
        // Every caller got past the empty lookup; all but the winner adopted.
        assert_eq!(store.lost.load(Ordering::SeqCst), CALLERS - 1);
        assert!(drivers.iter().all(|d| Arc::ptr_eq(d, &drivers[0])));

        let owner = chosen.into_iter().next().unwrap();
        assert_eq!(store.inner.get_entry(&queue).await.unwrap(), Some(owner));
    }

    #[tokio::test]
    async fn same_pool_shares_one_driver() {
        let catalog = catalog_with(&[PoolRecord::new("a", "memory://a", 1)]).await;
        let first = catalog.resolve(&QueueId::new("p", "q1"), None).await.unwrap();
        let second = catalog.resolve(&QueueId::new("p", "q2"), None).await.unwrap();
        assert!(Arc::ptr_eq(&first.driver, &second.driver));

        catalog.invalidate("a");
        let rebuilt = catalog.driver("a").await.unwrap();
        assert!(!Arc::ptr_eq(&first.driver, &rebuilt));
    }

    #[tokio::test]
    async fn driver_follows_uri_changed_elsewhere() {
        let catalog = catalog_with(&[PoolRecord::new("a", "memory://a", 1)]).await;
        let queue = QueueId::new("p", "q");
        let route = catalog.resolve(&queue, None).await.unwrap();

        // Written straight to the control store, as a peer sharing it would.
        catalog
            .control()
            .update_pool(
                "a",
                &PoolUpdate {
                    uri: Some("memory://moved".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let moved = catalog.driver("a").await.unwrap();
        assert!(!Arc::ptr_eq(&route.driver, &moved));
        let routed = catalog.lookup(&queue).await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&routed, &moved));
        assert!(Arc::ptr_eq(&moved, &catalog.driver("a").await.unwrap()));
    }

    #[tokio::test]
    async fn flavor_restricts_candidates() {
        let catalog = catalog_with(&[
            PoolRecord::new("plain", "memory://plain", 100),
            PoolRecord::new("gold", "memory://gold", 1).with_flavor("gold"),
        ])
        .await;

        for i in 0..10 {
            let queue = QueueId::new("p", format!("g{i}"));
            assert_eq!(catalog.resolve(&queue, Some("gold")).await.unwrap().pool, "gold");
            let queue = QueueId::new("p", format!("n{i}"));
            assert_eq!(catalog.resolve(&queue, None).await.unwrap().pool, "plain");
        }

        let err = catalog
            .resolve(&QueueId::new("p", "s"), Some("silver"))
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::NoPoolAvailable);
    }

    #[tokio::test]
    async fn weight_zero_excludes_new_queues_only() {
        let catalog = catalog_with(&[PoolRecord::new("a", "memory://a", 1)]).await;
        let queue = QueueId::new("p", "q");
        catalog.resolve(&queue, None).await.unwrap();

        catalog
            .control()
            .update_pool(
                "a",
                &PoolUpdate {
                    weight: Some(0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(catalog.resolve(&queue, None).await.unwrap().pool, "a");
        let err = catalog
            .resolve(&QueueId::new("p", "new"), None)
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::NoPoolAvailable);
    }

    #[tokio::test]
    async fn unreachable_pool_leaves_no_entry() {
        let catalog = catalog_with(&[PoolRecord::new("x", "nowhere://x", 1)]).await;
        let queue = QueueId::new("p", "q");

        let err = catalog.resolve(&queue, None).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::PoolUnreachable);
        assert!(catalog.lookup(&queue).await.unwrap().is_none());
    }
}

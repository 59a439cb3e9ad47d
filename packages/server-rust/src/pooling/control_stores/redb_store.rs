//! Control store persisted in a single redb file.
//!
//! Pool records are `MessagePack`-encoded with `rmp-serde`; catalog entries
//! map `(project, queue)` to a pool name. Each mutation runs in one write
//! transaction, and redb serializes write transactions, so the conditional
//! steps (`insert_entry_if_absent`, `remove_pool_if_unused`) are atomic.
//! All redb work runs on the blocking thread pool.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use redb::{Database, ReadableTable, TableDefinition};
use wharf_core::{CatalogEntry, PoolRecord, PoolUpdate, QueueId, StorageError, StorageResult};

use crate::pooling::control::ControlStore;

/// Pool records keyed by pool name.
const POOLS: TableDefinition<&str, &[u8]> = TableDefinition::new("pools");

/// Catalog entries keyed by `(project, queue)`.
const CATALOG: TableDefinition<(&str, &str), &str> = TableDefinition::new("catalog");

pub struct RedbControlStore {
    db: Arc<Database>,
}

impl RedbControlStore {
    /// Opens (or creates) the database at `path` and ensures both tables exist.
    ///
    /// # Errors
    ///
    /// Fails if the file can't be opened or the tables can't be created.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let db = Database::create(path)
            .with_context(|| format!("opening control store at {}", path.display()))?;

        let txn = db.begin_write()?;
        {
            txn.open_table(POOLS)?;
            txn.open_table(CATALOG)?;
        }
        txn.commit()?;

        tracing::info!(path = %path.display(), "redb control store opened");
        Ok(Self { db: Arc::new(db) })
    }

    /// Runs `op` on the blocking pool. The outer `anyhow` error carries
    /// backend failures; the inner result carries domain outcomes.
    async fn run<T, F>(&self, op: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> anyhow::Result<StorageResult<T>> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || op(&db))
            .await
            .map_err(|err| StorageError::BackendUnavailable(err.into()))?
            .unwrap_or_else(|err| Err(StorageError::BackendUnavailable(err)))
    }
}

fn encode(pool: &PoolRecord) -> anyhow::Result<Vec<u8>> {
    Ok(rmp_serde::to_vec_named(pool)?)
}

fn decode(bytes: &[u8]) -> anyhow::Result<PoolRecord> {
    Ok(rmp_serde::from_slice(bytes)?)
}

#[async_trait]
impl ControlStore for RedbControlStore {
    async fn insert_pool(&self, pool: &PoolRecord) -> StorageResult<()> {
        let pool = pool.clone();
        self.run(move |db| {
            let bytes = encode(&pool)?;
            let txn = db.begin_write()?;
            {
                let mut table = txn.open_table(POOLS)?;
                if table.get(pool.name.as_str())?.is_some() {
                    return Ok(Err(StorageError::PoolAlreadyExists(pool.name)));
                }
                table.insert(pool.name.as_str(), bytes.as_slice())?;
            }
            txn.commit()?;
            Ok(Ok(()))
        })
        .await
    }

    async fn get_pool(&self, name: &str) -> StorageResult<Option<PoolRecord>> {
        let name = name.to_string();
        self.run(move |db| {
            let txn = db.begin_read()?;
            let table = txn.open_table(POOLS)?;
            let pool = match table.get(name.as_str())? {
                Some(bytes) => Some(decode(bytes.value())?),
                None => None,
            };
            Ok(Ok(pool))
        })
        .await
    }

    async fn update_pool(&self, name: &str, update: &PoolUpdate) -> StorageResult<PoolRecord> {
        let name = name.to_string();
        let update = update.clone();
        self.run(move |db| {
            let txn = db.begin_write()?;
            let pool = {
                let mut table = txn.open_table(POOLS)?;
                let current = table.get(name.as_str())?.map(|bytes| decode(bytes.value()));
                let Some(current) = current else {
                    return Ok(Err(StorageError::PoolDoesNotExist(name)));
                };
                let mut pool = current?;
                update.apply(&mut pool);
                table.insert(name.as_str(), encode(&pool)?.as_slice())?;
                pool
            };
            txn.commit()?;
            Ok(Ok(pool))
        })
        .await
    }

    async fn remove_pool_if_unused(&self, name: &str) -> StorageResult<()> {
        let name = name.to_string();
        self.run(move |db| {
            let txn = db.begin_write()?;
            {
                let catalog = txn.open_table(CATALOG)?;
                for entry in catalog.iter()? {
                    let (_, owner) = entry?;
                    if owner.value() == name {
                        return Ok(Err(StorageError::PoolInUse(name)));
                    }
                }
                let mut pools = txn.open_table(POOLS)?;
                pools.remove(name.as_str())?;
            }
            txn.commit()?;
            Ok(Ok(()))
        })
        .await
    }

    async fn list_pools(&self, marker: Option<&str>, limit: usize) -> StorageResult<Vec<PoolRecord>> {
        let marker = marker.map(str::to_string);
        self.run(move |db| {
            let txn = db.begin_read()?;
            let table = txn.open_table(POOLS)?;
            let start = marker.as_deref().unwrap_or("");
            let mut pools = Vec::new();
            for entry in table.range(start..)? {
                if pools.len() == limit {
                    break;
                }
                let (name, bytes) = entry?;
                if marker.as_deref() == Some(name.value()) {
                    continue;
                }
                pools.push(decode(bytes.value())?);
            }
            Ok(Ok(pools))
        })
        .await
    }

    async fn get_entry(&self, queue: &QueueId) -> StorageResult<Option<String>> {
        let queue = queue.clone();
        self.run(move |db| {
            let txn = db.begin_read()?;
            let table = txn.open_table(CATALOG)?;
            let pool = table
                .get((queue.project.as_str(), queue.name.as_str()))?
                .map(|owner| owner.value().to_string());
            Ok(Ok(pool))
        })
        .await
    }

    async fn insert_entry_if_absent(
        &self,
        queue: &QueueId,
        pool: &str,
    ) -> StorageResult<Option<String>> {
        let queue = queue.clone();
        let pool = pool.to_string();
        self.run(move |db| {
            let key = (queue.project.as_str(), queue.name.as_str());
            let txn = db.begin_write()?;
            {
                let mut catalog = txn.open_table(CATALOG)?;
                if let Some(owner) = catalog.get(key)? {
                    return Ok(Ok(Some(owner.value().to_string())));
                }
                let pools = txn.open_table(POOLS)?;
                if pools.get(pool.as_str())?.is_none() {
                    return Ok(Err(StorageError::PoolDoesNotExist(pool)));
                }
                catalog.insert(key, pool.as_str())?;
            }
            txn.commit()?;
            Ok(Ok(None))
        })
        .await
    }

    async fn remove_entry(&self, queue: &QueueId) -> StorageResult<()> {
        let queue = queue.clone();
        self.run(move |db| {
            let txn = db.begin_write()?;
            {
                let mut catalog = txn.open_table(CATALOG)?;
                catalog.remove((queue.project.as_str(), queue.name.as_str()))?;
            }
            txn.commit()?;
            Ok(Ok(()))
        })
        .await
    }

    async fn list_entries(
        &self,
        project: &str,
        marker: Option<&str>,
        limit: usize,
    ) -> StorageResult<Vec<CatalogEntry>> {
        let project = project.to_string();
        let marker = marker.map(str::to_string);
        self.run(move |db| {
            let txn = db.begin_read()?;
            let table = txn.open_table(CATALOG)?;
            let start = (project.as_str(), marker.as_deref().unwrap_or(""));
            let mut entries = Vec::new();
            for entry in table.range(start..)? {
                if entries.len() == limit {
                    break;
                }
                let (key, owner) = entry?;
                let (owner_project, name) = key.value();
                if owner_project != project {
                    break;
                }
                if marker.as_deref() == Some(name) {
                    continue;
                }
                entries.push(CatalogEntry {
                    queue: QueueId::new(owner_project, name),
                    pool: owner.value().to_string(),
                });
            }
            Ok(Ok(entries))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pooling::control::conformance;

    fn open_temp() -> (tempfile::TempDir, RedbControlStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbControlStore::open(dir.path().join("control.redb")).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn pool_registry() {
        let (_dir, store) = open_temp();
        conformance::pool_registry(&store).await;
    }

    #[tokio::test]
    async fn catalog() {
        let (_dir, store) = open_temp();
        conformance::catalog(&store).await;
    }

    #[tokio::test]
    async fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("control.redb");
        let queue = QueueId::new("480924", "fizbit");

        {
            let store = RedbControlStore::open(&path).unwrap();
            store
                .insert_pool(&PoolRecord::new("p1", "memory://p1", 5))
                .await
                .unwrap();
            store.insert_entry_if_absent(&queue, "p1").await.unwrap();
        }

        let store = RedbControlStore::open(&path).unwrap();
        assert_eq!(store.get_pool("p1").await.unwrap().unwrap().weight, 5);
        assert_eq!(store.get_entry(&queue).await.unwrap().as_deref(), Some("p1"));
    }
}

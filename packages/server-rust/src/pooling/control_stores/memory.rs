//! Process-local control store. All state sits behind one write lock, which
//! makes every mutation a single atomic step.

use std::collections::BTreeMap;
use std::ops::Bound;

use async_trait::async_trait;
use parking_lot::RwLock;
use wharf_core::{CatalogEntry, PoolRecord, PoolUpdate, QueueId, StorageError, StorageResult};

use crate::pooling::control::ControlStore;

#[derive(Debug, Default)]
struct State {
    pools: BTreeMap<String, PoolRecord>,
    /// (project, queue) -> pool
    entries: BTreeMap<(String, String), String>,
}

impl State {
    fn references(&self, pool: &str) -> bool {
        self.entries.values().any(|owner| owner == pool)
    }
}

#[derive(Debug, Default)]
pub struct MemoryControlStore {
    state: RwLock<State>,
}

impl MemoryControlStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn entry_key(queue: &QueueId) -> (String, String) {
    (queue.project.clone(), queue.name.clone())
}

#[async_trait]
impl ControlStore for MemoryControlStore {
    async fn insert_pool(&self, pool: &PoolRecord) -> StorageResult<()> {
        let mut state = self.state.write();
        if state.pools.contains_key(&pool.name) {
            return Err(StorageError::PoolAlreadyExists(pool.name.clone()));
        }
        state.pools.insert(pool.name.clone(), pool.clone());
        Ok(())
    }

    async fn get_pool(&self, name: &str) -> StorageResult<Option<PoolRecord>> {
        Ok(self.state.read().pools.get(name).cloned())
    }

    async fn update_pool(&self, name: &str, update: &PoolUpdate) -> StorageResult<PoolRecord> {
        let mut state = self.state.write();
        let pool = state
            .pools
            .get_mut(name)
            .ok_or_else(|| StorageError::PoolDoesNotExist(name.to_string()))?;
        update.apply(pool);
        Ok(pool.clone())
    }

    async fn remove_pool_if_unused(&self, name: &str) -> StorageResult<()> {
        let mut state = self.state.write();
        if state.references(name) {
            return Err(StorageError::PoolInUse(name.to_string()));
        }
        state.pools.remove(name);
        Ok(())
    }

    async fn list_pools(&self, marker: Option<&str>, limit: usize) -> StorageResult<Vec<PoolRecord>> {
        let state = self.state.read();
        let start = marker.map_or(Bound::Unbounded, |m| Bound::Excluded(m.to_string()));
        Ok(state
            .pools
            .range((start, Bound::Unbounded))
            .take(limit)
            .map(|(_, pool)| pool.clone())
            .collect())
    }

    async fn get_entry(&self, queue: &QueueId) -> StorageResult<Option<String>> {
        Ok(self.state.read().entries.get(&entry_key(queue)).cloned())
    }

    async fn insert_entry_if_absent(
        &self,
        queue: &QueueId,
        pool: &str,
    ) -> StorageResult<Option<String>> {
        let mut state = self.state.write();
        if let Some(owner) = state.entries.get(&entry_key(queue)) {
            return Ok(Some(owner.clone()));
        }
        if !state.pools.contains_key(pool) {
            return Err(StorageError::PoolDoesNotExist(pool.to_string()));
        }
        state.entries.insert(entry_key(queue), pool.to_string());
        Ok(None)
    }

    async fn remove_entry(&self, queue: &QueueId) -> StorageResult<()> {
        self.state.write().entries.remove(&entry_key(queue));
        Ok(())
    }

    async fn list_entries(
        &self,
        project: &str,
        marker: Option<&str>,
        limit: usize,
    ) -> StorageResult<Vec<CatalogEntry>> {
        let state = self.state.read();
        let start = match marker {
            Some(m) => Bound::Excluded((project.to_string(), m.to_string())),
            None => Bound::Included((project.to_string(), String::new())),
        };
        Ok(state
            .entries
            .range((start, Bound::Unbounded))
            .take_while(|((owner, _), _)| owner == project)
            .take(limit)
            .map(|((project, name), pool)| CatalogEntry {
                queue: QueueId::new(project.clone(), name.clone()),
                pool: pool.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pooling::control::conformance;

    #[tokio::test]
    async fn pool_registry() {
        conformance::pool_registry(&MemoryControlStore::new()).await;
    }

    #[tokio::test]
    async fn catalog() {
        conformance::catalog(&MemoryControlStore::new()).await;
    }
}

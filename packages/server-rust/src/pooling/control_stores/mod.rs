//! [`ControlStore`](super::ControlStore) backends, selected by URI.

mod memory;
#[cfg(feature = "redb")]
mod redb_store;

use std::sync::Arc;

pub use memory::MemoryControlStore;
#[cfg(feature = "redb")]
pub use redb_store::RedbControlStore;

use super::control::ControlStore;
use crate::storage::scheme_of;

/// Opens the control store named by `uri`.
///
/// `memory://` gives a process-local store; `redb://<path>` opens (or
/// creates) a redb file when the `redb` feature is enabled.
///
/// # Errors
///
/// Fails for unknown schemes or when the backing file can't be opened.
pub fn open_control_store(uri: &str) -> anyhow::Result<Arc<dyn ControlStore>> {
    match scheme_of(uri) {
        Some("memory") => Ok(Arc::new(MemoryControlStore::new())),
        #[cfg(feature = "redb")]
        Some("redb") => {
            let path = &uri["redb://".len()..];
            anyhow::ensure!(!path.is_empty(), "redb control store uri has no path: {uri}");
            Ok(Arc::new(RedbControlStore::open(path)?))
        }
        _ => anyhow::bail!("unsupported control store uri: {uri}"),
    }
}

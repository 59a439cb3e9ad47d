//! `DataDriver` implementations.
//!
//! Provides concrete backends for the [`DataDriver`](super::DataDriver) trait.
//! Currently includes [`MemoryDriver`], selected by `memory://` URIs.

mod memory;

pub use memory::MemoryDriver;

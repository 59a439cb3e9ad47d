//! Pooled storage: many backends behind one queue namespace.
//!
//! - [`control`]: [`ControlStore`], durable pool records and catalog entries
//! - [`control_stores`]: memory and redb control stores
//! - [`selection`]: weighted pool choice
//! - [`catalog`]: [`Catalog`], queue-to-pool routing with a driver cache
//! - [`pools`]: [`PoolController`], the operator-facing pool registry
//! - [`driver`]: [`PooledDriver`], the routing terminal driver

pub mod catalog;
pub mod control;
pub mod control_stores;
pub mod driver;
pub mod pools;
pub mod selection;

pub use catalog::{Catalog, Route};
pub use control::ControlStore;
pub use control_stores::{open_control_store, MemoryControlStore};
#[cfg(feature = "redb")]
pub use control_stores::RedbControlStore;
pub use driver::PooledDriver;
pub use pools::PoolController;

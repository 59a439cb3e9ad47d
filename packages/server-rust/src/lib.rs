//! Wharf Server: pooled queue storage: catalog routing across backend
//! pools, a staged storage pipeline, claim leases and the operation service.

pub mod pooling;
pub mod service;
pub mod storage;
pub mod telemetry;

pub use pooling::{Catalog, ControlStore, PoolController, PooledDriver};
pub use service::{bootstrap, bootstrap_with, Deployment, ServerConfig};
pub use storage::{DataDriver, DriverRegistry, MemoryDriver, Pipeline, StageRegistry};

//! Tower middleware layers for the operation service.
//!
//! - [`load_shed`]: semaphore-based concurrency limiting
//! - [`timeout`]: per-operation timeout enforcement
//! - [`metrics`]: operation timing, outcomes and claim sizes
//! - [`stack`]: composes all layers over the router

pub mod load_shed;
pub mod metrics;
pub mod stack;
pub mod timeout;

pub use load_shed::LoadShedLayer;
pub use metrics::MetricsLayer;
pub use stack::build_service_stack;
pub use timeout::TimeoutLayer;

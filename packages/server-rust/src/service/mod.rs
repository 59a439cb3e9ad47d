//! Operation routing and execution.
//!
//! 1. **Operations** (`operation`): typed requests, responses and errors
//! 2. **Middleware** (`middleware`): Tower layers (load shedding, timeout, metrics)
//! 3. **Routing** (`router`): dispatch to domain services by `service_name`
//! 4. **Domain services** (`domain`): queue, message, claim and pool handlers
//! 5. **Bootstrap** (`bootstrap`): builds a [`Deployment`] from a [`ServerConfig`]

pub mod bootstrap;
pub mod config;
pub mod domain;
pub mod middleware;
pub mod operation;
pub mod router;

pub use bootstrap::{bootstrap, bootstrap_with, Deployment};
pub use config::ServerConfig;
pub use middleware::stack::ServiceStack;
pub use operation::{
    service_names, Operation, OperationContext, OperationError, OperationResponse,
};
pub use router::OperationRouter;

//! Assembles a running deployment from a [`ServerConfig`].

use std::sync::Arc;

use anyhow::Context as _;
use tracing::info;
use wharf_core::{ClockSource, SystemClock};

use crate::pooling::{open_control_store, Catalog, PoolController, PooledDriver};
use crate::service::config::ServerConfig;
use crate::service::domain::{ClaimService, MessageService, PoolService, QueueService};
use crate::service::middleware::stack::{build_service_stack, ServiceStack};
use crate::service::operation::{service_names, OperationContext};
use crate::service::router::OperationRouter;
use crate::storage::{DataDriver, DriverContext, DriverRegistry, Pipeline, StageRegistry};

/// Everything a transport needs to serve operations.
pub struct Deployment {
    /// The storage pipeline, including its terminal driver.
    pub driver: Arc<dyn DataDriver>,
    /// Pool registry, present only when pooling is enabled.
    pub pools: Option<PoolController>,
    /// The middleware-wrapped operation service.
    pub service: ServiceStack,
    default_timeout_ms: u64,
}

impl Deployment {
    /// A context for `project` carrying the configured default timeout.
    #[must_use]
    pub fn context(&self, call_id: u64, project: impl Into<String>) -> OperationContext {
        OperationContext::new(call_id, project, self.default_timeout_ms)
    }
}

/// Bootstraps against the system clock with the built-in stages.
///
/// # Errors
///
/// See [`bootstrap_with`].
pub fn bootstrap(config: &ServerConfig) -> anyhow::Result<Deployment> {
    bootstrap_with(config, Arc::new(SystemClock), &StageRegistry::with_builtin())
}

/// Builds the control store, driver registry, terminal driver, pipeline and
/// service stack.
///
/// # Errors
///
/// Fails if the control store can't be opened, a pipeline stage is unknown,
/// or (without pooling) the storage uri has no driver.
pub fn bootstrap_with(
    config: &ServerConfig,
    clock: Arc<dyn ClockSource>,
    stages: &StageRegistry,
) -> anyhow::Result<Deployment> {
    let registry = Arc::new(DriverRegistry::with_builtin(DriverContext {
        limits: config.limits.clone(),
        clock,
    }));

    let (terminal, pools): (Arc<dyn DataDriver>, _) = if config.pooling {
        let control = open_control_store(&config.control_uri)
            .with_context(|| format!("opening control store {}", config.control_uri))?;
        let catalog = Arc::new(Catalog::new(control, registry));
        (
            Arc::new(PooledDriver::new(Arc::clone(&catalog))),
            Some(PoolController::new(catalog)),
        )
    } else {
        let driver = registry
            .create(&config.storage_uri)
            .with_context(|| format!("creating storage driver {}", config.storage_uri))?;
        (driver, None)
    };

    let pipeline = Pipeline::new(stages.build(config.pipeline.as_slice())?, terminal);
    info!(
        pooling = config.pooling,
        stages = ?pipeline.stage_names(),
        "storage pipeline ready"
    );
    let driver: Arc<dyn DataDriver> = Arc::new(pipeline);

    let mut router = OperationRouter::new();
    router.register(service_names::QUEUES, QueueService::new(Arc::clone(&driver)));
    router.register(service_names::MESSAGES, MessageService::new(Arc::clone(&driver)));
    router.register(service_names::CLAIMS, ClaimService::new(Arc::clone(&driver)));
    router.register(service_names::POOLS, PoolService::new(pools.clone()));

    Ok(Deployment {
        driver,
        pools,
        service: build_service_stack(router, config),
        default_timeout_ms: config.default_operation_timeout_ms,
    })
}

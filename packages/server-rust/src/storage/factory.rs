//! Registry of backend constructors keyed by URI scheme.
//!
//! [`DriverRegistry`] is the dependency injection point that turns a pool or
//! storage URI into a live [`DataDriver`]. Constructors are registered
//! explicitly at startup; there is no runtime discovery.

use std::collections::HashMap;
use std::sync::Arc;

use wharf_core::{ClockSource, StorageError, StorageResult, SystemClock};

use crate::storage::driver::DataDriver;
use crate::storage::engines::MemoryDriver;

/// Limits every backend applies to claims and listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLimits {
    /// Messages claimed when a request does not name a limit.
    pub default_claim_limit: usize,
    /// Upper bound on a claim request's limit.
    pub max_messages_per_claim: usize,
    /// Upper bound on a listing page.
    pub max_messages_per_page: usize,
}

impl Default for StorageLimits {
    fn default() -> Self {
        Self {
            default_claim_limit: 10,
            max_messages_per_claim: 20,
            max_messages_per_page: 20,
        }
    }
}

/// Shared inputs handed to every driver constructor.
#[derive(Clone)]
pub struct DriverContext {
    pub limits: StorageLimits,
    pub clock: Arc<dyn ClockSource>,
}

impl Default for DriverContext {
    fn default() -> Self {
        Self {
            limits: StorageLimits::default(),
            clock: Arc::new(SystemClock),
        }
    }
}

/// Builds a driver for a URI.
pub type DriverConstructor =
    Arc<dyn Fn(&str, &DriverContext) -> anyhow::Result<Arc<dyn DataDriver>> + Send + Sync>;

/// Returns the scheme of `uri` (`"memory"` for `"memory://pool-a"`).
#[must_use]
pub fn scheme_of(uri: &str) -> Option<&str> {
    uri.split_once("://")
        .map(|(scheme, _)| scheme)
        .filter(|scheme| !scheme.is_empty())
}

/// Maps URI schemes to driver constructors.
pub struct DriverRegistry {
    constructors: HashMap<String, DriverConstructor>,
    context: DriverContext,
}

impl DriverRegistry {
    /// Creates a registry with no schemes registered.
    #[must_use]
    pub fn new(context: DriverContext) -> Self {
        Self {
            constructors: HashMap::new(),
            context,
        }
    }

    /// Creates a registry with the built-in `memory` scheme.
    #[must_use]
    pub fn with_builtin(context: DriverContext) -> Self {
        let mut registry = Self::new(context);
        registry.register("memory", |_uri, ctx| {
            let driver: Arc<dyn DataDriver> = Arc::new(MemoryDriver::new(ctx.clone()));
            Ok(driver)
        });
        registry
    }

    /// Registers (or replaces) the constructor for `scheme`.
    pub fn register<F>(&mut self, scheme: &str, constructor: F)
    where
        F: Fn(&str, &DriverContext) -> anyhow::Result<Arc<dyn DataDriver>> + Send + Sync + 'static,
    {
        self.constructors
            .insert(scheme.to_string(), Arc::new(constructor));
    }

    #[must_use]
    pub fn context(&self) -> &DriverContext {
        &self.context
    }

    /// Builds a driver for `uri`.
    ///
    /// # Errors
    ///
    /// `PoolUnreachable` if no constructor handles the scheme,
    /// `BackendUnavailable` if the constructor fails.
    pub fn create(&self, uri: &str) -> StorageResult<Arc<dyn DataDriver>> {
        let constructor = scheme_of(uri)
            .and_then(|scheme| self.constructors.get(scheme))
            .ok_or_else(|| StorageError::PoolUnreachable {
                uri: uri.to_string(),
            })?;
        let driver = constructor(uri, &self.context)?;
        Ok(driver)
    }

    /// Builds a driver for `uri` and probes it.
    pub async fn can_connect(&self, uri: &str) -> bool {
        match self.create(uri) {
            Ok(driver) => driver.is_alive().await,
            Err(err) => {
                tracing::debug!(uri = %uri, error = %err, "connectivity probe failed");
                false
            }
        }
    }
}

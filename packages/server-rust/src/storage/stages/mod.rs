//! Built-in pipeline stages and the registry that names them.

mod logging;
mod metrics;

use std::collections::HashMap;
use std::sync::Arc;

pub use logging::LoggingStage;
pub use metrics::MetricsStage;

use crate::storage::pipeline::Stage;

/// Builds a fresh stage instance.
pub type StageConstructor = Arc<dyn Fn() -> Arc<dyn Stage> + Send + Sync>;

/// Maps stage names to constructors. Pipelines are assembled from a list of
/// names resolved here once at startup.
#[derive(Default)]
pub struct StageRegistry {
    constructors: HashMap<String, StageConstructor>,
}

impl StageRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding `logging` and `metrics`.
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(LoggingStage::NAME, || Arc::new(LoggingStage) as Arc<dyn Stage>);
        registry.register(MetricsStage::NAME, || Arc::new(MetricsStage) as Arc<dyn Stage>);
        registry
    }

    pub fn register<F>(&mut self, name: &str, constructor: F)
    where
        F: Fn() -> Arc<dyn Stage> + Send + Sync + 'static,
    {
        self.constructors
            .insert(name.to_string(), Arc::new(constructor));
    }

    /// Instantiates the named stages in order.
    ///
    /// # Errors
    ///
    /// Fails on the first name with no registered constructor.
    pub fn build<S: AsRef<str>>(&self, names: &[S]) -> anyhow::Result<Vec<Arc<dyn Stage>>> {
        names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                self.constructors
                    .get(name)
                    .map(|constructor| constructor())
                    .ok_or_else(|| anyhow::anyhow!("unknown pipeline stage {name:?}"))
            })
            .collect()
    }
}

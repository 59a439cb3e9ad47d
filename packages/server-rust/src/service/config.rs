use crate::storage::StorageLimits;

/// Server-level configuration for storage, pooling and the operation stack.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Routes queues across registered pools instead of one fixed backend.
    pub pooling: bool,
    /// Backend used when pooling is off.
    pub storage_uri: String,
    /// Where pool records and catalog entries live (`memory://` or
    /// `redb://<path>`).
    pub control_uri: String,
    /// Pipeline stage names, outermost first.
    pub pipeline: Vec<String>,
    pub limits: StorageLimits,
    /// Default timeout for operations in milliseconds.
    pub default_operation_timeout_ms: u64,
    /// Maximum number of concurrent operations before load shedding.
    pub max_concurrent_operations: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            pooling: false,
            storage_uri: "memory://default".to_string(),
            control_uri: "memory://".to_string(),
            pipeline: Vec::new(),
            limits: StorageLimits::default(),
            default_operation_timeout_ms: 30_000,
            max_concurrent_operations: 1000,
        }
    }
}

impl ServerConfig {
    /// A pooled configuration with an in-memory control store.
    #[must_use]
    pub fn pooled() -> Self {
        Self {
            pooling: true,
            ..Self::default()
        }
    }
}

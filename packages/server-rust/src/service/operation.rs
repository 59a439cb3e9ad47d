//! Typed operations dispatched through the service stack, and their results.

use wharf_core::{
    ClaimBatch, ClaimDetails, ListOptions, Message, MessagePage, Metadata, NewClaim, NewMessage,
    PoolRecord, PoolUpdate, QueueId, QueueStats, QueueSummary, StorageError,
};

/// Domain service names used for routing.
pub mod service_names {
    pub const QUEUES: &str = "queues";
    pub const MESSAGES: &str = "messages";
    pub const CLAIMS: &str = "claims";
    pub const POOLS: &str = "pools";
}

/// Context carried with every operation through the stack.
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub call_id: u64,
    /// Tenant the operation acts for. Every queue name is scoped to it.
    pub project_id: String,
    pub client_id: Option<String>,
    pub call_timeout_ms: u64,
}

impl OperationContext {
    #[must_use]
    pub fn new(call_id: u64, project_id: impl Into<String>, call_timeout_ms: u64) -> Self {
        Self {
            call_id,
            project_id: project_id.into(),
            client_id: None,
            call_timeout_ms,
        }
    }

    #[must_use]
    pub fn with_client(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Identity of `name` within this context's project.
    #[must_use]
    pub fn queue(&self, name: &str) -> QueueId {
        QueueId::new(self.project_id.clone(), name)
    }
}

/// Every operation the service accepts.
#[derive(Debug)]
pub enum Operation {
    // Queues
    CreateQueue { ctx: OperationContext, queue: String, metadata: Metadata },
    GetQueueMetadata { ctx: OperationContext, queue: String },
    SetQueueMetadata { ctx: OperationContext, queue: String, metadata: Metadata },
    QueueExists { ctx: OperationContext, queue: String },
    DeleteQueue { ctx: OperationContext, queue: String },
    ListQueues { ctx: OperationContext, marker: Option<String>, limit: usize, detailed: bool },
    QueueStats { ctx: OperationContext, queue: String },

    // Messages
    PostMessages { ctx: OperationContext, queue: String, messages: Vec<NewMessage> },
    ListMessages { ctx: OperationContext, queue: String, options: ListOptions },
    GetMessage { ctx: OperationContext, queue: String, message_id: String },
    BulkGetMessages { ctx: OperationContext, queue: String, message_ids: Vec<String> },
    DeleteMessage {
        ctx: OperationContext,
        queue: String,
        message_id: String,
        claim_id: Option<String>,
    },
    BulkDeleteMessages { ctx: OperationContext, queue: String, message_ids: Vec<String> },

    // Claims
    CreateClaim { ctx: OperationContext, queue: String, claim: NewClaim },
    GetClaim { ctx: OperationContext, queue: String, claim_id: String },
    UpdateClaim {
        ctx: OperationContext,
        queue: String,
        claim_id: String,
        ttl: u32,
        grace: Option<u32>,
    },
    DeleteClaim { ctx: OperationContext, queue: String, claim_id: String },

    // Pools
    CreatePool { ctx: OperationContext, pool: PoolRecord },
    GetPool { ctx: OperationContext, name: String, detailed: bool },
    UpdatePool { ctx: OperationContext, name: String, update: PoolUpdate },
    DeletePool { ctx: OperationContext, name: String },
    ListPools { ctx: OperationContext, marker: Option<String>, limit: usize, detailed: bool },
}

impl Operation {
    #[must_use]
    pub fn ctx(&self) -> &OperationContext {
        match self {
            Self::CreateQueue { ctx, .. }
            | Self::GetQueueMetadata { ctx, .. }
            | Self::SetQueueMetadata { ctx, .. }
            | Self::QueueExists { ctx, .. }
            | Self::DeleteQueue { ctx, .. }
            | Self::ListQueues { ctx, .. }
            | Self::QueueStats { ctx, .. }
            | Self::PostMessages { ctx, .. }
            | Self::ListMessages { ctx, .. }
            | Self::GetMessage { ctx, .. }
            | Self::BulkGetMessages { ctx, .. }
            | Self::DeleteMessage { ctx, .. }
            | Self::BulkDeleteMessages { ctx, .. }
            | Self::CreateClaim { ctx, .. }
            | Self::GetClaim { ctx, .. }
            | Self::UpdateClaim { ctx, .. }
            | Self::DeleteClaim { ctx, .. }
            | Self::CreatePool { ctx, .. }
            | Self::GetPool { ctx, .. }
            | Self::UpdatePool { ctx, .. }
            | Self::DeletePool { ctx, .. }
            | Self::ListPools { ctx, .. } => ctx,
        }
    }

    /// Domain service that handles this operation.
    #[must_use]
    pub fn service_name(&self) -> &'static str {
        match self {
            Self::CreateQueue { .. }
            | Self::GetQueueMetadata { .. }
            | Self::SetQueueMetadata { .. }
            | Self::QueueExists { .. }
            | Self::DeleteQueue { .. }
            | Self::ListQueues { .. }
            | Self::QueueStats { .. } => service_names::QUEUES,
            Self::PostMessages { .. }
            | Self::ListMessages { .. }
            | Self::GetMessage { .. }
            | Self::BulkGetMessages { .. }
            | Self::DeleteMessage { .. }
            | Self::BulkDeleteMessages { .. } => service_names::MESSAGES,
            Self::CreateClaim { .. }
            | Self::GetClaim { .. }
            | Self::UpdateClaim { .. }
            | Self::DeleteClaim { .. } => service_names::CLAIMS,
            Self::CreatePool { .. }
            | Self::GetPool { .. }
            | Self::UpdatePool { .. }
            | Self::DeletePool { .. }
            | Self::ListPools { .. } => service_names::POOLS,
        }
    }

    /// Stable dotted name, used for logs and metric labels.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateQueue { .. } => "queue.create",
            Self::GetQueueMetadata { .. } => "queue.get_metadata",
            Self::SetQueueMetadata { .. } => "queue.set_metadata",
            Self::QueueExists { .. } => "queue.exists",
            Self::DeleteQueue { .. } => "queue.delete",
            Self::ListQueues { .. } => "queue.list",
            Self::QueueStats { .. } => "queue.stats",
            Self::PostMessages { .. } => "message.post",
            Self::ListMessages { .. } => "message.list",
            Self::GetMessage { .. } => "message.get",
            Self::BulkGetMessages { .. } => "message.bulk_get",
            Self::DeleteMessage { .. } => "message.delete",
            Self::BulkDeleteMessages { .. } => "message.bulk_delete",
            Self::CreateClaim { .. } => "claim.create",
            Self::GetClaim { .. } => "claim.get",
            Self::UpdateClaim { .. } => "claim.update",
            Self::DeleteClaim { .. } => "claim.delete",
            Self::CreatePool { .. } => "pool.create",
            Self::GetPool { .. } => "pool.get",
            Self::UpdatePool { .. } => "pool.update",
            Self::DeletePool { .. } => "pool.delete",
            Self::ListPools { .. } => "pool.list",
        }
    }
}

/// Successful result of an operation.
#[derive(Debug)]
pub enum OperationResponse {
    Empty,
    /// `false` when the queue already existed.
    Created(bool),
    Exists(bool),
    Metadata(Metadata),
    Queues(Vec<QueueSummary>),
    Stats(QueueStats),
    Posted(Vec<String>),
    Page(MessagePage),
    Message(Box<Message>),
    Messages(Vec<Message>),
    Claimed(ClaimBatch),
    Claim(Box<ClaimDetails>),
    Pool(Box<PoolRecord>),
    Pools(Vec<PoolRecord>),
}

/// Errors returned through the service stack.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("unknown service: {name}")]
    UnknownService { name: String },
    #[error("operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("server overloaded, try again later")]
    Overloaded,
    #[error("pool management requires pooling to be enabled")]
    PoolingDisabled,
    #[error("wrong service for operation {operation}")]
    WrongService { operation: &'static str },
}

//! Typed storage failures shared by every driver, the catalog and the pipeline.

use std::fmt;

use thiserror::Error;

use crate::types::QueueId;

pub type StorageResult<T> = Result<T, StorageError>;

/// Coarse classification of a [`StorageError`], used by transports to pick
/// a status code and by callers to decide whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    DoesNotExist,
    AlreadyExists,
    PoolInUse,
    PoolUnreachable,
    NoPoolAvailable,
    NotPermitted,
    BadRequest,
    BackendUnavailable,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::DoesNotExist => "does_not_exist",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::PoolInUse => "pool_in_use",
            ErrorKind::PoolUnreachable => "pool_unreachable",
            ErrorKind::NoPoolAvailable => "no_pool_available",
            ErrorKind::NotPermitted => "not_permitted",
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::BackendUnavailable => "backend_unavailable",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("queue {0} does not exist")]
    QueueDoesNotExist(QueueId),

    #[error("message {message} does not exist in queue {queue}")]
    MessageDoesNotExist { queue: QueueId, message: String },

    #[error("claim {claim} does not exist in queue {queue}")]
    ClaimDoesNotExist { queue: QueueId, claim: String },

    #[error("pool {0} does not exist")]
    PoolDoesNotExist(String),

    #[error("pool {0} already exists")]
    PoolAlreadyExists(String),

    #[error("pool {0} is still assigned to at least one queue")]
    PoolInUse(String),

    #[error("cannot connect to {uri}")]
    PoolUnreachable { uri: String },

    #[error("no pool is available for queue {queue}")]
    NoPoolAvailable {
        queue: QueueId,
        flavor: Option<String>,
    },

    #[error("message {message} in queue {queue} is claimed; deleting it requires the claim id")]
    MessageIsClaimed { queue: QueueId, message: String },

    #[error("claim {claim} no longer holds message {message}")]
    ClaimNotHeld { message: String, claim: String },

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(#[from] anyhow::Error),
}

impl StorageError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::QueueDoesNotExist(_)
            | StorageError::MessageDoesNotExist { .. }
            | StorageError::ClaimDoesNotExist { .. }
            | StorageError::PoolDoesNotExist(_) => ErrorKind::DoesNotExist,
            StorageError::PoolAlreadyExists(_) => ErrorKind::AlreadyExists,
            StorageError::PoolInUse(_) => ErrorKind::PoolInUse,
            StorageError::PoolUnreachable { .. } => ErrorKind::PoolUnreachable,
            StorageError::NoPoolAvailable { .. } => ErrorKind::NoPoolAvailable,
            StorageError::MessageIsClaimed { .. } => ErrorKind::NotPermitted,
            StorageError::ClaimNotHeld { .. } | StorageError::BadRequest(_) => {
                ErrorKind::BadRequest
            }
            StorageError::BackendUnavailable(_) => ErrorKind::BackendUnavailable,
        }
    }

    pub fn bad_request(reason: impl Into<String>) -> Self {
        StorageError::BadRequest(reason.into())
    }

    /// Whether the same request may succeed if simply retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::BackendUnavailable | ErrorKind::PoolUnreachable
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_group_variants() {
        let queue = QueueId::new("p", "q");
        assert_eq!(
            StorageError::QueueDoesNotExist(queue.clone()).kind(),
            ErrorKind::DoesNotExist
        );
        assert_eq!(
            StorageError::ClaimDoesNotExist {
                queue: queue.clone(),
                claim: "c".into()
            }
            .kind(),
            ErrorKind::DoesNotExist
        );
        assert_eq!(
            StorageError::MessageIsClaimed {
                queue,
                message: "m".into()
            }
            .kind(),
            ErrorKind::NotPermitted
        );
        assert_eq!(
            StorageError::ClaimNotHeld {
                message: "m".into(),
                claim: "c".into()
            }
            .kind(),
            ErrorKind::BadRequest
        );
        assert_eq!(
            StorageError::PoolInUse("p1".into()).kind(),
            ErrorKind::PoolInUse
        );
    }

    #[test]
    fn backend_failures_are_distinct_and_retryable() {
        let err = StorageError::from(anyhow::anyhow!("connection reset"));
        assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
        assert!(err.is_retryable());
        assert!(err.to_string().contains("connection reset"));

        assert!(!StorageError::PoolDoesNotExist("p".into()).is_retryable());
    }

    #[test]
    fn kind_strings_are_snake_case() {
        assert_eq!(ErrorKind::NoPoolAvailable.to_string(), "no_pool_available");
        assert_eq!(ErrorKind::DoesNotExist.as_str(), "does_not_exist");
    }
}

//! Error taxonomy shared by the services.
//!
//! Three kinds matter to callers:
//! - [`ValidationError`]: bad input, never retried.
//! - [`InfraError`]: store/broker unavailability or timeout, retried only where
//!   a component defines a retry policy (emitter, consumer).
//! - Absence: represented as `None`/empty results, never as an error.

use std::future::Future;
use std::time::Duration;

use crate::interfaces::broker::BusError;
use crate::interfaces::document_store::StorageError;

/// Inclusive bounds for a normalized username.
pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 50;

/// Rejected input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Correlation id must not be blank")]
    BlankCorrelationId,

    #[error("Invalid page index and/or size: index={index}, size={size}")]
    InvalidPage { index: i64, size: i64 },

    #[error("Username must be between {min} and {max} characters: {username:?}")]
    InvalidUsername {
        username: String,
        min: usize,
        max: usize,
    },

    #[error("Post message must not be blank")]
    BlankMessage,

    #[error("Post id must not be blank")]
    BlankPostId,

    #[error("Specified value could not be parsed into a post status: {0:?}")]
    UnknownStatus(String),

    #[error("Unsupported sort key: {0:?}")]
    UnknownSortKey(String),

    #[error("Author {0:?} must exist and be an active author")]
    AuthorNotActive(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
}

/// Transient infrastructure failure.
#[derive(Debug, thiserror::Error)]
pub enum InfraError {
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Broker error: {0}")]
    Bus(#[from] BusError),
}

/// Errors returned by the request-path services.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Infra(#[from] InfraError),
}

impl ServiceError {
    /// Whether retrying the same call could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::Infra(_))
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Infra(InfraError::Storage(err))
    }
}

/// Run a store call under a deadline, mapping both elapsed time and storage
/// failures into [`InfraError`].
pub async fn with_deadline<T, F>(
    operation: &'static str,
    after: Duration,
    call: F,
) -> Result<T, InfraError>
where
    F: Future<Output = Result<T, StorageError>>,
{
    match tokio::time::timeout(after, call).await {
        Ok(result) => result.map_err(InfraError::from),
        Err(_) => Err(InfraError::Timeout { operation, after }),
    }
}

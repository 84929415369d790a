//! Errors surfaced synchronously by queue commands.
//!
//! Download failures never travel through this type: they are folded into the
//! job's `status`/`last_error` and classified by [`crate::retry::ErrorClass`].

use thiserror::Error;

use crate::queue_db::JobId;

#[derive(Debug, Error)]
pub enum QueueError {
    /// Malformed candidate, reorder set mismatch, and similar caller mistakes.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The command is not allowed in the job's current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("job {0} not found")]
    NotFound(JobId),

    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl QueueError {
    /// Stable machine-readable code used by the control protocol.
    pub fn code(&self) -> &'static str {
        match self {
            QueueError::InvalidArgument(_) => "invalid_argument",
            QueueError::InvalidState(_) => "invalid_state",
            QueueError::NotFound(_) => "not_found",
            QueueError::Storage(_) => "storage",
        }
    }
}

impl From<sqlx::Error> for QueueError {
    fn from(e: sqlx::Error) -> Self {
        QueueError::Storage(anyhow::Error::new(e))
    }
}

/// A stored name (job status, error class) that matches no known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized {kind} {value:?}")]
pub struct UnknownName {
    pub kind: &'static str,
    pub value: String,
}

pub type QueueResult<T> = std::result::Result<T, QueueError>;

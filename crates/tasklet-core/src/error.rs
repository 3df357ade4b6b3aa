use thiserror::Error;

use crate::task::TaskId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("task content is empty")]
    EmptyContent,

    #[error("task '{0}' not found")]
    NotFound(TaskId),
}

/// Persistence failures. Every variant is recoverable: the in-memory store
/// stays authoritative and the write is retried later.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("failed reading '{location}': {message}")]
    Read { location: String, message: String },

    #[error("failed writing '{location}': {message}")]
    Write { location: String, message: String },

    #[error("failed serializing snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}

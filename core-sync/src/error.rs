use bridge_traits::error::BridgeError;
use core_storage::StorageError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Sync task {task_id} not found")]
    TaskNotFound { task_id: String },

    #[error("Invalid task status: {0}")]
    InvalidStatus(String),

    #[error("Invalid task type: {0}")]
    InvalidTaskType(String),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },

    #[error("Local blob missing for key {key}")]
    BlobMissing { key: String },

    #[error("Upload failed: {0}")]
    Upload(#[from] BridgeError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Database error: {0}")]
    Database(String),
}

impl SyncError {
    pub(crate) fn invalid_input(field: &str, message: impl Into<String>) -> Self {
        SyncError::InvalidInput {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Whether another attempt could plausibly succeed.
    ///
    /// Only used to annotate failures; the orchestrator charges every failed
    /// attempt against the same retry budget.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Upload(err) => err.is_retryable(),
            SyncError::InvalidInput { .. }
            | SyncError::InvalidStatus(_)
            | SyncError::InvalidTaskType(_)
            | SyncError::InvalidStateTransition { .. } => false,
            _ => true,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The caller tried to write outside the namespace it owns.
    #[error("Not authorized to write to {path}")]
    Unauthorized { path: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Network failure or timeout before a response arrived.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unexpected HTTP status {status}: {message}")]
    UnexpectedStatus { status: u16, message: String },

    #[error("Local blob missing: {key}")]
    BlobMissing { key: String },
}

impl BridgeError {
    /// Whether repeating the same call could plausibly succeed.
    ///
    /// Authorization and argument errors are deterministic; everything else
    /// may be transient.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            BridgeError::Unauthorized { .. } | BridgeError::InvalidArgument(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

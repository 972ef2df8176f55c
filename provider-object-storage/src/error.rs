//! Error types for the object storage provider

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Object storage provider errors
#[derive(Error, Debug)]
pub enum ObjectStorageError {
    /// Path is outside the caller's namespace
    #[error("Not authorized to write to {path}")]
    Unauthorized { path: String },

    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    /// Server answered with a status the protocol does not expect
    #[error("Object storage API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    /// Upload session was opened but no `Location` header came back
    #[error("Upload session response carried no Location header")]
    MissingSessionUrl,

    #[error("Failed to encode request: {0}")]
    Encode(String),

    /// Bridge error
    #[error(transparent)]
    BridgeError(#[from] BridgeError),
}

/// Result type for object storage operations
pub type Result<T> = std::result::Result<T, ObjectStorageError>;

impl From<ObjectStorageError> for BridgeError {
    fn from(error: ObjectStorageError) -> Self {
        match error {
            ObjectStorageError::Unauthorized { path } => BridgeError::Unauthorized { path },
            ObjectStorageError::UnsupportedContentType(content_type) => {
                BridgeError::InvalidArgument(format!("unsupported content type: {content_type}"))
            }
            ObjectStorageError::ApiError {
                status_code,
                message,
            } => BridgeError::UnexpectedStatus {
                status: status_code,
                message,
            },
            ObjectStorageError::MissingSessionUrl => BridgeError::UnexpectedStatus {
                status: 200,
                message: "missing Location header".to_string(),
            },
            ObjectStorageError::Encode(msg) => BridgeError::OperationFailed(msg),
            ObjectStorageError::BridgeError(e) => e,
        }
    }
}

/// Short excerpt of a response body for error messages.
pub(crate) fn body_excerpt(body: &[u8]) -> String {
    const MAX: usize = 200;
    let text = String::from_utf8_lossy(body);
    match text.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.into_owned(),
    }
}

//! Remote Object Upload Abstraction
//!
//! Two-step contract: obtain a target for a path, then stream the blob into
//! it in fixed-size chunks. A failed transfer is never resumed; the caller
//! requests a fresh target and starts again from byte 0.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Opaque handle to a server-side upload session.
#[derive(Clone, PartialEq, Eq)]
pub struct UploadHandle {
    /// Session URI chunks are written to. Carries credentials on most
    /// backends, so it is left out of `Debug`.
    pub session_url: String,
    pub remote_path: String,
    pub content_type: String,
}

impl std::fmt::Debug for UploadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadHandle")
            .field("session_url", &"<redacted>")
            .field("remote_path", &self.remote_path)
            .field("content_type", &self.content_type)
            .finish()
    }
}

/// Receives whole-number percent complete after each chunk.
pub type ProgressFn<'a> = &'a (dyn Fn(u8) + Send + Sync);

/// Chunked resumable uploader.
#[async_trait]
pub trait ObjectUploader: Send + Sync {
    /// Open an upload session for `path`.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::Unauthorized`](crate::BridgeError::Unauthorized) when
    ///   `path` is outside `caller_id`'s namespace
    /// - [`BridgeError::InvalidArgument`](crate::BridgeError::InvalidArgument)
    ///   when `content_type` is not an accepted video type
    async fn request_upload_target(
        &self,
        caller_id: &str,
        path: &str,
        content_type: &str,
    ) -> Result<UploadHandle>;

    /// Send `blob` sequentially in chunks and return the final remote path.
    ///
    /// `on_progress` sees non-decreasing values and receives 100 only once
    /// the last chunk is acknowledged.
    async fn upload_chunked(
        &self,
        handle: &UploadHandle,
        blob: Bytes,
        on_progress: ProgressFn<'_>,
    ) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_hides_session_url() {
        let handle = UploadHandle {
            session_url: "https://storage/upload?upload_id=secret".into(),
            remote_path: "trainers/t1/sessions/s1/recording.webm".into(),
            content_type: "video/webm".into(),
        };

        let rendered = format!("{handle:?}");
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("recording.webm"));
    }
}

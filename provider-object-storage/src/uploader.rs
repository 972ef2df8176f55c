//! Resumable chunked uploader
//!
//! Implements [`ObjectUploader`] over a GCS-style resumable upload protocol:
//!
//! 1. `POST {endpoint}/upload?name={path}` with `X-Goog-Resumable: start`
//!    opens a session; its URI comes back in `Location`.
//! 2. Each chunk is `PUT` to that URI with
//!    `Content-Range: bytes {first}-{last}/{total}`. The server answers
//!    `308` while it expects more and `200`/`201` once the object is complete.

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bridge_traits::upload::{ObjectUploader, ProgressFn, UploadHandle};
use bytes::Bytes;
use core_runtime::config::{
    is_allowed_content_type, DEFAULT_ALLOWED_CONTENT_TYPES, DEFAULT_CHUNK_SIZE_BYTES,
    DEFAULT_REQUEST_TIMEOUT,
};
use core_runtime::SyncConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::error::{body_excerpt, ObjectStorageError, Result};

/// Resumable upload client
///
/// # Example
///
/// ```ignore
/// use provider_object_storage::ResumableUploader;
/// use bridge_traits::upload::ObjectUploader;
///
/// let uploader = ResumableUploader::new(http_client, "https://storage.example.com");
/// let handle = uploader
///     .request_upload_target("t1", "trainers/t1/sessions/s1/recording.webm", "video/webm")
///     .await?;
/// let path = uploader.upload_chunked(&handle, blob, &|p| println!("{p}%")).await?;
/// ```
pub struct ResumableUploader {
    http_client: Arc<dyn HttpClient>,
    endpoint: String,
    chunk_size: usize,
    request_timeout: Duration,
    allowed_content_types: Vec<String>,
}

impl ResumableUploader {
    pub fn new(http_client: Arc<dyn HttpClient>, endpoint: impl Into<String>) -> Self {
        Self {
            http_client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE_BYTES,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            allowed_content_types: DEFAULT_ALLOWED_CONTENT_TYPES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    /// Uploader for `endpoint` using the chunk size, timeout and allow-list of `config`.
    pub fn from_config(
        http_client: Arc<dyn HttpClient>,
        endpoint: impl Into<String>,
        config: &SyncConfig,
    ) -> Self {
        Self::new(http_client, endpoint)
            .with_chunk_size(config.chunk_size_bytes)
            .with_request_timeout(config.request_timeout)
            .with_allowed_content_types(config.allowed_content_types.clone())
    }

    /// Zero is treated as one byte.
    pub fn with_chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes.max(1);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_allowed_content_types(mut self, types: Vec<String>) -> Self {
        self.allowed_content_types = types;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn accepts(&self, content_type: &str) -> bool {
        is_allowed_content_type(&self.allowed_content_types, content_type)
    }

    async fn open_session(
        &self,
        caller_id: &str,
        path: &str,
        content_type: &str,
    ) -> Result<UploadHandle> {
        let namespace = format!("trainers/{caller_id}/");
        if caller_id.is_empty() || !path.starts_with(&namespace) || path.contains("/../") {
            return Err(ObjectStorageError::Unauthorized {
                path: path.to_string(),
            });
        }
        if !self.accepts(content_type) {
            return Err(ObjectStorageError::UnsupportedContentType(
                content_type.to_string(),
            ));
        }

        let url = format!(
            "{}/upload?uploadType=resumable&name={}",
            self.endpoint,
            urlencoding::encode(path)
        );
        let request = HttpRequest::new(HttpMethod::Post, url)
            .header("X-Goog-Resumable", "start")
            .header("X-Upload-Content-Type", content_type)
            .timeout(self.request_timeout);

        let response = self.http_client.execute(request).await?;
        if !response.is_success() {
            return Err(api_error(&response));
        }

        let session_url = response
            .header("Location")
            .filter(|location| !location.is_empty())
            .ok_or(ObjectStorageError::MissingSessionUrl)?;

        debug!(remote_path = path, "Opened resumable upload session");

        Ok(UploadHandle {
            session_url: session_url.to_string(),
            remote_path: path.to_string(),
            content_type: content_type.to_string(),
        })
    }

    async fn send_chunks(
        &self,
        handle: &UploadHandle,
        blob: Bytes,
        on_progress: ProgressFn<'_>,
    ) -> Result<String> {
        let total = blob.len();

        if total == 0 {
            let response = self.put_chunk(handle, Bytes::new(), "bytes */0").await?;
            if !response.is_success() {
                return Err(api_error(&response));
            }
            on_progress(100);
            return Ok(handle.remote_path.clone());
        }

        let mut start = 0usize;
        while start < total {
            let end = (start + self.chunk_size).min(total);
            let content_range = format!("bytes {}-{}/{}", start, end - 1, total);
            let response = self
                .put_chunk(handle, blob.slice(start..end), &content_range)
                .await?;
            let last = end == total;

            if response.is_resume_incomplete() && !last {
                let percent = progress_percent(end, total, false);
                debug!(
                    remote_path = %handle.remote_path,
                    sent = end,
                    total,
                    percent,
                    "Chunk accepted"
                );
                on_progress(percent);
            } else if response.is_success() && last {
                on_progress(100);
                info!(remote_path = %handle.remote_path, total, "Upload complete");
                return Ok(handle.remote_path.clone());
            } else {
                return Err(api_error(&response));
            }

            start = end;
        }

        Err(ObjectStorageError::ApiError {
            status_code: 308,
            message: "server did not finalize the upload".to_string(),
        })
    }

    async fn put_chunk(
        &self,
        handle: &UploadHandle,
        chunk: Bytes,
        content_range: &str,
    ) -> Result<HttpResponse> {
        let request = HttpRequest::new(HttpMethod::Put, handle.session_url.clone())
            .header("Content-Range", content_range)
            .body(chunk)
            .timeout(self.request_timeout);

        Ok(self.http_client.execute(request).await?)
    }
}

/// Whole-number progress after `sent` of `total` bytes.
///
/// Rounds to nearest; anything short of the final chunk is capped at 99 so
/// 100 always means "acknowledged".
pub fn progress_percent(sent: usize, total: usize, last: bool) -> u8 {
    if last || total == 0 {
        return 100;
    }
    let sent = sent as u128;
    let total = total as u128;
    let rounded = (sent * 200 + total) / (total * 2);
    rounded.min(99) as u8
}

fn api_error(response: &HttpResponse) -> ObjectStorageError {
    ObjectStorageError::ApiError {
        status_code: response.status,
        message: body_excerpt(&response.body),
    }
}

#[async_trait]
impl ObjectUploader for ResumableUploader {
    #[instrument(skip(self), fields(caller_id = %caller_id))]
    async fn request_upload_target(
        &self,
        caller_id: &str,
        path: &str,
        content_type: &str,
    ) -> BridgeResult<UploadHandle> {
        Ok(self.open_session(caller_id, path, content_type).await?)
    }

    #[instrument(skip(self, blob, on_progress), fields(remote_path = %handle.remote_path, size = blob.len()))]
    async fn upload_chunked(
        &self,
        handle: &UploadHandle,
        blob: Bytes,
        on_progress: ProgressFn<'_>,
    ) -> BridgeResult<String> {
        Ok(self.send_chunks(handle, blob, on_progress).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::BridgeError;
    use bridge_traits::network::{NetworkInfo, NetworkMonitor, NetworkType};
    use mockall::mock;
    use std::collections::HashMap;
    use std::sync::Mutex;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        }
    }

    const MIB: usize = 1024 * 1024;
    const PATH: &str = "trainers/t1/sessions/s1/recording.webm";

    fn response(status: u16) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::new(),
        }
    }

    fn handle() -> UploadHandle {
        UploadHandle {
            session_url: "https://storage.example.com/session/abc".to_string(),
            remote_path: PATH.to_string(),
            content_type: "video/webm".to_string(),
        }
    }

    fn uploader(mock_http: MockHttpClient) -> ResumableUploader {
        ResumableUploader::new(Arc::new(mock_http), "https://storage.example.com/")
    }

    #[test]
    fn test_progress_percent() {
        let total = 12 * MIB;
        assert_eq!(progress_percent(5 * MIB, total, false), 42);
        assert_eq!(progress_percent(10 * MIB, total, false), 83);
        assert_eq!(progress_percent(total, total, true), 100);
        // 99.9% is still not done
        assert_eq!(progress_percent(999, 1000, false), 99);
    }

    #[tokio::test]
    async fn test_request_upload_target_success() {
        let mut mock_http = MockHttpClient::new();

        mock_http.expect_execute().times(1).returning(|req| {
            assert_eq!(req.method, HttpMethod::Post);
            assert_eq!(
                req.url,
                "https://storage.example.com/upload?uploadType=resumable&name=trainers%2Ft1%2Fsessions%2Fs1%2Frecording.webm"
            );
            assert_eq!(req.header_value("X-Goog-Resumable"), Some("start"));
            assert_eq!(req.header_value("X-Upload-Content-Type"), Some("video/webm"));
            assert_eq!(req.timeout, Some(DEFAULT_REQUEST_TIMEOUT));

            let mut resp = response(200);
            resp.headers.insert(
                "location".to_string(),
                "https://storage.example.com/session/abc".to_string(),
            );
            Ok(resp)
        });

        let handle = uploader(mock_http)
            .request_upload_target("t1", PATH, "video/webm")
            .await
            .unwrap();

        assert_eq!(handle, self::handle());
    }

    #[tokio::test]
    async fn test_request_upload_target_rejects_foreign_namespace() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(0);

        let result = uploader(mock_http)
            .request_upload_target("t2", PATH, "video/webm")
            .await;

        assert!(matches!(result, Err(BridgeError::Unauthorized { path }) if path == PATH));
    }

    #[tokio::test]
    async fn test_request_upload_target_rejects_unknown_content_type() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(0);

        let result = uploader(mock_http)
            .request_upload_target("t1", PATH, "video/x-msvideo")
            .await;

        assert!(matches!(result, Err(BridgeError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_request_upload_target_without_location() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| Ok(response(200)));

        let result = uploader(mock_http)
            .request_upload_target("t1", PATH, "video/webm")
            .await;

        assert!(matches!(result, Err(BridgeError::UnexpectedStatus { .. })));
    }

    #[tokio::test]
    async fn test_request_upload_target_server_error() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(1).returning(|_| {
            Ok(HttpResponse {
                status: 503,
                headers: HashMap::new(),
                body: Bytes::from_static(b"backend unavailable"),
            })
        });

        let result = uploader(mock_http)
            .request_upload_target("t1", PATH, "video/webm")
            .await;

        match result {
            Err(BridgeError::UnexpectedStatus { status, message }) => {
                assert_eq!(status, 503);
                assert_eq!(message, "backend unavailable");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_upload_chunked_sends_content_ranges() {
        let ranges = Arc::new(Mutex::new(Vec::new()));
        let seen = ranges.clone();

        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(3).returning(move |req| {
            assert_eq!(req.method, HttpMethod::Put);
            assert_eq!(req.url, "https://storage.example.com/session/abc");
            let range = req.header_value("Content-Range").unwrap().to_string();
            let len = req.body.as_ref().map(|b| b.len()).unwrap_or(0);
            let mut seen = seen.lock().unwrap();
            seen.push((range, len));
            Ok(response(if seen.len() < 3 { 308 } else { 200 }))
        });

        let progress = Mutex::new(Vec::new());
        let remote_path = uploader(mock_http)
            .upload_chunked(&handle(), Bytes::from(vec![7u8; 12 * MIB]), &|p| {
                progress.lock().unwrap().push(p)
            })
            .await
            .unwrap();

        assert_eq!(remote_path, PATH);
        assert_eq!(*progress.lock().unwrap(), vec![42, 83, 100]);
        assert_eq!(
            *ranges.lock().unwrap(),
            vec![
                ("bytes 0-5242879/12582912".to_string(), 5 * MIB),
                ("bytes 5242880-10485759/12582912".to_string(), 5 * MIB),
                ("bytes 10485760-12582911/12582912".to_string(), 2 * MIB),
            ]
        );
    }

    #[tokio::test]
    async fn test_upload_chunked_single_chunk() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(1).returning(|req| {
            assert_eq!(req.header_value("Content-Range"), Some("bytes 0-1023/1024"));
            Ok(response(201))
        });

        let progress = Mutex::new(Vec::new());
        uploader(mock_http)
            .upload_chunked(&handle(), Bytes::from(vec![1u8; 1024]), &|p| {
                progress.lock().unwrap().push(p)
            })
            .await
            .unwrap();

        assert_eq!(*progress.lock().unwrap(), vec![100]);
    }

    #[tokio::test]
    async fn test_upload_chunked_empty_blob() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(1).returning(|req| {
            assert_eq!(req.header_value("Content-Range"), Some("bytes */0"));
            Ok(response(200))
        });

        let result = uploader(mock_http)
            .upload_chunked(&handle(), Bytes::new(), &|_| {})
            .await;

        assert_eq!(result.unwrap(), PATH);
    }

    #[tokio::test]
    async fn test_upload_chunked_stops_on_unexpected_status() {
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();

        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(2).returning(move |_| {
            let mut calls = counter.lock().unwrap();
            *calls += 1;
            Ok(response(if *calls == 1 { 308 } else { 500 }))
        });

        let progress = Mutex::new(Vec::new());
        let result = uploader(mock_http)
            .upload_chunked(&handle(), Bytes::from(vec![0u8; 12 * MIB]), &|p| {
                progress.lock().unwrap().push(p)
            })
            .await;

        assert!(matches!(
            result,
            Err(BridgeError::UnexpectedStatus { status: 500, .. })
        ));
        assert_eq!(*progress.lock().unwrap(), vec![42]);
        assert_eq!(*calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_upload_chunked_propagates_transport_errors() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| Err(BridgeError::Transport("request timed out".to_string())));

        let result = uploader(mock_http)
            .with_request_timeout(Duration::from_secs(5))
            .upload_chunked(&handle(), Bytes::from(vec![0u8; 10]), &|_| {})
            .await;

        assert!(matches!(result, Err(BridgeError::Transport(_))));
    }

    #[tokio::test]
    async fn test_premature_completion_is_rejected() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| Ok(response(200)));

        let result = uploader(mock_http)
            .upload_chunked(&handle(), Bytes::from(vec![0u8; 6 * MIB]), &|_| {})
            .await;

        assert!(matches!(
            result,
            Err(BridgeError::UnexpectedStatus { status: 200, .. })
        ));
    }

    #[test]
    fn test_from_config_applies_settings() {
        let config = SyncConfig::builder()
            .database_path(":memory:")
            .chunk_size_bytes(512 * 1024)
            .request_timeout(Duration::from_secs(15))
            .allowed_content_types(["video/mp4"])
            .network_monitor(Arc::new(AlwaysOnline))
            .build()
            .unwrap();

        let uploader =
            ResumableUploader::from_config(Arc::new(MockHttpClient::new()), "https://s", &config);

        assert_eq!(uploader.chunk_size(), 512 * 1024);
        assert_eq!(uploader.request_timeout, Duration::from_secs(15));
        assert!(uploader.accepts("video/mp4; codecs=avc1"));
        assert!(!uploader.accepts("video/webm"));
    }

    struct AlwaysOnline;

    #[async_trait]
    impl NetworkMonitor for AlwaysOnline {
        async fn get_network_info(&self) -> BridgeResult<NetworkInfo> {
            Ok(NetworkInfo::connected(NetworkType::WiFi))
        }
    }
}

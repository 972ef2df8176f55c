//! REST binding for session metadata writes

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
use bridge_traits::metadata::{SessionFieldsPatch, SessionMetadataRepository};
use core_runtime::config::DEFAULT_REQUEST_TIMEOUT;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::error::{body_excerpt, ObjectStorageError, Result};

/// Writes session sync fields with `PATCH {endpoint}/sessions/{id}`.
pub struct RestSessionMetadataRepository {
    http_client: Arc<dyn HttpClient>,
    endpoint: String,
    request_timeout: Duration,
}

impl RestSessionMetadataRepository {
    pub fn new(http_client: Arc<dyn HttpClient>, endpoint: impl Into<String>) -> Self {
        Self {
            http_client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    async fn patch(&self, session_id: &str, patch: &SessionFieldsPatch) -> Result<()> {
        let url = format!(
            "{}/sessions/{}",
            self.endpoint,
            urlencoding::encode(session_id)
        );
        let request = HttpRequest::new(HttpMethod::Patch, url)
            .json(patch)
            .map_err(|e| ObjectStorageError::Encode(e.to_string()))?
            .timeout(self.request_timeout);

        let response = self.http_client.execute(request).await?;
        if !response.is_success() {
            return Err(ObjectStorageError::ApiError {
                status_code: response.status,
                message: body_excerpt(&response.body),
            });
        }

        debug!(session_id, status = ?patch.sync_status, "Session fields patched");
        Ok(())
    }
}

#[async_trait]
impl SessionMetadataRepository for RestSessionMetadataRepository {
    #[instrument(skip(self, patch), fields(session_id = %session_id))]
    async fn update_session_fields(
        &self,
        session_id: &str,
        patch: SessionFieldsPatch,
    ) -> BridgeResult<()> {
        Ok(self.patch(session_id, &patch).await?)
    }
}

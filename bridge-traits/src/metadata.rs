//! Session Metadata Abstraction
//!
//! The remote session record is owned elsewhere. The sync core only projects
//! its progress into three fields so other readers never poll the queue.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{BridgeError, Result};

/// Sync state of a session as seen by UI and dashboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionSyncStatus {
    /// Captured, not yet uploaded.
    Local,
    Uploading,
    Synced,
    /// Retries exhausted; needs an explicit re-enqueue.
    Failed,
}

impl SessionSyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionSyncStatus::Local => "local",
            SessionSyncStatus::Uploading => "uploading",
            SessionSyncStatus::Synced => "synced",
            SessionSyncStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionSyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionSyncStatus {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "local" => Ok(SessionSyncStatus::Local),
            "uploading" => Ok(SessionSyncStatus::Uploading),
            "synced" => Ok(SessionSyncStatus::Synced),
            "failed" => Ok(SessionSyncStatus::Failed),
            other => Err(BridgeError::InvalidArgument(format!(
                "unknown sync status: {other}"
            ))),
        }
    }
}

/// Partial session record. Unset fields are left untouched remotely.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionFieldsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_status: Option<SessionSyncStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl SessionFieldsPatch {
    pub fn status(status: SessionSyncStatus) -> Self {
        Self {
            sync_status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_remote_path(mut self, remote_path: impl Into<String>) -> Self {
        self.remote_path = Some(remote_path.into());
        self
    }

    pub fn with_updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.updated_at = Some(updated_at);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sync_status.is_none() && self.remote_path.is_none() && self.updated_at.is_none()
    }
}

/// Remote document store holding session records.
///
/// Callers treat writes as best-effort: a failure is logged by the caller
/// and never rolls back local queue state.
#[async_trait]
pub trait SessionMetadataRepository: Send + Sync {
    async fn update_session_fields(&self, session_id: &str, patch: SessionFieldsPatch)
        -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_serializes_only_set_fields() {
        let patch = SessionFieldsPatch::status(SessionSyncStatus::Synced)
            .with_remote_path("trainers/t1/sessions/s1/recording.webm");

        let json = serde_json::to_value(&patch).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "syncStatus": "synced",
                "remotePath": "trainers/t1/sessions/s1/recording.webm"
            })
        );
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            SessionSyncStatus::Local,
            SessionSyncStatus::Uploading,
            SessionSyncStatus::Synced,
            SessionSyncStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<SessionSyncStatus>().unwrap(), status);
        }
        assert!("done".parse::<SessionSyncStatus>().is_err());
    }

    #[test]
    fn empty_patch_is_detected() {
        assert!(SessionFieldsPatch::default().is_empty());
        assert!(!SessionFieldsPatch::status(SessionSyncStatus::Failed).is_empty());
    }
}

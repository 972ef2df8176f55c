//! # Sync Task State Machine
//!
//! One [`SyncTask`] tracks the upload of one session's video.
//!
//! ## State Machine
//!
//! ```text
//! Pending ──start──▶ InProgress ──success──▶ (deleted)
//!    ▲                   │
//!    └──retry budget left┤
//!                        └──budget spent──▶ Failed
//! ```
//!
//! A successful upload removes the task from the queue, so there is no
//! persisted success state. Every failure from `InProgress` increments
//! `retry_count` before the task goes back to `Pending` or on to `Failed`.

use crate::{Result, SyncError};
use chrono::{DateTime, TimeDelta, Utc};
use core_runtime::config::content_type_essence;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// ID Types
// ============================================================================

/// Task identifier, derived from the session id so a session can own at
/// most one task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncTaskId(String);

impl SyncTaskId {
    const PREFIX: &'static str = "sync-";

    pub fn from_session(session_id: &str) -> Self {
        Self(format!("{}{}", Self::PREFIX, session_id))
    }

    /// Parse a stored task id.
    ///
    /// # Errors
    ///
    /// Returns an error if `s` does not name a session.
    pub fn from_string(s: &str) -> Result<Self> {
        match s.strip_prefix(Self::PREFIX) {
            Some(session) if !session.is_empty() => Ok(Self(s.to_string())),
            _ => Err(SyncError::invalid_input("id", format!("not a task id: '{s}'"))),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SyncTaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Status Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    /// Retry budget spent. Only a fresh enqueue revives the session.
    Failed,
}

impl TaskStatus {
    /// Get the string representation for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Failed)
    }
}

impl FromStr for TaskStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "in_progress" => Ok(TaskStatus::InProgress),
            "failed" => Ok(TaskStatus::Failed),
            _ => Err(SyncError::InvalidStatus(s.to_string())),
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    VideoUpload,
    /// Reserved; the orchestrator only schedules video uploads.
    MetadataSync,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::VideoUpload => "video_upload",
            TaskType::MetadataSync => "metadata_sync",
        }
    }
}

impl FromStr for TaskType {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "video_upload" => Ok(TaskType::VideoUpload),
            "metadata_sync" => Ok(TaskType::MetadataSync),
            _ => Err(SyncError::InvalidTaskType(s.to_string())),
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Remote Paths
// ============================================================================

/// File extension for an accepted video content type.
pub fn extension_for_content_type(content_type: &str) -> Option<&'static str> {
    let essence = content_type_essence(content_type).to_ascii_lowercase();

    match essence.as_str() {
        "video/webm" => Some("webm"),
        "video/mp4" => Some("mp4"),
        "video/quicktime" => Some("mov"),
        _ => None,
    }
}

/// `trainers/{trainer_id}/sessions/{session_id}/recording.{extension}`
pub fn remote_path_for(trainer_id: &str, session_id: &str, extension: &str) -> String {
    format!("trainers/{trainer_id}/sessions/{session_id}/recording.{extension}")
}

fn validate_segment(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(SyncError::invalid_input(field, "must not be empty"));
    }
    if value.contains(&['/', '\\'][..]) || value == "." || value == ".." {
        return Err(SyncError::invalid_input(
            field,
            format!("'{value}' is not a single path segment"),
        ));
    }
    Ok(())
}

// ============================================================================
// Sync Task Entity
// ============================================================================

/// What the orchestrator should do after an attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Back to pending; not eligible before `next_attempt_at`.
    RetryScheduled { next_attempt_at: Option<DateTime<Utc>> },
    /// Retry budget spent; the task is now `Failed`.
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTask {
    pub id: SyncTaskId,
    pub session_id: String,
    pub task_type: TaskType,
    pub status: TaskStatus,
    /// Failed attempts so far
    pub retry_count: u32,
    pub last_attempt: Option<DateTime<Utc>>,
    /// Earliest time the next attempt may start. `None` means immediately.
    pub next_eligible_at: Option<DateTime<Utc>>,
    pub remote_path: String,
    /// Local blob store key of the video
    pub blob_key: String,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SyncTask {
    /// Create a fresh pending video upload for `session_id`.
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidInput`] for empty ids, ids that are not a single
    /// path segment, or an unsupported content type.
    pub fn new_video_upload(
        trainer_id: &str,
        session_id: &str,
        blob_key: &str,
        content_type: &str,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        validate_segment("trainer_id", trainer_id)?;
        validate_segment("session_id", session_id)?;
        if blob_key.trim().is_empty() {
            return Err(SyncError::invalid_input("blob_key", "must not be empty"));
        }

        let extension = extension_for_content_type(content_type).ok_or_else(|| {
            SyncError::invalid_input(
                "content_type",
                format!("'{content_type}' is not a supported video type"),
            )
        })?;

        Ok(Self {
            id: SyncTaskId::from_session(session_id),
            session_id: session_id.to_string(),
            task_type: TaskType::VideoUpload,
            status: TaskStatus::Pending,
            retry_count: 0,
            last_attempt: None,
            next_eligible_at: None,
            remote_path: remote_path_for(trainer_id, session_id, extension),
            blob_key: blob_key.to_string(),
            content_type: content_type.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Whether a drain pass at `now` should pick this task up.
    pub fn is_eligible(&self, now: DateTime<Utc>, max_retries: u32) -> bool {
        self.status == TaskStatus::Pending
            && self.retry_count < max_retries
            && self.next_eligible_at.map_or(true, |at| at <= now)
    }

    /// Attempt number the next `start` will begin (1-based).
    pub fn attempt_number(&self) -> u32 {
        self.retry_count + 1
    }

    /// `Pending -> InProgress`, stamping `last_attempt`.
    ///
    /// # Errors
    ///
    /// Returns an error unless the task is pending.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.validate_transition(TaskStatus::InProgress)?;
        self.status = TaskStatus::InProgress;
        self.last_attempt = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Record a failed attempt.
    ///
    /// Increments `retry_count`, then either schedules the next attempt
    /// `backoff(retry_count)` from `now` or marks the task `Failed` once
    /// `retry_count` reaches `max_retries`.
    ///
    /// # Errors
    ///
    /// Returns an error unless the task is in progress.
    pub fn record_failure<F>(
        &mut self,
        now: DateTime<Utc>,
        max_retries: u32,
        backoff: F,
    ) -> Result<FailureOutcome>
    where
        F: Fn(u32) -> Duration,
    {
        if self.status != TaskStatus::InProgress {
            return Err(SyncError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: "record_failure".to_string(),
                reason: "Only an in-progress attempt can fail".to_string(),
            });
        }

        self.retry_count += 1;
        self.updated_at = now;

        if self.retry_count >= max_retries {
            self.status = TaskStatus::Failed;
            self.next_eligible_at = None;
            return Ok(FailureOutcome::Exhausted);
        }

        let delay = backoff(self.retry_count);
        self.status = TaskStatus::Pending;
        self.next_eligible_at = if delay.is_zero() {
            None
        } else {
            TimeDelta::from_std(delay)
                .ok()
                .and_then(|delta| now.checked_add_signed(delta))
        };

        Ok(FailureOutcome::RetryScheduled {
            next_attempt_at: self.next_eligible_at,
        })
    }

    /// Put a task interrupted mid-attempt back to pending.
    ///
    /// The interrupted attempt is not charged against the retry budget.
    /// Returns `false` if the task was not in progress.
    pub fn reset_interrupted(&mut self, now: DateTime<Utc>) -> bool {
        if self.status != TaskStatus::InProgress {
            return false;
        }
        self.status = TaskStatus::Pending;
        self.next_eligible_at = None;
        self.updated_at = now;
        true
    }

    fn validate_transition(&self, target: TaskStatus) -> Result<()> {
        let valid = matches!(
            (self.status, target),
            (TaskStatus::Pending, TaskStatus::InProgress)
                | (TaskStatus::InProgress, TaskStatus::Pending)
                | (TaskStatus::InProgress, TaskStatus::Failed)
        );

        if valid {
            Ok(())
        } else {
            Err(SyncError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: target.as_str().to_string(),
                reason: "Transition not allowed".to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
    }

    fn task() -> SyncTask {
        SyncTask::new_video_upload("t1", "sess-1", "sess-1", "video/webm", t0()).unwrap()
    }

    fn doubling(n: u32) -> Duration {
        Duration::from_secs(2u64.pow(n))
    }

    #[test]
    fn test_task_id_is_derived_from_session() {
        let id = SyncTaskId::from_session("sess-1");
        assert_eq!(id.as_str(), "sync-sess-1");
        assert_eq!(SyncTaskId::from_string("sync-sess-1").unwrap(), id);
        assert!(SyncTaskId::from_string("sess-1").is_err());
        assert!(SyncTaskId::from_string("sync-").is_err());
    }

    #[test]
    fn test_status_round_trip() {
        for status in [TaskStatus::Pending, TaskStatus::InProgress, TaskStatus::Failed] {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
        assert!("synced".parse::<TaskStatus>().is_err());
        assert!("video_upload".parse::<TaskType>().is_ok());
        assert!("thumbnail".parse::<TaskType>().is_err());
    }

    #[test]
    fn test_new_task_builds_remote_path() {
        let task = task();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.retry_count, 0);
        assert_eq!(task.remote_path, "trainers/t1/sessions/sess-1/recording.webm");
        assert!(task.last_attempt.is_none());
    }

    #[test]
    fn test_extension_mapping() {
        assert_eq!(extension_for_content_type("video/webm"), Some("webm"));
        assert_eq!(extension_for_content_type("video/mp4"), Some("mp4"));
        assert_eq!(extension_for_content_type("video/quicktime"), Some("mov"));
        assert_eq!(
            extension_for_content_type("video/webm;codecs=vp9"),
            Some("webm")
        );
        assert_eq!(extension_for_content_type("video/x-msvideo"), None);
    }

    #[test]
    fn test_rejects_bad_input() {
        let bad_type = SyncTask::new_video_upload("t1", "s", "s", "image/png", t0());
        assert!(matches!(bad_type, Err(SyncError::InvalidInput { ref field, .. }) if field == "content_type"));

        let traversal = SyncTask::new_video_upload("../t2", "s", "s", "video/mp4", t0());
        assert!(traversal.is_err());

        let empty = SyncTask::new_video_upload("t1", "", "s", "video/mp4", t0());
        assert!(empty.is_err());
    }

    #[test]
    fn test_start_requires_pending() {
        let mut task = task();
        task.start(t0()).unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.last_attempt, Some(t0()));

        assert!(task.start(t0()).is_err());
    }

    #[test]
    fn test_failure_schedules_backoff() {
        let mut task = task();
        task.start(t0()).unwrap();

        let outcome = task.record_failure(t0(), 5, doubling).unwrap();

        let expected = t0() + TimeDelta::seconds(2);
        assert_eq!(
            outcome,
            FailureOutcome::RetryScheduled {
                next_attempt_at: Some(expected)
            }
        );
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.retry_count, 1);
        assert!(!task.is_eligible(t0(), 5));
        assert!(task.is_eligible(expected, 5));
    }

    #[test]
    fn test_retry_count_reaches_budget() {
        let mut task = task();
        let mut now = t0();

        for attempt in 1..=5 {
            task.start(now).unwrap();
            let outcome = task.record_failure(now, 5, |_| Duration::ZERO).unwrap();
            assert_eq!(task.retry_count, attempt);
            if attempt < 5 {
                assert!(matches!(outcome, FailureOutcome::RetryScheduled { .. }));
                assert_eq!(task.status, TaskStatus::Pending);
            } else {
                assert_eq!(outcome, FailureOutcome::Exhausted);
                assert_eq!(task.status, TaskStatus::Failed);
            }
            now += TimeDelta::minutes(1);
        }

        assert!(!task.is_eligible(now, 5));
        assert!(task.start(now).is_err());
    }

    #[test]
    fn test_failure_outside_attempt_is_rejected() {
        let mut task = task();
        assert!(task.record_failure(t0(), 5, doubling).is_err());
        assert_eq!(task.retry_count, 0);
    }

    #[test]
    fn test_reset_interrupted_keeps_retry_count() {
        let mut task = task();
        task.start(t0()).unwrap();
        task.record_failure(t0(), 5, |_| Duration::ZERO).unwrap();
        task.start(t0()).unwrap();

        assert!(task.reset_interrupted(t0()));
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.retry_count, 1);
        assert!(!task.reset_interrupted(t0()));
    }
}

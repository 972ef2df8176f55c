//! # Event Bus System
//!
//! Observer channel for upload status, built on `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! - **Event Types**: [`CoreEvent`] wraps [`UploadEvent`] (per-session status
//!   and progress) and [`QueueEvent`] (drain lifecycle)
//! - **EventBus**: cloneable publisher shared by the orchestrator and service
//! - **EventStream**: receiver wrapper with optional filtering
//!
//! ```text
//! ┌──────────────┐    emit     ┌───────────┐   subscribe   ┌──────────┐
//! │ Orchestrator ├────────────>│ EventBus  ├──────────────>│ UI/host  │
//! └──────────────┘             └───────────┘               └──────────┘
//! ```
//!
//! Emitting with no subscribers returns an error that publishers ignore
//! (`emit(..).ok()`); nothing in the core depends on being observed.
//!
//! ## Usage
//!
//! ```rust
//! use bridge_traits::SessionSyncStatus;
//! use core_runtime::events::{CoreEvent, EventBus, EventStream, UploadEvent};
//!
//! let bus = EventBus::new(16);
//! let mut failures = EventStream::new(bus.subscribe()).filter(|event| {
//!     matches!(
//!         event,
//!         CoreEvent::Upload(UploadEvent::StatusChanged {
//!             status: SessionSyncStatus::Failed,
//!             ..
//!         })
//!     )
//! });
//!
//! bus.emit(CoreEvent::Upload(UploadEvent::StatusChanged {
//!     session_id: "sess-1".into(),
//!     status: SessionSyncStatus::Failed,
//! }))
//! .ok();
//!
//! assert!(failures.try_recv().is_some());
//! ```

use bridge_traits::SessionSyncStatus;
use chrono::{DateTime, Utc};
use core_async::sync::broadcast;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use broadcast::error::{RecvError, SendError};
pub use broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// A 5 MiB chunk size yields at most a few dozen progress events per
/// session; slower subscribers get `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event published through the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Per-session upload notifications
    Upload(UploadEvent),
    /// Queue-wide notifications
    Queue(QueueEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Upload(e) => e.description(),
            CoreEvent::Queue(e) => e.description(),
        }
    }

    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Upload(UploadEvent::StatusChanged {
                status: SessionSyncStatus::Failed,
                ..
            }) => EventSeverity::Error,
            CoreEvent::Upload(UploadEvent::RetryScheduled { .. }) => EventSeverity::Warning,
            CoreEvent::Upload(UploadEvent::StatusChanged {
                status: SessionSyncStatus::Synced,
                ..
            }) => EventSeverity::Info,
            CoreEvent::Queue(QueueEvent::DrainFinished { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }

    /// Session this event concerns, if any.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            CoreEvent::Upload(e) => Some(e.session_id()),
            CoreEvent::Queue(QueueEvent::TaskEnqueued { session_id, .. }) => Some(session_id),
            CoreEvent::Queue(_) => None,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Upload Events
// ============================================================================

/// Status notifications for one session's video upload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum UploadEvent {
    /// `Uploading` at the start of every attempt, `Synced` on success,
    /// `Failed` once when the retry budget is spent.
    StatusChanged {
        session_id: String,
        status: SessionSyncStatus,
    },
    /// Percent complete within one attempt. Restarts from zero on retry.
    Progress {
        session_id: String,
        /// 1-based attempt number
        attempt: u32,
        percent: u8,
    },
    /// An attempt failed and the task went back to pending.
    RetryScheduled {
        session_id: String,
        retry_count: u32,
        next_attempt_at: Option<DateTime<Utc>>,
    },
}

impl UploadEvent {
    fn description(&self) -> &str {
        match self {
            UploadEvent::StatusChanged { status, .. } => match status {
                SessionSyncStatus::Local => "Session stored locally",
                SessionSyncStatus::Uploading => "Upload started",
                SessionSyncStatus::Synced => "Upload completed",
                SessionSyncStatus::Failed => "Upload failed permanently",
            },
            UploadEvent::Progress { .. } => "Upload in progress",
            UploadEvent::RetryScheduled { .. } => "Upload retry scheduled",
        }
    }

    pub fn session_id(&self) -> &str {
        match self {
            UploadEvent::StatusChanged { session_id, .. }
            | UploadEvent::Progress { session_id, .. }
            | UploadEvent::RetryScheduled { session_id, .. } => session_id,
        }
    }
}

// ============================================================================
// Queue Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum QueueEvent {
    TaskEnqueued {
        task_id: String,
        session_id: String,
    },
    /// A drain pass was requested while the device was offline.
    SkippedOffline,
    DrainStarted {
        eligible: usize,
    },
    DrainFinished {
        processed: usize,
        succeeded: usize,
        retried: usize,
        failed: usize,
    },
}

impl QueueEvent {
    fn description(&self) -> &str {
        match self {
            QueueEvent::TaskEnqueued { .. } => "Upload task enqueued",
            QueueEvent::SkippedOffline => "Queue drain skipped while offline",
            QueueEvent::DrainStarted { .. } => "Queue drain started",
            QueueEvent::DrainFinished { .. } => "Queue drain finished",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central broadcast channel for [`CoreEvent`]s.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus that buffers `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv`/`try_recv`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Restrict the stream to events about `session_id`.
    pub fn for_session(self, session_id: impl Into<String>) -> Self {
        let session_id = session_id.into();
        self.filter(move |event| event.session_id() == Some(session_id.as_str()))
    }

    fn matches(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// `RecvError::Lagged(n)` if the subscriber fell behind by `n` events,
    /// `RecvError::Closed` once every sender is dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Returns `None` if no matching event is currently buffered.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.matches(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

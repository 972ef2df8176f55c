//! # Capture Sync Queue
//!
//! Background upload of captured session video.
//!
//! ## Overview
//!
//! A completed session leaves its video in the local blob store and a
//! [`SyncTask`] in the durable queue. The [`SyncOrchestrator`] drains that
//! queue one task at a time: it uploads the blob through an
//! `ObjectUploader`, mirrors progress into the session metadata, and
//! retries with exponential backoff until the retry budget is spent.
//!
//! ## Components
//!
//! - **Task State Machine** (`task`): `pending -> in_progress -> (deleted | pending | failed)`
//! - **Task Queue** (`queue`): `TaskQueue` trait and its SQLite implementation
//! - **Metadata Dispatcher** (`dispatcher`): ordered, best-effort metadata writes
//! - **Sync Orchestrator** (`orchestrator`): enqueue, startup recovery and the drain loop

pub mod dispatcher;
pub mod error;
pub mod orchestrator;
pub mod queue;
pub mod task;

pub use dispatcher::MetadataDispatcher;
pub use error::{Result, SyncError};
pub use orchestrator::{
    DrainOutcome, DrainReport, OrchestratorConfig, SyncOrchestrator, TaskOutcome,
};
pub use queue::{QueueStats, SqliteTaskQueue, TaskQueue};
pub use task::{
    extension_for_content_type, remote_path_for, FailureOutcome, SyncTask, SyncTaskId,
    TaskStatus, TaskType,
};

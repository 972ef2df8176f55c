//! # Sync Orchestrator
//!
//! Drives the durable upload queue: claims eligible tasks one at a time,
//! uploads their blobs, and turns every outcome into a queue mutation plus
//! a status notification.
//!
//! ## Workflow
//!
//! 1. **Enqueue**: the producer stores a blob and calls [`SyncOrchestrator::enqueue`]
//! 2. **Drain**: [`SyncOrchestrator::process_queue`] runs a single-flight pass
//!    over pending tasks whose backoff has elapsed, skipping entirely while offline
//! 3. **Attempt**: [`SyncOrchestrator::process_task`] marks the task in progress,
//!    reads the blob, requests an upload target and sends it in chunks
//! 4. **Settle**: success deletes the task and its blob; failure charges the
//!    retry budget and either schedules the next attempt or marks it `failed`.
//!    Settling only touches the row the attempt claimed, so a session
//!    re-enqueued mid-upload keeps its fresh task and blob
//!
//! ## Re-entry points
//!
//! The orchestrator holds no listeners of its own. Hosts call
//! [`SyncOrchestrator::init`] at startup, [`SyncOrchestrator::enqueue`] when a
//! session completes and [`SyncOrchestrator::handle_network_change`] when
//! connectivity returns.

use crate::dispatcher::MetadataDispatcher;
use crate::queue::{QueueStats, TaskQueue};
use crate::task::{FailureOutcome, SyncTask, SyncTaskId, TaskStatus};
use crate::{Result, SyncError};
use bridge_traits::metadata::{SessionFieldsPatch, SessionSyncStatus};
use bridge_traits::network::{NetworkInfo, NetworkMonitor};
use bridge_traits::storage::BlobStore;
use bridge_traits::time::{Clock, SystemClock};
use bridge_traits::upload::ObjectUploader;
use core_runtime::config::{
    exponential_backoff, is_allowed_content_type, SyncConfig, DEFAULT_ALLOWED_CONTENT_TYPES,
    DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_MAX, DEFAULT_MAX_RETRIES,
};
use core_runtime::events::{CoreEvent, EventBus, QueueEvent, UploadEvent};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Orchestrator tunables
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Failed attempts before a task is marked `failed`
    pub max_retries: u32,

    pub backoff_base: Duration,

    pub backoff_max: Duration,

    /// Content types `enqueue` accepts
    pub allowed_content_types: Vec<String>,
}

impl OrchestratorConfig {
    pub fn backoff_for(&self, retry_count: u32) -> Duration {
        exponential_backoff(self.backoff_base, self.backoff_max, retry_count)
    }

    fn accepts(&self, content_type: &str) -> bool {
        is_allowed_content_type(&self.allowed_content_types, content_type)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_max: DEFAULT_BACKOFF_MAX,
            allowed_content_types: DEFAULT_ALLOWED_CONTENT_TYPES
                .iter()
                .map(|t| t.to_string())
                .collect(),
        }
    }
}

impl From<&SyncConfig> for OrchestratorConfig {
    fn from(config: &SyncConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_base: config.backoff_base,
            backoff_max: config.backoff_max,
            allowed_content_types: config.allowed_content_types.clone(),
        }
    }
}

/// How one task attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Uploaded; the task is gone from the queue.
    Succeeded,
    /// Failed with retry budget left; the task is pending again.
    RetryScheduled,
    /// Failed and out of retries; the task is `failed`.
    Failed,
    /// The session was re-enqueued mid-attempt; the fresh task was left as is.
    Superseded,
}

/// Counts for one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub processed: usize,
    pub succeeded: usize,
    pub retried: usize,
    pub failed: usize,
    /// Attempts whose session was re-enqueued before they settled
    pub superseded: usize,
    /// Pending tasks left alone because their backoff had not elapsed
    pub deferred: usize,
}

impl DrainReport {
    fn record(&mut self, outcome: TaskOutcome) {
        self.processed += 1;
        match outcome {
            TaskOutcome::Succeeded => self.succeeded += 1,
            TaskOutcome::RetryScheduled => self.retried += 1,
            TaskOutcome::Failed => self.failed += 1,
            TaskOutcome::Superseded => self.superseded += 1,
        }
    }

    fn merge(&mut self, other: DrainReport) {
        self.processed += other.processed;
        self.succeeded += other.succeeded;
        self.retried += other.retried;
        self.failed += other.failed;
        self.superseded += other.superseded;
        self.deferred = other.deferred;
    }
}

/// Result of asking for a drain pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Device offline; nothing was touched.
    Offline,
    /// Another pass is running. It will rescan before it finishes.
    AlreadyRunning,
    Completed(DrainReport),
}

impl DrainOutcome {
    pub fn report(&self) -> Option<&DrainReport> {
        match self {
            DrainOutcome::Completed(report) => Some(report),
            _ => None,
        }
    }
}

/// Clears the single-flight flag however the pass exits.
struct ProcessingGuard<'a>(&'a AtomicBool);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Background upload queue driver. One instance per process.
pub struct SyncOrchestrator {
    config: OrchestratorConfig,
    queue: Arc<dyn TaskQueue>,
    blobs: Arc<dyn BlobStore>,
    uploader: Arc<dyn ObjectUploader>,
    metadata: MetadataDispatcher,
    network: Arc<dyn NetworkMonitor>,
    event_bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    processing: AtomicBool,
    rescan_requested: AtomicBool,
}

impl SyncOrchestrator {
    /// Create an orchestrator over its collaborators.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let orchestrator = SyncOrchestrator::new(
    ///     OrchestratorConfig::from(&config),
    ///     Arc::new(SqliteTaskQueue::new(pool.clone())),
    ///     Arc::new(SqliteBlobStore::new(pool)),
    ///     uploader,
    ///     MetadataDispatcher::spawn(metadata_repository),
    ///     network_monitor,
    ///     event_bus,
    /// );
    /// ```
    pub fn new(
        config: OrchestratorConfig,
        queue: Arc<dyn TaskQueue>,
        blobs: Arc<dyn BlobStore>,
        uploader: Arc<dyn ObjectUploader>,
        metadata: MetadataDispatcher,
        network: Arc<dyn NetworkMonitor>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            config,
            queue,
            blobs,
            uploader,
            metadata,
            network,
            event_bus,
            clock: Arc::new(SystemClock),
            processing: AtomicBool::new(false),
            rescan_requested: AtomicBool::new(false),
        }
    }

    /// Replace the time source used for attempt stamps and backoff.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn metadata(&self) -> &MetadataDispatcher {
        &self.metadata
    }

    /// Whether a drain pass is running right now.
    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    /// Record a fresh upload task for `session_id` without draining.
    ///
    /// Replaces any task the session already has, resetting its retry count.
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidInput`] for an unsupported content type or
    /// malformed ids; storage errors if the queue cannot be written.
    #[instrument(skip(self), fields(trainer_id = %trainer_id, session_id = %session_id))]
    pub async fn enqueue_task(
        &self,
        trainer_id: &str,
        session_id: &str,
        blob_key: &str,
        content_type: &str,
    ) -> Result<SyncTask> {
        if !self.config.accepts(content_type) {
            return Err(SyncError::InvalidInput {
                field: "content_type".to_string(),
                message: format!("'{content_type}' is not an allowed upload type"),
            });
        }

        let now = self.clock.now();
        let task = SyncTask::new_video_upload(trainer_id, session_id, blob_key, content_type, now)?;
        self.queue.put(&task).await?;

        info!(task_id = %task.id, remote_path = %task.remote_path, "Upload task enqueued");

        self.event_bus
            .emit(CoreEvent::Queue(QueueEvent::TaskEnqueued {
                task_id: task.id.to_string(),
                session_id: session_id.to_string(),
            }))
            .ok();
        self.metadata.dispatch(
            session_id,
            SessionFieldsPatch::status(SessionSyncStatus::Local).with_updated_at(now),
        );

        Ok(task)
    }

    /// Record a fresh upload task, then run a drain pass.
    ///
    /// Idempotent per session: enqueuing the same session twice leaves one task.
    #[instrument(skip(self), fields(trainer_id = %trainer_id, session_id = %session_id))]
    pub async fn enqueue(
        &self,
        trainer_id: &str,
        session_id: &str,
        blob_key: &str,
        content_type: &str,
    ) -> Result<SyncTaskId> {
        let task = self
            .enqueue_task(trainer_id, session_id, blob_key, content_type)
            .await?;
        self.process_queue(trainer_id).await?;
        Ok(task.id)
    }

    /// Startup recovery.
    ///
    /// Tasks left `in_progress` by a previous process go back to `pending`
    /// without being charged a retry, then a drain pass runs.
    #[instrument(skip(self), fields(trainer_id = %trainer_id))]
    pub async fn init(&self, trainer_id: &str) -> Result<DrainOutcome> {
        if self.is_processing() {
            debug!("Drain pass already live, skipping interrupted-task recovery");
        } else {
            let now = self.clock.now();
            let interrupted = self.queue.list_by_status(TaskStatus::InProgress).await?;
            let recovered = interrupted.len();

            for mut task in interrupted {
                if task.reset_interrupted(now) {
                    self.queue.put(&task).await?;
                    debug!(task_id = %task.id, retry_count = task.retry_count, "Interrupted task reset");
                }
            }

            if recovered > 0 {
                info!(recovered, "Recovered interrupted upload tasks");
            }
        }

        self.process_queue(trainer_id).await
    }

    /// Drain once on reconnect; offline notifications are ignored.
    pub async fn handle_network_change(
        &self,
        trainer_id: &str,
        info: &NetworkInfo,
    ) -> Result<DrainOutcome> {
        if !info.is_online() {
            debug!(status = ?info.status, "Connectivity lost, queue left as is");
            return Ok(DrainOutcome::Offline);
        }
        self.process_queue(trainer_id).await
    }

    /// Single-flight drain pass over eligible pending tasks.
    ///
    /// Tasks are processed serially in queue order. A call that arrives while
    /// a pass is running returns [`DrainOutcome::AlreadyRunning`] and makes
    /// the running pass rescan before it exits, so newly enqueued tasks are
    /// not stranded.
    ///
    /// # Errors
    ///
    /// Only queue storage failures escape; upload failures become task state.
    #[instrument(skip(self), fields(trainer_id = %trainer_id))]
    pub async fn process_queue(&self, trainer_id: &str) -> Result<DrainOutcome> {
        if !self.network.is_connected().await {
            debug!("Offline, queue drain skipped");
            self.event_bus
                .emit(CoreEvent::Queue(QueueEvent::SkippedOffline))
                .ok();
            return Ok(DrainOutcome::Offline);
        }

        let mut total = DrainReport::default();
        let mut ran = false;

        loop {
            if self
                .processing
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                self.rescan_requested.store(true, Ordering::SeqCst);
                if ran {
                    break;
                }
                debug!("Drain pass already running, rescan requested");
                return Ok(DrainOutcome::AlreadyRunning);
            }

            {
                let _guard = ProcessingGuard(&self.processing);
                self.rescan_requested.store(false, Ordering::SeqCst);
                let report = self.drain_once(trainer_id).await?;
                total.merge(report);
                ran = true;
            }

            if !self.rescan_requested.swap(false, Ordering::SeqCst) {
                break;
            }
            debug!("Rescan requested during drain, running another pass");
        }

        Ok(DrainOutcome::Completed(total))
    }

    async fn drain_once(&self, trainer_id: &str) -> Result<DrainReport> {
        let now = self.clock.now();
        let max_retries = self.config.max_retries;

        let (eligible, waiting): (Vec<SyncTask>, Vec<SyncTask>) = self
            .queue
            .list_by_status(TaskStatus::Pending)
            .await?
            .into_iter()
            .filter(|task| task.retry_count < max_retries)
            .partition(|task| task.is_eligible(now, max_retries));

        for task in &waiting {
            debug!(
                task_id = %task.id,
                next_eligible_at = ?task.next_eligible_at,
                "Task in backoff, skipped"
            );
        }

        let mut report = DrainReport {
            deferred: waiting.len(),
            ..DrainReport::default()
        };

        self.event_bus
            .emit(CoreEvent::Queue(QueueEvent::DrainStarted {
                eligible: eligible.len(),
            }))
            .ok();

        let eligible_count = eligible.len();
        for (index, task) in eligible.into_iter().enumerate() {
            if !self.network.is_connected().await {
                info!(remaining = eligible_count - index, "Went offline mid-drain, stopping");
                break;
            }
            // Earlier uploads may have overlapped a re-enqueue of this session.
            let task = match self.queue.get(&task.id).await? {
                Some(current) if current.is_eligible(self.clock.now(), max_retries) => current,
                _ => continue,
            };
            let outcome = self.process_task(trainer_id, task).await?;
            report.record(outcome);
        }

        self.event_bus
            .emit(CoreEvent::Queue(QueueEvent::DrainFinished {
                processed: report.processed,
                succeeded: report.succeeded,
                retried: report.retried,
                failed: report.failed,
            }))
            .ok();

        debug!(?report, "Drain pass finished");
        Ok(report)
    }

    /// Run one upload attempt for `task` and settle its queue state.
    ///
    /// # Errors
    ///
    /// Only queue storage failures escape. Every upload failure (blob
    /// missing, rejected target, transport error) is charged to the task.
    #[instrument(skip(self, task), fields(task_id = %task.id, session_id = %task.session_id))]
    pub async fn process_task(&self, trainer_id: &str, mut task: SyncTask) -> Result<TaskOutcome> {
        let started = self.clock.now();
        task.start(started)?;
        self.queue.put(&task).await?;

        let attempt = task.attempt_number();
        debug!(attempt, "Upload attempt started");

        self.emit_status(&task.session_id, SessionSyncStatus::Uploading);
        self.metadata.dispatch(
            &task.session_id,
            SessionFieldsPatch::status(SessionSyncStatus::Uploading).with_updated_at(started),
        );

        match self.upload(trainer_id, &task, attempt).await {
            Ok(remote_path) => self.settle_success(&task, remote_path).await,
            Err(err) => self.settle_failure(task, err).await,
        }
    }

    async fn upload(&self, trainer_id: &str, task: &SyncTask, attempt: u32) -> Result<String> {
        let blob = self
            .blobs
            .get(&task.blob_key)
            .await?
            .ok_or_else(|| SyncError::BlobMissing {
                key: task.blob_key.clone(),
            })?;

        let handle = self
            .uploader
            .request_upload_target(trainer_id, &task.remote_path, &task.content_type)
            .await?;

        let event_bus = Arc::clone(&self.event_bus);
        let session_id = task.session_id.clone();
        let on_progress = move |percent: u8| {
            debug!(session_id = %session_id, attempt, percent, "Upload progress");
            event_bus
                .emit(CoreEvent::Upload(UploadEvent::Progress {
                    session_id: session_id.clone(),
                    attempt,
                    percent,
                }))
                .ok();
        };

        let remote_path = self
            .uploader
            .upload_chunked(&handle, blob, &on_progress)
            .await?;

        Ok(remote_path)
    }

    async fn settle_success(&self, task: &SyncTask, remote_path: String) -> Result<TaskOutcome> {
        if !self.queue.delete_claimed(task).await? {
            info!(
                remote_path = %remote_path,
                "Session re-enqueued during upload, newer recording stays queued"
            );
            return Ok(TaskOutcome::Superseded);
        }

        let now = self.clock.now();
        self.metadata.dispatch(
            &task.session_id,
            SessionFieldsPatch::status(SessionSyncStatus::Synced)
                .with_remote_path(remote_path.clone())
                .with_updated_at(now),
        );
        self.emit_status(&task.session_id, SessionSyncStatus::Synced);

        if let Err(e) = self.blobs.delete(&task.blob_key).await {
            warn!(blob_key = %task.blob_key, error = %e, "Uploaded blob could not be removed");
        }

        info!(remote_path = %remote_path, attempt = task.attempt_number(), "Upload succeeded");
        Ok(TaskOutcome::Succeeded)
    }

    async fn settle_failure(&self, claimed: SyncTask, err: SyncError) -> Result<TaskOutcome> {
        let now = self.clock.now();
        let max_retries = self.config.max_retries;
        let mut task = claimed.clone();
        let outcome = task.record_failure(now, max_retries, |n| self.config.backoff_for(n))?;

        if !self.queue.update_claimed(&claimed, &task).await? {
            info!(error = %err, "Session re-enqueued during upload, failed attempt not charged");
            return Ok(TaskOutcome::Superseded);
        }

        match outcome {
            FailureOutcome::RetryScheduled { next_attempt_at } => {
                warn!(
                    error = %err,
                    retryable = err.is_retryable(),
                    retry_count = task.retry_count,
                    max_retries,
                    next_attempt_at = ?next_attempt_at,
                    "Upload attempt failed, retry scheduled"
                );
                self.event_bus
                    .emit(CoreEvent::Upload(UploadEvent::RetryScheduled {
                        session_id: task.session_id.clone(),
                        retry_count: task.retry_count,
                        next_attempt_at,
                    }))
                    .ok();
                Ok(TaskOutcome::RetryScheduled)
            }
            FailureOutcome::Exhausted => {
                info!(
                    error = %err,
                    retryable = err.is_retryable(),
                    retry_count = task.retry_count,
                    "Upload permanently failed"
                );
                self.metadata.dispatch(
                    &task.session_id,
                    SessionFieldsPatch::status(SessionSyncStatus::Failed).with_updated_at(now),
                );
                self.emit_status(&task.session_id, SessionSyncStatus::Failed);
                Ok(TaskOutcome::Failed)
            }
        }
    }

    /// User-triggered retry of a permanently failed session.
    ///
    /// # Errors
    ///
    /// [`SyncError::TaskNotFound`] if the session has no task, or
    /// [`SyncError::InvalidStateTransition`] if its task has not failed.
    #[instrument(skip(self), fields(trainer_id = %trainer_id, session_id = %session_id))]
    pub async fn retry_failed(&self, trainer_id: &str, session_id: &str) -> Result<SyncTaskId> {
        let id = SyncTaskId::from_session(session_id);
        let task = self
            .queue
            .get(&id)
            .await?
            .ok_or_else(|| SyncError::TaskNotFound {
                task_id: id.to_string(),
            })?;

        if task.status != TaskStatus::Failed {
            return Err(SyncError::InvalidStateTransition {
                from: task.status.as_str().to_string(),
                to: TaskStatus::Pending.as_str().to_string(),
                reason: "Only failed tasks can be retried manually".to_string(),
            });
        }

        self.enqueue(trainer_id, session_id, &task.blob_key, &task.content_type)
            .await
    }

    pub async fn queue_stats(&self) -> Result<QueueStats> {
        Ok(QueueStats {
            pending: self.queue.count_by_status(TaskStatus::Pending).await?,
            in_progress: self.queue.count_by_status(TaskStatus::InProgress).await?,
            failed: self.queue.count_by_status(TaskStatus::Failed).await?,
        })
    }

    fn emit_status(&self, session_id: &str, status: SessionSyncStatus) {
        self.event_bus
            .emit(CoreEvent::Upload(UploadEvent::StatusChanged {
                session_id: session_id.to_string(),
                status,
            }))
            .ok();
    }
}

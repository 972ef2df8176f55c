//! Capture sync facade.

use bridge_traits::metadata::SessionMetadataRepository;
use bridge_traits::network::NetworkInfo;
use bridge_traits::storage::BlobStore;
use bridge_traits::upload::ObjectUploader;
use bytes::Bytes;
use core_runtime::events::{EventBus, EventStream};
use core_runtime::logging::{init_logging, strip_path, LoggingConfig};
use core_runtime::SyncConfig;
use core_storage::{create_pool, DatabaseConfig, SqliteBlobStore};
use core_sync::{
    DrainOutcome, MetadataDispatcher, OrchestratorConfig, QueueStats, SqliteTaskQueue,
    SyncError, SyncOrchestrator, SyncTaskId,
};
use provider_object_storage::{ResumableUploader, RestSessionMetadataRepository};
use sqlx::SqlitePool;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::analysis::{run_with_deadline, AnalysisOutcome};
use crate::{Result, ServiceError};

/// Buffered events per subscriber before the slowest one starts lagging.
const EVENT_BUS_CAPACITY: usize = 256;

/// Remote collaborators injected instead of the HTTP bindings.
#[derive(Default, Clone)]
pub struct SyncCollaborators {
    pub uploader: Option<Arc<dyn ObjectUploader>>,
    pub metadata_repository: Option<Arc<dyn SessionMetadataRepository>>,
}

impl SyncCollaborators {
    pub fn with_uploader(mut self, uploader: Arc<dyn ObjectUploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    pub fn with_metadata_repository(
        mut self,
        repository: Arc<dyn SessionMetadataRepository>,
    ) -> Self {
        self.metadata_repository = Some(repository);
        self
    }
}

/// Primary facade exposed to host applications.
///
/// Owns the SQLite store, the orchestrator and the event bus. Hosts call
/// [`start`](Self::start) once at launch, [`complete_session`](Self::complete_session)
/// when a recording is saved and [`network_changed`](Self::network_changed)
/// from their connectivity listener.
pub struct CaptureSyncService {
    config: SyncConfig,
    pool: SqlitePool,
    blobs: Arc<dyn BlobStore>,
    orchestrator: Arc<SyncOrchestrator>,
    event_bus: Arc<EventBus>,
}

impl CaptureSyncService {
    /// Open the store and wire the HTTP bindings from `config`'s endpoints.
    pub async fn bootstrap(config: SyncConfig) -> Result<Self> {
        Self::bootstrap_with(config, SyncCollaborators::default()).await
    }

    /// Open the store, preferring injected collaborators over the HTTP bindings.
    ///
    /// # Errors
    ///
    /// [`ServiceError::CapabilityMissing`] when neither an endpoint nor an
    /// injected implementation is available for the uploader or the metadata
    /// repository; storage errors if the database cannot be opened.
    pub async fn bootstrap_with(
        config: SyncConfig,
        collaborators: SyncCollaborators,
    ) -> Result<Self> {
        config.validate()?;

        let uploader = match collaborators.uploader {
            Some(uploader) => uploader,
            None => {
                let (endpoint, http) =
                    remote_binding(&config, config.upload_endpoint.as_deref(), "ObjectUploader")?;
                Arc::new(ResumableUploader::from_config(http, endpoint, &config))
                    as Arc<dyn ObjectUploader>
            }
        };

        let metadata_repository = match collaborators.metadata_repository {
            Some(repository) => repository,
            None => {
                let (endpoint, http) = remote_binding(
                    &config,
                    config.metadata_endpoint.as_deref(),
                    "SessionMetadataRepository",
                )?;
                Arc::new(
                    RestSessionMetadataRepository::new(http, endpoint)
                        .with_request_timeout(config.request_timeout),
                ) as Arc<dyn SessionMetadataRepository>
            }
        };

        let pool = create_pool(DatabaseConfig::new(config.database_path.clone())).await?;
        let blobs: Arc<dyn BlobStore> = Arc::new(SqliteBlobStore::new(pool.clone()));
        let queue = Arc::new(SqliteTaskQueue::new(pool.clone()));
        let event_bus = Arc::new(EventBus::new(EVENT_BUS_CAPACITY));

        let orchestrator = SyncOrchestrator::new(
            OrchestratorConfig::from(&config),
            queue,
            blobs.clone(),
            uploader,
            MetadataDispatcher::spawn(metadata_repository),
            config.network_monitor.clone(),
            event_bus.clone(),
        )
        .with_clock(config.clock.clone());

        let database = config.database_path.to_string_lossy().into_owned();
        info!(
            database = %strip_path(&database),
            max_retries = config.max_retries,
            chunk_size_bytes = config.chunk_size_bytes,
            "Capture sync service ready"
        );

        Ok(Self {
            config,
            pool,
            blobs,
            orchestrator: Arc::new(orchestrator),
            event_bus,
        })
    }

    /// Install the global tracing subscriber, forwarding to the configured
    /// [`LoggerSink`](bridge_traits::time::LoggerSink) if there is one.
    pub fn install_logging(config: &SyncConfig, logging: LoggingConfig) -> Result<()> {
        let logging = match (&config.logger_sink, logging.logger_sink.is_some()) {
            (Some(sink), false) => logging.with_logger_sink(sink.clone()),
            _ => logging,
        };
        init_logging(logging)?;
        Ok(())
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> Arc<SyncOrchestrator> {
        Arc::clone(&self.orchestrator)
    }

    pub fn blobs(&self) -> Arc<dyn BlobStore> {
        Arc::clone(&self.blobs)
    }

    /// Startup recovery followed by a drain.
    pub async fn start(&self, trainer_id: &str) -> Result<DrainOutcome> {
        Ok(self.orchestrator.init(trainer_id).await?)
    }

    /// Producer path: persist the recording, then queue and drain.
    ///
    /// The content type is checked before the blob is written so a rejected
    /// recording leaves nothing behind.
    #[instrument(skip(self, blob), fields(session_id = %session_id, size = blob.len()))]
    pub async fn complete_session(
        &self,
        trainer_id: &str,
        session_id: &str,
        blob: Bytes,
        content_type: &str,
    ) -> Result<SyncTaskId> {
        if !self.config.accepts_content_type(content_type) {
            return Err(SyncError::InvalidInput {
                field: "content_type".to_string(),
                message: format!("'{content_type}' is not an allowed upload type"),
            }
            .into());
        }

        self.blobs.put(session_id, blob).await?;
        Ok(self
            .orchestrator
            .enqueue(trainer_id, session_id, session_id, content_type)
            .await?)
    }

    /// Connectivity hook; drains when the new status is connected.
    pub async fn network_changed(
        &self,
        trainer_id: &str,
        info: NetworkInfo,
    ) -> Result<DrainOutcome> {
        Ok(self
            .orchestrator
            .handle_network_change(trainer_id, &info)
            .await?)
    }

    pub async fn process_queue(&self, trainer_id: &str) -> Result<DrainOutcome> {
        Ok(self.orchestrator.process_queue(trainer_id).await?)
    }

    /// Re-enqueue a session whose retries ran out.
    pub async fn retry_failed(&self, trainer_id: &str, session_id: &str) -> Result<SyncTaskId> {
        Ok(self
            .orchestrator
            .retry_failed(trainer_id, session_id)
            .await?)
    }

    pub async fn queue_stats(&self) -> Result<QueueStats> {
        Ok(self.orchestrator.queue_stats().await?)
    }

    /// Event stream for every upload and queue notification.
    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.event_bus.subscribe())
    }

    /// Status stream for a single session.
    pub fn subscribe_session(&self, session_id: impl Into<String>) -> EventStream {
        self.subscribe().for_session(session_id)
    }

    /// Race `analysis` against the configured analysis timeout.
    pub async fn analyze_with_deadline<F, T>(&self, analysis: F) -> Result<AnalysisOutcome<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        run_with_deadline(self.config.analysis_timeout, analysis).await
    }

    /// Wait for pending metadata writes, then close the database.
    pub async fn shutdown(&self) {
        self.orchestrator.metadata().flush().await;
        self.pool.close().await;
        info!("Capture sync service stopped");
    }
}

fn remote_binding<'a>(
    config: &SyncConfig,
    endpoint: Option<&'a str>,
    capability: &str,
) -> Result<(&'a str, Arc<dyn bridge_traits::http::HttpClient>)> {
    let endpoint = endpoint.ok_or_else(|| ServiceError::CapabilityMissing {
        capability: capability.to_string(),
        message: "No endpoint configured and no implementation injected.".to_string(),
    })?;
    let http = config
        .http_client
        .clone()
        .ok_or_else(|| ServiceError::CapabilityMissing {
            capability: "HttpClient".to_string(),
            message: format!("{capability} needs an HttpClient to reach {endpoint}"),
        })?;
    Ok((endpoint, http))
}

//! End-to-end tests for the capture sync facade over a scripted storage backend.

use async_trait::async_trait;
use bridge_desktop::ManualNetworkMonitor;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bridge_traits::metadata::{SessionFieldsPatch, SessionMetadataRepository};
use bridge_traits::network::{NetworkInfo, NetworkType};
use bridge_traits::time::ManualClock;
use bytes::Bytes;
use chrono::{TimeDelta, TimeZone, Utc};
use core_runtime::events::{CoreEvent, UploadEvent};
use core_runtime::SyncConfig;
use core_service::{AnalysisOutcome, CaptureSyncService, ServiceError, SyncCollaborators};
use core_sync::{DrainOutcome, SyncError};
use mockall::mock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

mock! {
    HttpClient {}

    #[async_trait]
    impl HttpClient for HttpClient {
        async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
    }
}

const MIB: usize = 1024 * 1024;
const TRAINER: &str = "t1";

/// Requests seen by the scripted backend, plus a switch to fail chunk uploads.
#[derive(Default)]
struct Backend {
    requests: Mutex<Vec<HttpRequest>>,
    reject_chunks: AtomicBool,
}

impl Backend {
    fn respond(&self, request: HttpRequest) -> HttpResponse {
        let response = match request.method {
            HttpMethod::Post => {
                let mut headers = HashMap::new();
                headers.insert(
                    "Location".to_string(),
                    "https://storage.test/session/1".to_string(),
                );
                HttpResponse {
                    status: 200,
                    headers,
                    body: Bytes::new(),
                }
            }
            HttpMethod::Put if self.reject_chunks.load(Ordering::SeqCst) => status(503),
            HttpMethod::Put => {
                let range = request.header_value("Content-Range").unwrap_or_default();
                status(if is_final_range(range) { 200 } else { 308 })
            }
            _ => status(200),
        };
        self.requests.lock().unwrap().push(request);
        response
    }

    fn count(&self, method: HttpMethod) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method)
            .count()
    }

    fn content_ranges(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter_map(|r| r.header_value("Content-Range").map(str::to_string))
            .collect()
    }

    fn metadata_writes(&self) -> Vec<serde_json::Value> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == HttpMethod::Patch)
            .map(|r| serde_json::from_slice(r.body.as_ref().unwrap()).unwrap())
            .collect()
    }

    fn statuses(&self) -> Vec<String> {
        self.metadata_writes()
            .iter()
            .map(|w| w["syncStatus"].as_str().unwrap().to_string())
            .collect()
    }
}

fn status(code: u16) -> HttpResponse {
    HttpResponse {
        status: code,
        headers: HashMap::new(),
        body: Bytes::new(),
    }
}

/// `bytes 10-19/20` is the last chunk; `bytes */0` is an empty upload.
fn is_final_range(range: &str) -> bool {
    let Some(rest) = range.strip_prefix("bytes ") else {
        return false;
    };
    let Some((span, total)) = rest.split_once('/') else {
        return false;
    };
    if span == "*" {
        return true;
    }
    let end = span.split_once('-').map(|(_, end)| end).unwrap_or_default();
    match (end.parse::<u64>(), total.parse::<u64>()) {
        (Ok(end), Ok(total)) => end + 1 == total,
        _ => false,
    }
}

fn http_client(backend: Arc<Backend>) -> Arc<dyn HttpClient> {
    let mut mock_http = MockHttpClient::new();
    mock_http
        .expect_execute()
        .returning(move |request| Ok(backend.respond(request)));
    Arc::new(mock_http)
}

struct Env {
    backend: Arc<Backend>,
    network: Arc<ManualNetworkMonitor>,
    clock: Arc<ManualClock>,
}

impl Env {
    fn new(online: bool) -> Self {
        Self {
            backend: Arc::new(Backend::default()),
            network: Arc::new(if online {
                ManualNetworkMonitor::online()
            } else {
                ManualNetworkMonitor::offline()
            }),
            clock: Arc::new(ManualClock::new(
                Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap(),
            )),
        }
    }

    fn config(&self, database_path: &str) -> SyncConfig {
        SyncConfig::builder()
            .database_path(database_path)
            .upload_endpoint("https://storage.test")
            .metadata_endpoint("https://db.test/v1")
            .http_client(http_client(self.backend.clone()))
            .network_monitor(self.network.clone())
            .clock(self.clock.clone())
            .build()
            .unwrap()
    }

    async fn service(&self) -> CaptureSyncService {
        CaptureSyncService::bootstrap(self.config(":memory:"))
            .await
            .unwrap()
    }
}

fn recording(len: usize) -> Bytes {
    Bytes::from(vec![0xA5u8; len])
}

#[core_async::test]
async fn twelve_mib_session_uploads_in_three_chunks() {
    let env = Env::new(true);
    let service = env.service().await;
    let mut events = service.subscribe_session("sess-1");

    service
        .complete_session(TRAINER, "sess-1", recording(12 * MIB), "video/webm")
        .await
        .unwrap();
    service.shutdown().await;

    assert_eq!(
        env.backend.content_ranges(),
        vec![
            "bytes 0-5242879/12582912",
            "bytes 5242880-10485759/12582912",
            "bytes 10485760-12582911/12582912",
        ]
    );

    let mut progress = Vec::new();
    while let Some(Ok(event)) = events.try_recv() {
        if let CoreEvent::Upload(UploadEvent::Progress { percent, .. }) = event {
            progress.push(percent);
        }
    }
    assert_eq!(progress, vec![42, 83, 100]);

    assert_eq!(env.backend.statuses(), vec!["local", "uploading", "synced"]);
    let synced = env.backend.metadata_writes().pop().unwrap();
    assert_eq!(
        synced["remotePath"],
        "trainers/t1/sessions/sess-1/recording.webm"
    );
}

#[core_async::test]
async fn successful_upload_clears_queue_and_blob() {
    let env = Env::new(true);
    let service = env.service().await;

    service
        .complete_session(TRAINER, "sess-1", recording(1024), "video/mp4")
        .await
        .unwrap();

    assert!(service.queue_stats().await.unwrap().is_idle());
    assert_eq!(service.queue_stats().await.unwrap().total(), 0);
    assert!(!service.blobs().contains("sess-1").await.unwrap());
}

#[core_async::test]
async fn offline_session_waits_for_connectivity() {
    let env = Env::new(false);
    let service = env.service().await;

    service
        .complete_session(TRAINER, "sess-1", recording(1024), "video/webm")
        .await
        .unwrap();

    assert_eq!(env.backend.count(HttpMethod::Post), 0);
    assert_eq!(service.queue_stats().await.unwrap().pending, 1);
    assert!(service.blobs().contains("sess-1").await.unwrap());

    let outcome = service
        .network_changed(TRAINER, NetworkInfo::disconnected())
        .await
        .unwrap();
    assert_eq!(outcome, DrainOutcome::Offline);

    env.network.set_online(true);
    let outcome = service
        .network_changed(TRAINER, NetworkInfo::connected(NetworkType::WiFi))
        .await
        .unwrap();

    assert_eq!(outcome.report().map(|r| r.succeeded), Some(1));
    assert!(service.queue_stats().await.unwrap().is_idle());
    assert_eq!(env.backend.count(HttpMethod::Post), 1);
}

#[core_async::test]
async fn queued_upload_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("capture-sync.db");
    let db_path = db_path.to_str().unwrap();

    let env = Env::new(false);
    {
        let service = CaptureSyncService::bootstrap(env.config(db_path))
            .await
            .unwrap();
        service
            .complete_session(TRAINER, "sess-1", recording(3 * MIB), "video/webm")
            .await
            .unwrap();
        service.shutdown().await;
    }

    env.network.set_online(true);
    let service = CaptureSyncService::bootstrap(env.config(db_path))
        .await
        .unwrap();
    assert_eq!(service.queue_stats().await.unwrap().pending, 1);

    let outcome = service.start(TRAINER).await.unwrap();

    assert_eq!(outcome.report().map(|r| r.succeeded), Some(1));
    assert!(!service.blobs().contains("sess-1").await.unwrap());
    assert_eq!(env.backend.count(HttpMethod::Put), 1);
    service.shutdown().await;
}

#[core_async::test]
async fn unsupported_content_type_leaves_nothing_behind() {
    let env = Env::new(true);
    let service = env.service().await;

    let result = service
        .complete_session(TRAINER, "sess-1", recording(16), "video/x-msvideo")
        .await;

    assert!(matches!(
        result,
        Err(ServiceError::Sync(SyncError::InvalidInput { .. }))
    ));
    assert!(service.blobs().list_keys().await.unwrap().is_empty());
    assert_eq!(service.queue_stats().await.unwrap().total(), 0);
}

#[core_async::test]
async fn codec_qualified_content_type_is_uploaded() {
    let env = Env::new(true);
    let service = env.service().await;

    service
        .complete_session(TRAINER, "sess-1", recording(1024), "video/webm;codecs=vp9")
        .await
        .unwrap();
    service.shutdown().await;

    assert_eq!(env.backend.count(HttpMethod::Put), 1);
    let synced = env.backend.metadata_writes().pop().unwrap();
    assert_eq!(
        synced["remotePath"],
        "trainers/t1/sessions/sess-1/recording.webm"
    );
}

#[core_async::test]
async fn exhausted_session_can_be_retried_by_hand() {
    let env = Env::new(true);
    env.backend.reject_chunks.store(true, Ordering::SeqCst);
    let service = env.service().await;

    service
        .complete_session(TRAINER, "sess-1", recording(1024), "video/webm")
        .await
        .unwrap();
    for _ in 0..4 {
        env.clock.advance(TimeDelta::minutes(10));
        service.process_queue(TRAINER).await.unwrap();
    }

    let stats = service.queue_stats().await.unwrap();
    assert_eq!(stats.failed, 1);
    assert!(stats.is_idle());
    assert!(service.blobs().contains("sess-1").await.unwrap());

    env.backend.reject_chunks.store(false, Ordering::SeqCst);
    service.retry_failed(TRAINER, "sess-1").await.unwrap();
    service.shutdown().await;

    assert_eq!(env.backend.count(HttpMethod::Put), 6);
    assert_eq!(
        env.backend.statuses().last().map(String::as_str),
        Some("synced")
    );
    assert!(env.backend.statuses().contains(&"failed".to_string()));
}

#[core_async::test]
async fn bootstrap_without_endpoints_reports_missing_capability() {
    let config = SyncConfig::builder()
        .database_path(":memory:")
        .network_monitor(Arc::new(ManualNetworkMonitor::online()))
        .build()
        .unwrap();

    let result = CaptureSyncService::bootstrap(config).await;

    match result {
        Err(ServiceError::CapabilityMissing { capability, .. }) => {
            assert_eq!(capability, "ObjectUploader")
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("bootstrap should fail without an uploader"),
    }
}

#[derive(Default)]
struct RecordingMetadata {
    writes: Mutex<Vec<SessionFieldsPatch>>,
}

#[async_trait]
impl SessionMetadataRepository for RecordingMetadata {
    async fn update_session_fields(
        &self,
        _session_id: &str,
        patch: SessionFieldsPatch,
    ) -> BridgeResult<()> {
        self.writes.lock().unwrap().push(patch);
        Err(BridgeError::Transport("metadata store unreachable".into()))
    }
}

#[core_async::test]
async fn injected_metadata_repository_failures_do_not_block_uploads() {
    let env = Env::new(true);
    let config = SyncConfig::builder()
        .database_path(":memory:")
        .upload_endpoint("https://storage.test")
        .http_client(http_client(env.backend.clone()))
        .network_monitor(env.network.clone())
        .build()
        .unwrap();
    let metadata = Arc::new(RecordingMetadata::default());

    let service = CaptureSyncService::bootstrap_with(
        config,
        SyncCollaborators::default().with_metadata_repository(metadata.clone()),
    )
    .await
    .unwrap();

    service
        .complete_session(TRAINER, "sess-1", recording(2048), "video/webm")
        .await
        .unwrap();
    assert!(service.queue_stats().await.unwrap().is_idle());
    service.shutdown().await;

    assert_eq!(env.backend.count(HttpMethod::Put), 1);
    assert_eq!(env.backend.count(HttpMethod::Patch), 0);
    assert_eq!(metadata.writes.lock().unwrap().len(), 3);
}

#[core_async::test]
async fn analysis_deadline_comes_from_config() {
    let env = Env::new(true);
    let config = SyncConfig::builder()
        .database_path(":memory:")
        .upload_endpoint("https://storage.test")
        .metadata_endpoint("https://db.test/v1")
        .http_client(http_client(env.backend.clone()))
        .network_monitor(env.network.clone())
        .analysis_timeout(Duration::from_millis(20))
        .build()
        .unwrap();
    let service = CaptureSyncService::bootstrap(config).await.unwrap();

    let quick = service.analyze_with_deadline(async { 3 }).await.unwrap();
    assert!(quick.is_completed());

    let slow = service
        .analyze_with_deadline(async {
            core_async::time::sleep(Duration::from_secs(30)).await;
            0
        })
        .await
        .unwrap();
    match slow {
        AnalysisOutcome::StillRunning(handle) => handle.abort(),
        AnalysisOutcome::Completed(_) => panic!("slow analysis should outlive the deadline"),
    }
}

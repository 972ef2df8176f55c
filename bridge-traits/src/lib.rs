//! # Host Bridge Traits
//!
//! Contracts between the capture sync core and whatever hosts it.
//!
//! ## Traits
//!
//! ### Sync collaborators
//! - [`BlobStore`](storage::BlobStore) - durable local video blobs keyed by session id
//! - [`ObjectUploader`](upload::ObjectUploader) - chunked resumable upload to object storage
//! - [`SessionMetadataRepository`](metadata::SessionMetadataRepository) - best-effort session record updates
//!
//! ### Platform integration
//! - [`HttpClient`](http::HttpClient) - async HTTP used by the object-storage provider
//! - [`NetworkMonitor`](network::NetworkMonitor) - connectivity checks before a drain
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - time source for deterministic backoff tests
//! - [`LoggerSink`](time::LoggerSink) - forward structured logs to host logging
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate | Status |
//! |----------|---------------------|--------|
//! | Desktop  | `bridge-desktop`    | ✅ In Progress |
//! | iOS      | TBD                 | 📋 Planned |
//! | Android  | TBD                 | 📋 Planned |
//!
//! ## Error Handling
//!
//! All bridge traits return [`BridgeError`](error::BridgeError). Upload
//! failures use the typed variants (`Unauthorized`, `InvalidArgument`,
//! `Transport`, `UnexpectedStatus`, `BlobMissing`) so the orchestrator can log
//! whether a failure is worth retrying.
//!
//! ## Thread Safety
//!
//! Every trait requires `Send + Sync`; implementations are shared behind
//! `Arc<dyn Trait>` across spawned tasks.

pub mod error;
pub mod http;
pub mod metadata;
pub mod network;
pub mod storage;
pub mod time;
pub mod upload;

pub use error::BridgeError;

pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use metadata::{SessionFieldsPatch, SessionMetadataRepository, SessionSyncStatus};
pub use network::{NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType};
pub use storage::BlobStore;
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, ManualClock, SystemClock};
pub use upload::{ObjectUploader, ProgressFn, UploadHandle};

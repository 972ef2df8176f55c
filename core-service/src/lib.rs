//! Capture sync service facade and bootstrap helpers.
//!
//! This crate wires the SQLite stores, the HTTP bindings and host-provided
//! bridge implementations (HTTP client, network monitor, clock) into one
//! [`CaptureSyncService`]. Desktop apps enable the `desktop-shims` feature,
//! which fills in a reqwest client and a socket-probing network monitor when
//! the host does not inject its own.
//!
//! ```rust,ignore
//! use core_service::CaptureSyncService;
//! use core_runtime::SyncConfig;
//!
//! let config = SyncConfig::builder()
//!     .database_path("/var/lib/capture/sync.db")
//!     .upload_endpoint("https://storage.example.com")
//!     .metadata_endpoint("https://api.example.com/v1")
//!     .build()?;
//! let service = CaptureSyncService::bootstrap(config).await?;
//! service.start("trainer-1").await?;
//! service
//!     .complete_session("trainer-1", "session-42", video, "video/webm")
//!     .await?;
//! ```

pub mod analysis;
pub mod error;
mod service;

pub use analysis::{run_with_deadline, AnalysisOutcome};
pub use error::{Result, ServiceError};
pub use service::{CaptureSyncService, SyncCollaborators};

#[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
pub use bridge_desktop::{DesktopNetworkMonitor, ManualNetworkMonitor, ReqwestHttpClient};

//! # Sync Configuration
//!
//! Builder-based configuration for the capture sync core. [`SyncConfig`]
//! carries the tunables of the upload queue plus the host capabilities the
//! core cannot provide itself.
//!
//! ## Required
//!
//! - `database_path` - SQLite file holding blobs and tasks (`:memory:` for tests)
//! - `NetworkMonitor` - injected, or the desktop probe with `desktop-shims`
//!
//! ## Optional
//!
//! - `HttpClient` - needed once an upload or metadata endpoint is configured
//!   (desktop default: reqwest)
//! - `LoggerSink` - mirrors logs into the host pipeline
//! - `Clock` - defaults to the system clock
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::SyncConfig;
//! use std::time::Duration;
//!
//! let config = SyncConfig::builder()
//!     .database_path("/data/capture/sync.db")
//!     .upload_endpoint("https://storage.example.com/upload/v1/b/captures")
//!     .metadata_endpoint("https://api.example.com/v1")
//!     .request_timeout(Duration::from_secs(30))
//!     .build()?;
//! ```
//!
//! ## Environment
//!
//! [`SyncConfigBuilder::from_env`] seeds a builder from `CAPTURE_SYNC_*`
//! variables; injected capabilities can still be added before `build()`.
//!
//! ## Error Handling
//!
//! `build()` fails fast with [`Error::Config`] for invalid values and
//! [`Error::CapabilityMissing`] when a required bridge is absent.

use crate::error::{Error, Result};
use bridge_traits::{Clock, HttpClient, LoggerSink, NetworkMonitor, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Upload attempts before a task is marked permanently failed.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Resumable uploads accept chunks in multiples of this size.
pub const CHUNK_GRANULARITY_BYTES: usize = 256 * 1024;

pub const DEFAULT_CHUNK_SIZE_BYTES: usize = 5 * 1024 * 1024;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(2);

pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(10 * 60);

/// Wall-clock ceiling the producer waits on AI analysis before releasing the UI.
pub const DEFAULT_ANALYSIS_TIMEOUT: Duration = Duration::from_secs(70);

pub const DEFAULT_ALLOWED_CONTENT_TYPES: &[&str] = &["video/webm", "video/mp4", "video/quicktime"];

const MAX_RETRIES_CEILING: u32 = 50;

pub const ENV_DATABASE_PATH: &str = "CAPTURE_SYNC_DATABASE_PATH";
pub const ENV_MAX_RETRIES: &str = "CAPTURE_SYNC_MAX_RETRIES";
pub const ENV_CHUNK_SIZE_BYTES: &str = "CAPTURE_SYNC_CHUNK_SIZE_BYTES";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "CAPTURE_SYNC_REQUEST_TIMEOUT_SECS";
pub const ENV_UPLOAD_ENDPOINT: &str = "CAPTURE_SYNC_UPLOAD_ENDPOINT";
pub const ENV_METADATA_ENDPOINT: &str = "CAPTURE_SYNC_METADATA_ENDPOINT";

/// `base * 2^(retry_count - 1)` capped at `max`; zero when nothing has failed yet.
pub fn exponential_backoff(base: Duration, max: Duration, retry_count: u32) -> Duration {
    if retry_count == 0 {
        return Duration::ZERO;
    }
    let factor = 2u32.saturating_pow(retry_count - 1);
    base.saturating_mul(factor).min(max)
}

/// Configuration for the capture sync core.
///
/// Use [`SyncConfig::builder`] to construct instances.
#[derive(Clone)]
pub struct SyncConfig {
    /// SQLite database file, or `:memory:`
    pub database_path: PathBuf,

    /// Failed attempts allowed before a task becomes permanently `failed`
    pub max_retries: u32,

    /// Bytes per upload chunk
    pub chunk_size_bytes: usize,

    /// Per-request ceiling for every upload and metadata call
    pub request_timeout: Duration,

    /// First retry delay; doubles per failed attempt
    pub backoff_base: Duration,

    /// Upper bound on the retry delay
    pub backoff_max: Duration,

    /// Video MIME types accepted for upload
    pub allowed_content_types: Vec<String>,

    pub analysis_timeout: Duration,

    /// Resumable upload endpoint (object bucket root)
    pub upload_endpoint: Option<String>,

    /// Session metadata REST endpoint
    pub metadata_endpoint: Option<String>,

    pub http_client: Option<Arc<dyn HttpClient>>,

    /// Connectivity source consulted before each queue drain (required)
    pub network_monitor: Arc<dyn NetworkMonitor>,

    pub logger_sink: Option<Arc<dyn LoggerSink>>,

    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncConfig")
            .field("database_path", &self.database_path)
            .field("max_retries", &self.max_retries)
            .field("chunk_size_bytes", &self.chunk_size_bytes)
            .field("request_timeout", &self.request_timeout)
            .field("backoff_base", &self.backoff_base)
            .field("backoff_max", &self.backoff_max)
            .field("allowed_content_types", &self.allowed_content_types)
            .field("analysis_timeout", &self.analysis_timeout)
            .field("upload_endpoint", &self.upload_endpoint)
            .field("metadata_endpoint", &self.metadata_endpoint)
            .field(
                "http_client",
                &self.http_client.as_ref().map(|_| "HttpClient { ... }"),
            )
            .field("network_monitor", &"NetworkMonitor { ... }")
            .field(
                "logger_sink",
                &self.logger_sink.as_ref().map(|_| "LoggerSink { ... }"),
            )
            .finish()
    }
}

impl SyncConfig {
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::default()
    }

    /// Build from `CAPTURE_SYNC_*` environment variables alone.
    pub fn from_env() -> Result<SyncConfig> {
        SyncConfigBuilder::from_env()?.build()
    }

    /// Whether `content_type` may be uploaded.
    pub fn accepts_content_type(&self, content_type: &str) -> bool {
        is_allowed_content_type(&self.allowed_content_types, content_type)
    }

    /// Delay before the next attempt after `retry_count` failures.
    ///
    /// `base * 2^(retry_count - 1)`, capped at `backoff_max`. Zero failures
    /// means no delay.
    pub fn backoff_for(&self, retry_count: u32) -> Duration {
        exponential_backoff(self.backoff_base, self.backoff_max, retry_count)
    }

    /// Checks value ranges and endpoint shape.
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if self.max_retries == 0 || self.max_retries > MAX_RETRIES_CEILING {
            return Err(Error::Config(format!(
                "max_retries must be between 1 and {MAX_RETRIES_CEILING}, got {}",
                self.max_retries
            )));
        }

        if self.chunk_size_bytes == 0 || self.chunk_size_bytes % CHUNK_GRANULARITY_BYTES != 0 {
            return Err(Error::Config(format!(
                "chunk_size_bytes must be a positive multiple of {CHUNK_GRANULARITY_BYTES}, got {}",
                self.chunk_size_bytes
            )));
        }

        if self.request_timeout.is_zero() {
            return Err(Error::Config(
                "request_timeout must be greater than zero".to_string(),
            ));
        }

        if self.analysis_timeout.is_zero() {
            return Err(Error::Config(
                "analysis_timeout must be greater than zero".to_string(),
            ));
        }

        if self.backoff_max < self.backoff_base {
            return Err(Error::Config(
                "backoff_max must be at least backoff_base".to_string(),
            ));
        }

        if self.allowed_content_types.is_empty() {
            return Err(Error::Config(
                "At least one allowed content type is required".to_string(),
            ));
        }

        for (name, endpoint) in [
            ("upload_endpoint", &self.upload_endpoint),
            ("metadata_endpoint", &self.metadata_endpoint),
        ] {
            if let Some(url) = endpoint {
                if !(url.starts_with("https://") || url.starts_with("http://")) {
                    return Err(Error::Config(format!(
                        "{name} must be an http(s) URL, got '{url}'"
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn network_monitor_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "NetworkMonitor".to_string(),
        message: "A NetworkMonitor is required so the queue is not drained while offline. \
                 Desktop: enable the 'desktop-shims' feature to use DesktopNetworkMonitor. \
                 Mobile: inject a monitor fed by the platform reachability API."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_network_monitor() -> Result<Arc<dyn NetworkMonitor>> {
    use bridge_desktop::DesktopNetworkMonitor;

    let monitor: Arc<dyn NetworkMonitor> = Arc::new(DesktopNetworkMonitor::new());
    Ok(monitor)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_network_monitor() -> Result<Arc<dyn NetworkMonitor>> {
    Err(network_monitor_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client(timeout: Duration) -> Result<Option<Arc<dyn HttpClient>>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::new(timeout).map_err(|e| Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: format!("Default reqwest client could not be created: {e}"),
    })?;
    let client: Arc<dyn HttpClient> = Arc::new(client);
    Ok(Some(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client(_timeout: Duration) -> Result<Option<Arc<dyn HttpClient>>> {
    Ok(None)
}

/// Builder for [`SyncConfig`].
#[derive(Default)]
pub struct SyncConfigBuilder {
    database_path: Option<PathBuf>,
    max_retries: Option<u32>,
    chunk_size_bytes: Option<usize>,
    request_timeout: Option<Duration>,
    backoff_base: Option<Duration>,
    backoff_max: Option<Duration>,
    allowed_content_types: Option<Vec<String>>,
    analysis_timeout: Option<Duration>,
    upload_endpoint: Option<String>,
    metadata_endpoint: Option<String>,
    http_client: Option<Arc<dyn HttpClient>>,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
    logger_sink: Option<Arc<dyn LoggerSink>>,
    clock: Option<Arc<dyn Clock>>,
}

impl SyncConfigBuilder {
    /// Seed a builder from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Seed a builder from any key lookup. Unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::default();

        if let Some(path) = lookup(ENV_DATABASE_PATH) {
            builder = builder.database_path(path);
        }
        if let Some(raw) = lookup(ENV_MAX_RETRIES) {
            builder = builder.max_retries(parse_number(ENV_MAX_RETRIES, &raw)?);
        }
        if let Some(raw) = lookup(ENV_CHUNK_SIZE_BYTES) {
            builder = builder.chunk_size_bytes(parse_number(ENV_CHUNK_SIZE_BYTES, &raw)?);
        }
        if let Some(raw) = lookup(ENV_REQUEST_TIMEOUT_SECS) {
            let secs: u64 = parse_number(ENV_REQUEST_TIMEOUT_SECS, &raw)?;
            builder = builder.request_timeout(Duration::from_secs(secs));
        }
        if let Some(url) = lookup(ENV_UPLOAD_ENDPOINT) {
            builder = builder.upload_endpoint(url);
        }
        if let Some(url) = lookup(ENV_METADATA_ENDPOINT) {
            builder = builder.metadata_endpoint(url);
        }

        Ok(builder)
    }

    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Default: 5
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Default: 5 MiB
    pub fn chunk_size_bytes(mut self, bytes: usize) -> Self {
        self.chunk_size_bytes = Some(bytes);
        self
    }

    /// Default: 60 seconds
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn backoff(mut self, base: Duration, max: Duration) -> Self {
        self.backoff_base = Some(base);
        self.backoff_max = Some(max);
        self
    }

    pub fn allowed_content_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_content_types = Some(types.into_iter().map(Into::into).collect());
        self
    }

    /// Default: 70 seconds
    pub fn analysis_timeout(mut self, timeout: Duration) -> Self {
        self.analysis_timeout = Some(timeout);
        self
    }

    pub fn upload_endpoint(mut self, url: impl Into<String>) -> Self {
        self.upload_endpoint = Some(url.into());
        self
    }

    pub fn metadata_endpoint(mut self, url: impl Into<String>) -> Self {
        self.metadata_endpoint = Some(url.into());
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn network_monitor(mut self, monitor: Arc<dyn NetworkMonitor>) -> Self {
        self.network_monitor = Some(monitor);
        self
    }

    pub fn logger_sink(mut self, sink: Arc<dyn LoggerSink>) -> Self {
        self.logger_sink = Some(sink);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Validate and assemble the configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] when `database_path` is missing or a value is out of range
    /// - [`Error::CapabilityMissing`] when no `NetworkMonitor` is available, or an
    ///   endpoint is configured without any `HttpClient`
    pub fn build(self) -> Result<SyncConfig> {
        let database_path = self.database_path.ok_or_else(|| {
            Error::Config("Database path is required. Use .database_path() to set it.".to_string())
        })?;

        let request_timeout = self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        let network_monitor = match self.network_monitor {
            Some(monitor) => monitor,
            None => provide_default_network_monitor()?,
        };

        let needs_http = self.upload_endpoint.is_some() || self.metadata_endpoint.is_some();
        let http_client = match self.http_client {
            Some(client) => Some(client),
            None if needs_http => provide_default_http_client(request_timeout)?,
            None => None,
        };

        if needs_http && http_client.is_none() {
            return Err(Error::CapabilityMissing {
                capability: "HttpClient".to_string(),
                message: "An upload or metadata endpoint is configured but no HttpClient was \
                          injected. Desktop: enable the 'desktop-shims' feature. \
                          Mobile: inject the platform HTTP adapter."
                    .to_string(),
            });
        }

        let config = SyncConfig {
            database_path,
            max_retries: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            chunk_size_bytes: self.chunk_size_bytes.unwrap_or(DEFAULT_CHUNK_SIZE_BYTES),
            request_timeout,
            backoff_base: self.backoff_base.unwrap_or(DEFAULT_BACKOFF_BASE),
            backoff_max: self.backoff_max.unwrap_or(DEFAULT_BACKOFF_MAX),
            allowed_content_types: self.allowed_content_types.unwrap_or_else(|| {
                DEFAULT_ALLOWED_CONTENT_TYPES
                    .iter()
                    .map(|t| t.to_string())
                    .collect()
            }),
            analysis_timeout: self.analysis_timeout.unwrap_or(DEFAULT_ANALYSIS_TIMEOUT),
            upload_endpoint: self.upload_endpoint,
            metadata_endpoint: self.metadata_endpoint,
            http_client,
            network_monitor,
            logger_sink: self.logger_sink,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        };

        config.validate()?;

        Ok(config)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim().parse().map_err(|_| Error::InvalidEnv {
        var: key.to_string(),
        value: raw.to_string(),
        message: "expected a whole number".to_string(),
    })
}

/// Media type without parameters: `video/webm;codecs=vp9` is `video/webm`.
pub fn content_type_essence(content_type: &str) -> &str {
    content_type.split(';').next().unwrap_or_default().trim()
}

/// Case-insensitive allow-list check on the essence of `content_type`.
pub fn is_allowed_content_type<S: AsRef<str>>(allowed: &[S], content_type: &str) -> bool {
    let essence = content_type_essence(content_type);
    !essence.is_empty()
        && allowed
            .iter()
            .any(|candidate| candidate.as_ref().eq_ignore_ascii_case(essence))
}

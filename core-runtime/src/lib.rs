//! # Core Runtime
//!
//! Foundational runtime infrastructure for the capture sync core:
//! - [`config`]: `SyncConfig` builder with fail-fast validation
//! - [`events`]: broadcast event bus carrying upload status and progress
//! - [`logging`]: `tracing` subscriber setup, host log sink bridging and redaction
//!
//! ## Overview
//!
//! Every other core crate depends on this one for its configuration values,
//! its observer channel and its logging conventions. Nothing here touches
//! storage or the network directly.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{SyncConfig, SyncConfigBuilder};
pub use error::{Error, Result};
pub use events::{CoreEvent, EventBus, EventStream, QueueEvent, UploadEvent};

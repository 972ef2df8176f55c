//! # Desktop Bridge Implementations
//!
//! Default implementations of the platform bridge traits for desktop hosts
//! (macOS, Windows, Linux):
//! - `HttpClient` using `reqwest`
//! - `NetworkMonitor` as a TCP reachability probe
//! - `NetworkMonitor` driven by the host (`ManualNetworkMonitor`), for apps
//!   that already receive OS connectivity callbacks
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{DesktopNetworkMonitor, ReqwestHttpClient};
//! use std::time::Duration;
//!
//! let http = ReqwestHttpClient::new(Duration::from_secs(60))?;
//! let network = DesktopNetworkMonitor::new();
//! ```

mod http;
mod network;

pub use http::ReqwestHttpClient;
pub use network::{DesktopNetworkMonitor, ManualNetworkMonitor};

//! Network Monitoring Implementations

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    network::{NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType},
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

const DEFAULT_PROBE: ([u8; 4], u16) = ([8, 8, 8, 8], 53);
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Desktop network monitor
///
/// Reachability is a TCP connect to a well-known address. It cannot tell
/// WiFi from Ethernet, so a connected link reports [`NetworkType::Other`].
#[derive(Debug, Clone)]
pub struct DesktopNetworkMonitor {
    probe_addr: SocketAddr,
}

impl DesktopNetworkMonitor {
    pub fn new() -> Self {
        Self {
            probe_addr: SocketAddr::from(DEFAULT_PROBE),
        }
    }

    /// Probe `addr` instead of the public default.
    pub fn with_probe_addr(mut self, addr: SocketAddr) -> Self {
        self.probe_addr = addr;
        self
    }

    async fn check_connectivity(&self) -> NetworkStatus {
        match core_async::time::timeout(
            PROBE_TIMEOUT,
            tokio::net::TcpStream::connect(self.probe_addr),
        )
        .await
        {
            Ok(Ok(_)) => NetworkStatus::Connected,
            Ok(Err(_)) | Err(_) => NetworkStatus::Disconnected,
        }
    }
}

impl Default for DesktopNetworkMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkMonitor for DesktopNetworkMonitor {
    async fn get_network_info(&self) -> Result<NetworkInfo> {
        let status = self.check_connectivity().await;
        debug!(status = ?status, "Network probe finished");

        Ok(match status {
            NetworkStatus::Connected => NetworkInfo::connected(NetworkType::Other),
            _ => NetworkInfo::disconnected(),
        })
    }
}

/// Network monitor whose state is pushed by the host.
///
/// Mobile and desktop shells usually already receive OS reachability
/// callbacks; they forward them through [`ManualNetworkMonitor::set`].
#[derive(Debug, Clone)]
pub struct ManualNetworkMonitor {
    state: watch::Sender<NetworkInfo>,
}

impl ManualNetworkMonitor {
    pub fn new(initial: NetworkInfo) -> Self {
        let (state, _) = watch::channel(initial);
        Self { state }
    }

    pub fn online() -> Self {
        Self::new(NetworkInfo::connected(NetworkType::WiFi))
    }

    pub fn offline() -> Self {
        Self::new(NetworkInfo::disconnected())
    }

    /// Replace the current state.
    pub fn set(&self, info: NetworkInfo) {
        self.state.send_if_modified(|current| {
            if *current == info {
                false
            } else {
                *current = info;
                true
            }
        });
    }

    pub fn set_online(&self, online: bool) {
        self.set(if online {
            NetworkInfo::connected(NetworkType::WiFi)
        } else {
            NetworkInfo::disconnected()
        });
    }
}

#[async_trait]
impl NetworkMonitor for ManualNetworkMonitor {
    async fn get_network_info(&self) -> Result<NetworkInfo> {
        Ok(self.state.borrow().clone())
    }
}

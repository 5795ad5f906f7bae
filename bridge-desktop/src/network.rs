//! Network Monitoring Implementation

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    network::{NetworkChangeStream, NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType},
};
use tracing::debug;

/// Desktop network monitor implementation
///
/// Provides basic network connectivity detection via a TCP reachability
/// probe. Platform-specific implementations (Linux netlink, macOS
/// SystemConfiguration, Windows WinAPI) would be more precise but require
/// additional dependencies.
pub struct DesktopNetworkMonitor {
    probe_addr: String,
}

impl DesktopNetworkMonitor {
    /// Create a new network monitor probing a well-known resolver.
    pub fn new() -> Self {
        Self {
            probe_addr: "8.8.8.8:53".to_string(),
        }
    }

    /// Create a monitor probing a custom address (for testing).
    pub fn with_probe_addr(probe_addr: impl Into<String>) -> Self {
        Self {
            probe_addr: probe_addr.into(),
        }
    }

    /// Check network connectivity by attempting a TCP connection
    async fn check_connectivity(&self) -> NetworkStatus {
        match tokio::time::timeout(
            std::time::Duration::from_secs(5),
            tokio::net::TcpStream::connect(&self.probe_addr),
        )
        .await
        {
            Ok(Ok(_)) => NetworkStatus::Connected,
            Ok(Err(_)) => NetworkStatus::Disconnected,
            Err(_) => NetworkStatus::Disconnected,
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

        let info = NetworkInfo {
            status,
            network_type: if status == NetworkStatus::Connected {
                // Desktop APIs don't cheaply distinguish WiFi from wired.
                Some(NetworkType::Other)
            } else {
                None
            },
            // Desktop connections are typically not metered
            is_metered: false,
            is_expensive: false,
        };

        debug!(status = ?status, "Network info updated");
        Ok(info)
    }

    async fn subscribe_changes(&self) -> Result<Box<dyn NetworkChangeStream>> {
        // Simple implementation: poll periodically. A production
        // implementation would use platform APIs to watch for changes.
        Ok(Box::new(DesktopNetworkChangeStream {
            monitor: DesktopNetworkMonitor::with_probe_addr(self.probe_addr.clone()),
            last_status: None,
        }))
    }
}

/// Network change stream that polls for changes
struct DesktopNetworkChangeStream {
    monitor: DesktopNetworkMonitor,
    last_status: Option<NetworkStatus>,
}

#[async_trait]
impl NetworkChangeStream for DesktopNetworkChangeStream {
    async fn next(&mut self) -> Option<NetworkInfo> {
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;

            if let Ok(info) = self.monitor.get_network_info().await {
                // Only return if status changed
                if self.last_status != Some(info.status) {
                    self.last_status = Some(info.status);
                    return Some(info);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_network_info() {
        let monitor = DesktopNetworkMonitor::new();
        let info = monitor.get_network_info().await.unwrap();

        assert!(matches!(
            info.status,
            NetworkStatus::Connected | NetworkStatus::Disconnected | NetworkStatus::Indeterminate
        ));
    }

    #[tokio::test]
    async fn test_unreachable_probe_is_disconnected() {
        // Reserved TEST-NET-1 address; nothing listens there.
        let monitor = DesktopNetworkMonitor::with_probe_addr("192.0.2.1:9");
        let info = monitor.get_network_info().await.unwrap();
        assert_eq!(info.status, NetworkStatus::Disconnected);
        assert!(info.network_type.is_none());
    }

    #[tokio::test]
    async fn test_local_probe_is_connected() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let monitor = DesktopNetworkMonitor::with_probe_addr(addr.to_string());
        assert!(monitor.is_connected().await);
    }
}

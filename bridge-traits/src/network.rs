//! Network Monitoring Abstraction
//!
//! Provides network connectivity and status information.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Network connection type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkType {
    /// Cellular/mobile data connection
    Cellular,
    /// WiFi connection
    WiFi,
    /// Ethernet connection
    Ethernet,
    /// Other or unknown connection type
    Other,
}

impl NetworkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkType::Cellular => "cellular",
            NetworkType::WiFi => "wifi",
            NetworkType::Ethernet => "ethernet",
            NetworkType::Other => "other",
        }
    }
}

/// Network connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkStatus {
    /// Connected to network
    Connected,
    /// Not connected to any network
    Disconnected,
    /// Connection status unknown or indeterminate
    Indeterminate,
}

/// Network information reported by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInfo {
    pub status: NetworkStatus,
    pub network_type: Option<NetworkType>,
    /// Whether the internet (not just the local link) is reachable, when known
    pub is_internet_reachable: Option<bool>,
    /// Whether the connection is metered (has data limits/costs)
    pub is_metered: bool,
}

impl NetworkInfo {
    /// Connected via the given network type, reachability unknown
    pub fn connected(network_type: NetworkType) -> Self {
        Self {
            status: NetworkStatus::Connected,
            network_type: Some(network_type),
            is_internet_reachable: None,
            is_metered: matches!(network_type, NetworkType::Cellular),
        }
    }

    /// No connection at all
    pub fn disconnected() -> Self {
        Self {
            status: NetworkStatus::Disconnected,
            network_type: None,
            is_internet_reachable: Some(false),
            is_metered: false,
        }
    }

    pub fn with_reachability(mut self, reachable: bool) -> Self {
        self.is_internet_reachable = Some(reachable);
        self
    }
}

/// Network monitor trait
///
/// Provides network connectivity information so the core can:
/// - Replay queued writes once connectivity returns
/// - Expose current state to the UI layer
///
/// # Platform Support
///
/// - **Desktop**: Reachability probe with periodic polling
/// - **iOS**: Network framework, Reachability
/// - **Android**: ConnectivityManager
///
/// # Example
///
/// ```ignore
/// use bridge_traits::network::NetworkMonitor;
///
/// async fn wait_for_change(monitor: &dyn NetworkMonitor) {
///     let mut changes = monitor.subscribe_changes().await?;
///     while let Some(info) = changes.next().await {
///         println!("network is now {:?}", info.status);
///     }
/// }
/// ```
#[async_trait]
pub trait NetworkMonitor: Send + Sync {
    /// Get current network information
    async fn get_network_info(&self) -> Result<NetworkInfo>;

    /// Subscribe to network status changes
    ///
    /// Returns a stream of network info updates. Implementations should
    /// emit an event whenever network status changes.
    async fn subscribe_changes(&self) -> Result<Box<dyn NetworkChangeStream>>;
}

/// Stream of network status changes
#[async_trait]
pub trait NetworkChangeStream: Send {
    /// Get the next network info update
    ///
    /// Returns `None` when the stream is closed.
    async fn next(&mut self) -> Option<NetworkInfo>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_info() {
        let info = NetworkInfo::connected(NetworkType::WiFi).with_reachability(true);

        assert_eq!(info.status, NetworkStatus::Connected);
        assert_eq!(info.network_type, Some(NetworkType::WiFi));
        assert_eq!(info.is_internet_reachable, Some(true));
        assert!(!info.is_metered);
    }

    #[test]
    fn test_cellular_is_metered() {
        assert!(NetworkInfo::connected(NetworkType::Cellular).is_metered);
        assert!(!NetworkInfo::disconnected().is_metered);
    }
}

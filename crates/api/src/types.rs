//! Wire types shared by the polling and push transports.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use warden_metrics::{MetricSnapshot, channels};

/// Current system-wide readings, as returned by the metrics endpoint and
/// carried by `metrics` push frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetrics {
    /// CPU usage percentage.
    pub cpu: f64,

    /// Memory usage percentage.
    pub memory: f64,

    /// Network throughput, when the backend reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkThroughput>,

    /// Disk usage split, when the backend reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_usage: Option<DiskUsage>,

    /// Total number of managed servers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_servers: Option<u32>,

    /// Number of servers currently running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running_servers: Option<u32>,

    /// Recent activity lines for the dashboard log.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recent_activity: Vec<String>,
}

impl SystemMetrics {
    /// Flattens the readings into per-channel values taken at `taken_at`
    /// (wall-clock milliseconds). Structured values become one channel per
    /// component; absent values contribute no channel.
    #[must_use]
    pub fn to_snapshot(&self, taken_at: u64) -> MetricSnapshot {
        let mut readings = BTreeMap::new();
        readings.insert(channels::CPU.to_owned(), self.cpu);
        readings.insert(channels::MEMORY.to_owned(), self.memory);
        if let Some(network) = &self.network {
            readings.insert(channels::NETWORK_DOWN.to_owned(), network.download);
            readings.insert(channels::NETWORK_UP.to_owned(), network.upload);
        }
        if let Some(disk) = &self.disk_usage {
            readings.insert(channels::DISK_USED.to_owned(), disk.used);
        }
        MetricSnapshot::new(taken_at, readings)
    }
}

/// Download/upload rates in Mbps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NetworkThroughput {
    /// Download rate.
    pub download: f64,

    /// Upload rate.
    pub upload: f64,
}

/// Used/free disk percentages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiskUsage {
    /// Percentage of disk in use.
    pub used: f64,

    /// Percentage of disk still free.
    pub free: f64,
}

/// Lifecycle state reported for a managed game server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerStatus {
    /// The server process is up.
    Running,

    /// The server process is down.
    Stopped,

    /// The server failed to start or crashed.
    Error,
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "Running"),
            Self::Stopped => write!(f, "Stopped"),
            Self::Error => write!(f, "Error"),
        }
    }
}

/// One managed game server, as returned by the server-list endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerDescriptor {
    /// Stable identifier used by the control endpoint.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Current lifecycle state.
    pub status: ServerStatus,

    /// CPU usage percentage.
    pub cpu: f64,

    /// Memory usage percentage.
    pub memory: f64,

    /// Disk usage percentage.
    pub disk: f64,

    /// Network throughput in Mbps.
    pub network: f64,

    /// Seconds since the server last started.
    #[serde(default)]
    pub uptime_seconds: u64,
}

/// Lifecycle command accepted by the control endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    /// Start the server process.
    Start,

    /// Stop the server process.
    Stop,

    /// Stop, then start the server process.
    Restart,
}

impl fmt::Display for ControlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::Stop => write!(f, "stop"),
            Self::Restart => write!(f, "restart"),
        }
    }
}

/// Body for the server-control endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlRequest {
    /// Target server.
    pub server_id: String,

    /// Command to run against it.
    pub action: ControlAction,
}

/// Body for creating a new managed server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateServerRequest {
    /// Display name for the new server.
    pub name: String,

    /// Steam application id of the game, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,

    /// Installation directory override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_dir: Option<String>,
}

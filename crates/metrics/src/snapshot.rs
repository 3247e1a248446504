//! Immutable set of metric readings received as a single unit.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Channel names produced by the transports for system-wide metrics.
pub mod channels {
    /// System CPU usage percentage.
    pub const CPU: &str = "cpu";

    /// System memory usage percentage.
    pub const MEMORY: &str = "memory";

    /// Network download rate in Mbps.
    pub const NETWORK_DOWN: &str = "networkDown";

    /// Network upload rate in Mbps.
    pub const NETWORK_UP: &str = "networkUp";

    /// Used disk percentage.
    pub const DISK_USED: &str = "diskUsed";
}

/// One complete set of metric readings, produced by either transport and
/// never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    taken_at: u64,
    channels: BTreeMap<String, f64>,
}

impl MetricSnapshot {
    /// Creates a snapshot taken at `taken_at` (wall-clock milliseconds).
    #[must_use]
    pub const fn new(taken_at: u64, channels: BTreeMap<String, f64>) -> Self {
        Self { taken_at, channels }
    }

    /// Wall-clock milliseconds when the readings were produced.
    #[must_use]
    pub const fn taken_at(&self) -> u64 {
        self.taken_at
    }

    /// The reading for one channel, if present.
    #[must_use]
    pub fn channel(&self, name: &str) -> Option<f64> {
        self.channels.get(name).copied()
    }

    /// All readings in channel-name order.
    pub fn channels(&self) -> impl Iterator<Item = (&str, f64)> {
        self.channels.iter().map(|(name, value)| (name.as_str(), *value))
    }

    /// Number of channels carried by this snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Whether the snapshot carries no readings at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

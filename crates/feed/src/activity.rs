//! Bounded ring of recent activity lines.

use std::collections::VecDeque;

/// Default number of retained activity entries, matching the dashboard's
/// visible log depth.
pub const DEFAULT_LOG_CAPACITY: usize = 100;

/// Keeps the newest activity entries, newest first. Recording beyond
/// capacity drops the oldest entry.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    entries: VecDeque<String>,
    capacity: usize,
}

impl ActivityLog {
    /// Creates a log retaining [`DEFAULT_LOG_CAPACITY`] entries.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }

    /// Creates a log retaining at most `capacity` entries.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be non-zero");
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Records one entry at the head of the log.
    pub fn record(&mut self, entry: impl Into<String>) {
        self.entries.push_front(entry.into());
        if self.entries.len() > self.capacity {
            self.entries.pop_back();
        }
    }

    /// Entries newest first.
    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    /// Number of retained entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new()
    }
}

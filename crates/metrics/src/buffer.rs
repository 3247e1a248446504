//! Rolling window of samples for a single metric channel.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Default number of samples retained per channel, matching the width of
/// the dashboard's time-series charts.
pub const DEFAULT_CAPACITY: usize = 20;

/// One reading of a metric channel at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Wall-clock milliseconds when the reading was taken.
    pub timestamp: u64,

    /// The reading itself.
    pub value: f64,
}

/// Bounded, ordered sequence of samples, oldest first.
///
/// Pushing beyond capacity evicts the single oldest sample. Producers
/// deliver timestamps in non-decreasing order; a push carrying the same
/// timestamp as the newest sample replaces it rather than growing the
/// window, so no two retained samples ever share a timestamp.
#[derive(Debug, Clone)]
pub struct TimeSeriesBuffer {
    samples: VecDeque<Sample>,
    capacity: usize,
}

impl TimeSeriesBuffer {
    /// Creates a buffer with [`DEFAULT_CAPACITY`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a buffer retaining at most `capacity` samples.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be non-zero");
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Inserts a sample, evicting the oldest one when full.
    pub fn push(&mut self, sample: Sample) {
        if let Some(last) = self.samples.back_mut() {
            if last.timestamp == sample.timestamp {
                *last = sample;
                return;
            }
        }

        self.samples.push_back(sample);
        if self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    /// Ordered view of the retained samples, oldest first.
    pub fn samples(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    /// Ordered copy of the retained samples for rendering.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Sample> {
        self.samples.iter().copied().collect()
    }

    /// The most recent sample, if any.
    #[must_use]
    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    /// Number of retained samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether no samples have been retained yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Maximum number of retained samples.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for TimeSeriesBuffer {
    fn default() -> Self {
        Self::new()
    }
}

//! Fan-in of snapshots to per-channel buffers, fan-out to subscribers.

use std::collections::HashMap;

use tracing::debug;
use uuid::Uuid;

use crate::{DEFAULT_CAPACITY, MetricSnapshot, Sample, TimeSeriesBuffer};

/// Handle identifying one registered subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

/// Callback invoked synchronously after each ingested snapshot, once every
/// channel buffer reflects it.
pub type Subscriber = Box<dyn Fn(&MetricsAggregator, &MetricSnapshot) + Send>;

/// Owns one rolling buffer per tracked metric channel and notifies
/// subscribers whenever a snapshot has been folded in.
///
/// Buffers are created lazily on first sight of a channel name and live
/// until the aggregator is dropped at dashboard teardown. All mutation
/// happens through [`ingest`](Self::ingest) on a single task; subscribers
/// therefore observe every update as atomic.
pub struct MetricsAggregator {
    series: HashMap<String, TimeSeriesBuffer>,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    channel_capacity: usize,
}

impl MetricsAggregator {
    /// Creates an aggregator whose channel buffers hold
    /// [`DEFAULT_CAPACITY`] samples.
    #[must_use]
    pub fn new() -> Self {
        Self::with_channel_capacity(DEFAULT_CAPACITY)
    }

    /// Creates an aggregator whose channel buffers hold `capacity` samples.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn with_channel_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be non-zero");
        Self {
            series: HashMap::new(),
            subscribers: Vec::new(),
            channel_capacity: capacity,
        }
    }

    /// Folds a snapshot into the per-channel buffers, then notifies
    /// subscribers in subscription order.
    ///
    /// Subscribers are only invoked after every channel present in the
    /// snapshot has been updated.
    pub fn ingest(&mut self, snapshot: &MetricSnapshot) {
        for (name, value) in snapshot.channels() {
            if !self.series.contains_key(name) {
                debug!(channel = name, "tracking new metric channel");
                self.series.insert(
                    name.to_owned(),
                    TimeSeriesBuffer::with_capacity(self.channel_capacity),
                );
            }
            if let Some(buffer) = self.series.get_mut(name) {
                buffer.push(Sample {
                    timestamp: snapshot.taken_at(),
                    value,
                });
            }
        }

        // Subscribers may read any series, so they run against a fully
        // updated aggregator. Taking the list out sidesteps the aliasing
        // between `&self` handed to callbacks and the subscriber storage.
        let subscribers = std::mem::take(&mut self.subscribers);
        for (_, subscriber) in &subscribers {
            subscriber(self, snapshot);
        }
        self.subscribers = subscribers;
    }

    /// Registers a subscriber; returns the id used to remove it later.
    pub fn subscribe(&mut self, subscriber: Subscriber) -> SubscriptionId {
        let id = SubscriptionId(Uuid::new_v4());
        self.subscribers.push((id, subscriber));
        id
    }

    /// Removes a subscriber. Returns whether it was registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(known, _)| *known != id);
        self.subscribers.len() != before
    }

    /// Ordered samples for one channel; unknown channels yield an empty
    /// sequence.
    #[must_use]
    pub fn get_series(&self, channel: &str) -> Vec<Sample> {
        self.series
            .get(channel)
            .map(TimeSeriesBuffer::to_vec)
            .unwrap_or_default()
    }

    /// The most recent sample for one channel, if any.
    #[must_use]
    pub fn latest(&self, channel: &str) -> Option<Sample> {
        self.series.get(channel).and_then(|b| b.latest().copied())
    }

    /// Names of all channels seen so far, in no particular order.
    pub fn channel_names(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MetricsAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsAggregator")
            .field("channels", &self.series.len())
            .field("subscribers", &self.subscribers.len())
            .field("channel_capacity", &self.channel_capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::channels;

    fn snapshot(taken_at: u64, readings: &[(&str, f64)]) -> MetricSnapshot {
        let channels: BTreeMap<String, f64> = readings
            .iter()
            .map(|(name, value)| ((*name).to_owned(), *value))
            .collect();
        MetricSnapshot::new(taken_at, channels)
    }

    #[test]
    fn test_ingest_creates_buffers_lazily() {
        let mut aggregator = MetricsAggregator::new();
        assert!(aggregator.get_series(channels::CPU).is_empty());

        aggregator.ingest(&snapshot(1, &[(channels::CPU, 50.0)]));

        assert_eq!(aggregator.get_series(channels::CPU).len(), 1);
        assert_eq!(
            aggregator.latest(channels::CPU),
            Some(Sample {
                timestamp: 1,
                value: 50.0
            })
        );
        // Unknown channels never fail, they just come back empty.
        assert!(aggregator.get_series(channels::MEMORY).is_empty());
    }

    #[test]
    fn test_subscriber_sees_all_buffers_updated() {
        let mut aggregator = MetricsAggregator::new();
        let observed: Arc<Mutex<Vec<(Vec<Sample>, Vec<Sample>)>>> =
            Arc::new(Mutex::new(Vec::new()));

        let sink = observed.clone();
        aggregator.subscribe(Box::new(move |aggregator, _| {
            sink.lock().unwrap().push((
                aggregator.get_series(channels::CPU),
                aggregator.get_series(channels::MEMORY),
            ));
        }));

        aggregator.ingest(&snapshot(
            10,
            &[(channels::CPU, 50.0), (channels::MEMORY, 60.0)],
        ));

        let observed = observed.lock().unwrap();
        assert_eq!(observed.len(), 1, "exactly one notification per ingest");
        let (cpu, memory) = &observed[0];
        assert_eq!(cpu.last().map(|s| s.value), Some(50.0));
        assert_eq!(memory.last().map(|s| s.value), Some(60.0));
    }

    #[test]
    fn test_subscribers_notified_in_subscription_order() {
        let mut aggregator = MetricsAggregator::new();
        let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second", "third"] {
            let sink = order.clone();
            aggregator.subscribe(Box::new(move |_, _| sink.lock().unwrap().push(name)));
        }

        aggregator.ingest(&snapshot(1, &[(channels::CPU, 1.0)]));

        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_unsubscribe_stops_notifications() {
        let mut aggregator = MetricsAggregator::new();
        let count = Arc::new(Mutex::new(0_u32));

        let sink = count.clone();
        let id = aggregator.subscribe(Box::new(move |_, _| *sink.lock().unwrap() += 1));

        aggregator.ingest(&snapshot(1, &[(channels::CPU, 1.0)]));
        assert!(aggregator.unsubscribe(id));
        assert!(!aggregator.unsubscribe(id));
        aggregator.ingest(&snapshot(2, &[(channels::CPU, 2.0)]));

        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn test_channel_capacity_applies_to_every_buffer() {
        let mut aggregator = MetricsAggregator::with_channel_capacity(2);
        for timestamp in 1..=4 {
            aggregator.ingest(&snapshot(timestamp, &[(channels::CPU, timestamp as f64)]));
        }

        let series = aggregator.get_series(channels::CPU);
        let timestamps: Vec<u64> = series.iter().map(|s| s.timestamp).collect();
        assert_eq!(timestamps, vec![3, 4]);
    }

    #[test]
    #[should_panic(expected = "capacity must be non-zero")]
    fn test_zero_channel_capacity_rejected() {
        let _ = MetricsAggregator::with_channel_capacity(0);
    }

    #[test]
    fn test_channel_names_cover_every_seen_channel() {
        let mut aggregator = MetricsAggregator::new();
        assert_eq!(aggregator.channel_names().count(), 0);

        aggregator.ingest(&snapshot(
            1,
            &[(channels::CPU, 1.0), (channels::MEMORY, 2.0)],
        ));

        let mut names: Vec<&str> = aggregator.channel_names().collect();
        names.sort_unstable();
        assert_eq!(names, vec![channels::CPU, channels::MEMORY]);
    }
}

//! Live dashboard feed: push-preferred metrics delivery with automatic
//! poll fallback, wired into the in-memory metrics history.
//!
//! [`MetricsChannel`] merges the WebSocket subscription and the HTTP
//! poller into one normalized stream of [`FeedEvent`]s. [`MetricsFeed`]
//! sits on top of the channel and keeps the [`MetricsAggregator`] and the
//! activity log current while forwarding every event to the consumer.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod activity;
mod channel;
mod poller;

pub use activity::{ActivityLog, DEFAULT_LOG_CAPACITY};
pub use channel::{ChannelConfig, MetricsChannel};

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::{Mutex, mpsc};
use url::Url;
use warden_api::{ApiClient, ServerDescriptor};
use warden_metrics::{MetricSnapshot, MetricsAggregator, Sample};
use warden_transport_ws::ConnectionState;

/// Normalized event emitted by the feed, regardless of which transport
/// produced it.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// A point-in-time reading across all metric channels.
    Snapshot(MetricSnapshot),

    /// The authoritative server list changed.
    Servers(Vec<ServerDescriptor>),

    /// A human-readable activity line.
    Log(String),

    /// The push subscription changed lifecycle state.
    Connection(ConnectionState),
}

/// Milliseconds since the Unix epoch, used to timestamp snapshots.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// The full client-side feed: channel, aggregator and activity log.
///
/// Every [`FeedEvent::Snapshot`] is ingested into the aggregator and
/// every [`FeedEvent::Log`] recorded in the activity log before the
/// event is forwarded, so render code can pull bounded history at any
/// time without replaying the stream.
pub struct MetricsFeed {
    channel: MetricsChannel,
    aggregator: Arc<Mutex<MetricsAggregator>>,
    activity: Arc<Mutex<ActivityLog>>,
}

impl MetricsFeed {
    /// Starts the feed and returns it together with the forwarded event
    /// stream.
    pub async fn start(
        api: ApiClient,
        push_url: Url,
        config: ChannelConfig,
    ) -> (Self, mpsc::Receiver<FeedEvent>) {
        let (channel, events) = MetricsChannel::start(api, push_url, config).await;
        Self::wrap(channel, events)
    }

    /// Wraps an already-started channel. Exposed for tests that inject a
    /// scripted push connector.
    pub fn wrap(
        channel: MetricsChannel,
        mut events: mpsc::Receiver<FeedEvent>,
    ) -> (Self, mpsc::Receiver<FeedEvent>) {
        let aggregator = Arc::new(Mutex::new(MetricsAggregator::new()));
        let activity = Arc::new(Mutex::new(ActivityLog::new()));

        let (forward_tx, forward_rx) = mpsc::channel(64);
        let agg = Arc::clone(&aggregator);
        let log = Arc::clone(&activity);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match &event {
                    FeedEvent::Snapshot(snapshot) => agg.lock().await.ingest(snapshot),
                    FeedEvent::Log(line) => log.lock().await.record(line.clone()),
                    FeedEvent::Connection(state) => {
                        log.lock().await.record(format!("Connection: {state}"));
                    }
                    FeedEvent::Servers(_) => {}
                }
                if forward_tx.send(event).await.is_err() {
                    break;
                }
            }
        });

        (
            Self {
                channel,
                aggregator,
                activity,
            },
            forward_rx,
        )
    }

    /// Bounded history for one metric channel, oldest first. Empty for
    /// channels no snapshot has carried yet.
    pub async fn get_series(&self, channel: &str) -> Vec<Sample> {
        self.aggregator.lock().await.get_series(channel)
    }

    /// Shared handle to the aggregator, for subscribers and ad-hoc reads.
    #[must_use]
    pub fn aggregator(&self) -> Arc<Mutex<MetricsAggregator>> {
        Arc::clone(&self.aggregator)
    }

    /// Recent activity lines, newest first.
    pub async fn activity(&self) -> Vec<String> {
        self.activity.lock().await.entries().map(str::to_owned).collect()
    }

    /// Current push lifecycle state.
    pub async fn connection_state(&self) -> ConnectionState {
        self.channel.connection_state().await
    }

    /// Spends a fresh push retry budget after exhaustion.
    pub async fn reconnect_push(&self) {
        self.channel.reconnect_push().await;
    }

    /// Stops both transports and closes the event stream.
    pub async fn stop(&self) {
        self.channel.stop().await;
    }
}

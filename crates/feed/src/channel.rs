//! Normalized metric event stream with push-preferred source selection.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;
use warden_api::{ApiClient, Frame};
use warden_transport_ws::{
    Config as PushConfig, ConnectionState, PushConnector, PushEvent, ReconnectingConnection,
    WsConnector,
};

use crate::poller::Poller;
use crate::{FeedEvent, now_ms};

/// Configuration for [`MetricsChannel`].
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// How often the fallback poller fetches while push is exhausted.
    pub poll_interval: Duration,

    /// Retry policy for the push subscription.
    pub push: PushConfig,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(2000),
            push: PushConfig::default(),
        }
    }
}

/// Single normalized source of dashboard events.
///
/// Prefers the push subscription. When its retry budget is exhausted the
/// fixed-interval poller takes over, so consumers keep receiving
/// snapshots either way. Recovery is deliberately manual: exhaustion
/// holds until [`reconnect_push`](Self::reconnect_push) spends a fresh
/// retry budget, and the poller stands down automatically once the
/// subscription is live again.
pub struct MetricsChannel {
    connection: Arc<ReconnectingConnection>,
    cancel: CancellationToken,
}

impl MetricsChannel {
    /// Starts the channel against real WebSocket push transport and
    /// returns the handle plus the normalized event stream.
    pub async fn start(
        api: ApiClient,
        push_url: Url,
        config: ChannelConfig,
    ) -> (Self, mpsc::Receiver<FeedEvent>) {
        Self::start_with_connector(Arc::new(WsConnector), api, push_url, config).await
    }

    /// Starts the channel with an injected push connector.
    pub async fn start_with_connector(
        connector: Arc<dyn PushConnector>,
        api: ApiClient,
        push_url: Url,
        config: ChannelConfig,
    ) -> (Self, mpsc::Receiver<FeedEvent>) {
        let (connection, push_events) =
            ReconnectingConnection::new(connector, push_url, config.push);
        let connection = Arc::new(connection);

        let (events_tx, events_rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        let poller = Poller::new(api.clone(), config.poll_interval, events_tx.clone());

        connection.connect().await;
        tokio::spawn(worker(push_events, events_tx, api, poller, cancel.clone()));

        (Self { connection, cancel }, events_rx)
    }

    /// Spends a fresh push retry budget after exhaustion. No-op while the
    /// subscription is live or connecting.
    pub async fn reconnect_push(&self) {
        self.connection.connect().await;
    }

    /// Current push lifecycle state.
    pub async fn connection_state(&self) -> ConnectionState {
        self.connection.state().await
    }

    /// Stops both sources and cancels every timer and pending reconnect,
    /// closing the event stream. Idempotent.
    pub async fn stop(&self) {
        self.cancel.cancel();
        self.connection.disconnect().await;
    }
}

async fn worker(
    mut push_events: mpsc::Receiver<PushEvent>,
    events: mpsc::Sender<FeedEvent>,
    api: ApiClient,
    mut poller: Poller,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            () = cancel.cancelled() => break,
            event = push_events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        match event {
            PushEvent::Frame(text) => handle_frame(&text, &api, &events).await,
            PushEvent::State(state) => {
                let _ = events.send(FeedEvent::Connection(state)).await;
                match state {
                    // Retry budget spent: the poller takes over.
                    ConnectionState::Exhausted => poller.start(),
                    // Push is live again: the fallback stands down.
                    ConnectionState::Connected => {
                        if poller.is_running() {
                            debug!("push restored, fallback poller standing down");
                        }
                        poller.stop();
                    }
                    ConnectionState::Connecting | ConnectionState::Disconnected => {}
                }
            }
        }
    }
    poller.stop();
}

async fn handle_frame(text: &str, api: &ApiClient, events: &mpsc::Sender<FeedEvent>) {
    match Frame::parse(text) {
        Ok(Some(Frame::Metrics(metrics))) => {
            for line in &metrics.recent_activity {
                let _ = events.send(FeedEvent::Log(line.clone())).await;
            }
            let snapshot = metrics.to_snapshot(now_ms());
            let _ = events.send(FeedEvent::Snapshot(snapshot)).await;
        }
        Ok(Some(Frame::ServerUpdate(Some(servers)))) => {
            let _ = events.send(FeedEvent::Servers(servers)).await;
        }
        Ok(Some(Frame::ServerUpdate(None))) => {
            // Update without a payload: fetch the fresh list ourselves.
            debug!("server update frame without payload, refetching list");
            match api.get_servers().await {
                Ok(servers) => {
                    let _ = events.send(FeedEvent::Servers(servers)).await;
                }
                Err(e) => warn!("server list refetch failed: {e}"),
            }
        }
        Ok(Some(Frame::Log(message))) => {
            let _ = events.send(FeedEvent::Log(message)).await;
        }
        // Unrecognized frame type; already logged at debug level.
        Ok(None) => {}
        // Malformed payloads are dropped without touching the
        // subscription lifecycle.
        Err(e) => warn!("dropping malformed push frame: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use warden_transport_ws::{Error as PushError, PushSocket};

    use super::*;

    struct StaticSocket {
        frames: std::vec::IntoIter<&'static str>,
    }

    #[async_trait]
    impl PushSocket for StaticSocket {
        async fn next_frame(&mut self) -> Option<Result<String, PushError>> {
            if let Some(frame) = self.frames.next() {
                return Some(Ok(frame.to_owned()));
            }
            // Stay open until the connection is torn down.
            std::future::pending().await
        }
    }

    /// Serves one scripted socket, then refuses further connects.
    struct StaticConnector {
        frames: StdMutex<Option<Vec<&'static str>>>,
    }

    #[async_trait]
    impl PushConnector for StaticConnector {
        async fn connect(&self, _url: &Url) -> Result<Box<dyn PushSocket>, PushError> {
            match self.frames.lock().unwrap().take() {
                Some(frames) => Ok(Box::new(StaticSocket {
                    frames: frames.into_iter(),
                })),
                None => Err(PushError::Connect("connection refused".to_owned())),
            }
        }
    }

    fn unused_api() -> ApiClient {
        ApiClient::new("http://127.0.0.1:9/api").unwrap()
    }

    fn push_url() -> Url {
        Url::parse("ws://127.0.0.1:9/ws").unwrap()
    }

    async fn start_static_channel(
        frames: Vec<&'static str>,
    ) -> (MetricsChannel, mpsc::Receiver<FeedEvent>) {
        let connector = Arc::new(StaticConnector {
            frames: StdMutex::new(Some(frames)),
        });
        MetricsChannel::start_with_connector(
            connector,
            unused_api(),
            push_url(),
            ChannelConfig::default(),
        )
        .await
    }

    #[tokio::test]
    async fn test_malformed_frame_dropped_without_lifecycle_change() {
        let (channel, mut events) = start_static_channel(vec![
            "definitely not json",
            r#"{"type": "metrics", "cpu": 55.0, "memory": 66.0}"#,
        ])
        .await;

        // The first payload event must come from the valid frame; the
        // malformed one produces nothing at all.
        let snapshot = loop {
            match events.recv().await.expect("event stream open") {
                FeedEvent::Snapshot(snapshot) => break snapshot,
                FeedEvent::Connection(_) => {}
                other => panic!("unexpected event before snapshot: {other:?}"),
            }
        };
        assert_eq!(snapshot.channel("cpu"), Some(55.0));
        assert_eq!(
            channel.connection_state().await,
            ConnectionState::Connected,
            "malformed frames must not trigger reconnection"
        );
    }

    #[tokio::test]
    async fn test_unknown_frame_type_ignored() {
        let (channel, mut events) = start_static_channel(vec![
            r#"{"type": "heartbeat"}"#,
            r#"{"type": "log", "message": "hello"}"#,
        ])
        .await;

        let line = loop {
            match events.recv().await.expect("event stream open") {
                FeedEvent::Log(line) => break line,
                FeedEvent::Connection(_) => {}
                other => panic!("unexpected event before log line: {other:?}"),
            }
        };
        assert_eq!(line, "hello");
        channel.stop().await;
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_closes_stream() {
        let (channel, mut events) = start_static_channel(vec![]).await;

        channel.stop().await;
        channel.stop().await;

        // Drain whatever was in flight; the stream must then end.
        while let Some(_event) = events.recv().await {}
        assert_eq!(
            channel.connection_state().await,
            ConnectionState::Disconnected
        );
    }
}

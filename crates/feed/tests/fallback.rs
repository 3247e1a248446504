//! Exercises the poll fallback and manual push recovery against an
//! in-process HTTP backend.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::{Json, Router, routing::get};
use serde_json::{Value, json};
use tokio::time::timeout;
use url::Url;
use warden_api::ApiClient;
use warden_feed::{ChannelConfig, FeedEvent, MetricsChannel};
use warden_transport_ws::{
    Config as PushConfig, ConnectionState, Error as PushError, PushConnector, PushSocket,
};

async fn metrics_handler() -> Json<Value> {
    Json(json!({
        "cpu": 41.5,
        "memory": 62.0,
        "recentActivity": ["server alpha started"],
    }))
}

async fn servers_handler() -> Json<Value> {
    Json(json!([{
        "id": "srv-1",
        "name": "alpha",
        "status": "Running",
        "cpu": 12.0,
        "memory": 30.0,
        "disk": 40.0,
        "network": 5.0,
    }]))
}

async fn spawn_backend() -> SocketAddr {
    let app = Router::new()
        .route("/api/metrics", get(metrics_handler))
        .route("/api/servers", get(servers_handler));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

struct IdleSocket;

#[async_trait]
impl PushSocket for IdleSocket {
    async fn next_frame(&mut self) -> Option<Result<String, PushError>> {
        std::future::pending().await
    }
}

/// Refuses the first `failures` connects, then serves idle sockets.
struct FlakyConnector {
    failures: u32,
    attempts: AtomicU32,
}

#[async_trait]
impl PushConnector for FlakyConnector {
    async fn connect(&self, _url: &Url) -> Result<Box<dyn PushSocket>, PushError> {
        if self.attempts.fetch_add(1, Ordering::SeqCst) < self.failures {
            return Err(PushError::Connect("connection refused".to_owned()));
        }
        Ok(Box::new(IdleSocket))
    }
}

async fn start_channel(
    addr: SocketAddr,
    failures: u32,
) -> (MetricsChannel, tokio::sync::mpsc::Receiver<FeedEvent>) {
    let api = ApiClient::new(&format!("http://{addr}/api")).unwrap();
    let connector = Arc::new(FlakyConnector {
        failures,
        attempts: AtomicU32::new(0),
    });
    let config = ChannelConfig {
        poll_interval: Duration::from_millis(50),
        push: PushConfig {
            retry_delay: Duration::from_millis(10),
            max_attempts: 2,
        },
    };
    MetricsChannel::start_with_connector(
        connector,
        api,
        Url::parse("ws://127.0.0.1:9/ws").unwrap(),
        config,
    )
    .await
}

#[tokio::test]
async fn test_poller_takes_over_after_push_exhaustion() {
    let _ = tracing_subscriber::fmt::try_init();
    let addr = spawn_backend().await;
    // Push never succeeds, so the retry budget is spent immediately.
    let (channel, mut events) = start_channel(addr, u32::MAX).await;

    let mut exhausted = false;
    let mut snapshot = None;
    let mut servers = None;
    let mut log_line = None;

    timeout(Duration::from_secs(5), async {
        while let Some(event) = events.recv().await {
            match event {
                FeedEvent::Connection(ConnectionState::Exhausted) => exhausted = true,
                FeedEvent::Snapshot(s) => snapshot = Some(s),
                FeedEvent::Servers(list) => servers = Some(list),
                FeedEvent::Log(line) => log_line = Some(line),
                FeedEvent::Connection(_) => {}
            }
            if exhausted && snapshot.is_some() && servers.is_some() && log_line.is_some() {
                break;
            }
        }
    })
    .await
    .expect("fallback data within timeout");

    let snapshot = snapshot.unwrap();
    assert_eq!(snapshot.channel("cpu"), Some(41.5));
    assert_eq!(snapshot.channel("memory"), Some(62.0));
    let servers = servers.unwrap();
    assert_eq!(servers.len(), 1);
    assert_eq!(servers[0].id, "srv-1");
    assert_eq!(log_line.unwrap(), "server alpha started");

    // Stop must end the stream and silence the poller.
    channel.stop().await;
    let drained = timeout(Duration::from_secs(2), async {
        while events.recv().await.is_some() {}
    })
    .await;
    assert!(drained.is_ok(), "event stream must close after stop");
}

#[tokio::test]
async fn test_manual_reconnect_stops_the_poller() {
    let _ = tracing_subscriber::fmt::try_init();
    let addr = spawn_backend().await;
    // Spend exactly one retry budget, then let reconnects succeed.
    let (channel, mut events) = start_channel(addr, 2).await;

    timeout(Duration::from_secs(5), async {
        while let Some(event) = events.recv().await {
            if matches!(event, FeedEvent::Connection(ConnectionState::Exhausted)) {
                break;
            }
        }
    })
    .await
    .expect("exhaustion within timeout");

    // The fallback is live now; wait for one polled snapshot.
    timeout(Duration::from_secs(5), async {
        while let Some(event) = events.recv().await {
            if matches!(event, FeedEvent::Snapshot(_)) {
                break;
            }
        }
    })
    .await
    .expect("polled snapshot within timeout");

    // A fresh budget brings push back up, which deactivates the poller.
    channel.reconnect_push().await;
    timeout(Duration::from_secs(5), async {
        while let Some(event) = events.recv().await {
            if matches!(event, FeedEvent::Connection(ConnectionState::Connected)) {
                break;
            }
        }
    })
    .await
    .expect("recovery within timeout");

    // The idle socket emits nothing, so once poll events in flight drain
    // out, the stream must fall silent.
    tokio::time::sleep(Duration::from_millis(200)).await;
    while let Ok(Some(_)) = timeout(Duration::from_millis(10), events.recv()).await {}

    let quiet = timeout(Duration::from_millis(300), events.recv()).await;
    assert!(
        quiet.is_err(),
        "no further events expected once push is live again"
    );
    assert_eq!(channel.connection_state().await, ConnectionState::Connected);

    channel.stop().await;
}

//! WebSocket push transport with bounded-retry reconnection.
//!
//! Wraps a client WebSocket subscription in a small state machine:
//! `Disconnected` to `Connecting` to `Connected`, back through
//! `Connecting` on close or error, and `Exhausted` once the retry budget
//! is spent. Consumers receive discrete [`PushEvent`]s over a channel
//! rather than wiring up raw socket callbacks, and the socket itself sits
//! behind the [`PushConnector`] seam so the state machine is testable
//! without network I/O.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// Lifecycle of the push subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No subscription and none being established.
    Disconnected,

    /// A connect attempt or retry wait is in progress.
    Connecting,

    /// The subscription is live and delivering frames.
    Connected,

    /// The retry budget is spent; no further attempt will be scheduled
    /// until [`ReconnectingConnection::connect`] is called again.
    Exhausted,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Exhausted => write!(f, "exhausted"),
        }
    }
}

/// Reconnection policy.
///
/// Deliberately a fixed delay rather than exponential backoff; the
/// dashboard favors predictable recovery over politeness to its own
/// backend.
#[derive(Debug, Clone)]
pub struct Config {
    /// Fixed delay between connect attempts.
    pub retry_delay: Duration,

    /// Consecutive failures tolerated before giving up with
    /// [`ConnectionState::Exhausted`].
    pub max_attempts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(5),
            max_attempts: 5,
        }
    }
}

/// Events emitted by [`ReconnectingConnection`].
#[derive(Debug, Clone)]
pub enum PushEvent {
    /// The connection moved to a new lifecycle state.
    State(ConnectionState),

    /// A text frame arrived on the live subscription.
    Frame(String),
}

/// One live push subscription delivering text frames.
#[async_trait]
pub trait PushSocket: Send {
    /// The next text frame, or `None` once the peer closed the
    /// subscription.
    async fn next_frame(&mut self) -> Option<Result<String, Error>>;
}

/// Opens push subscriptions. This is the seam reconnection logic is
/// driven through, so tests can substitute scripted connectors.
#[async_trait]
pub trait PushConnector: Send + Sync {
    /// Opens a subscription to `url`.
    ///
    /// # Errors
    ///
    /// Returns an error when the subscription cannot be established.
    async fn connect(&self, url: &Url) -> Result<Box<dyn PushSocket>, Error>;
}

/// [`PushConnector`] backed by a real client WebSocket.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl PushConnector for WsConnector {
    async fn connect(&self, url: &Url) -> Result<Box<dyn PushSocket>, Error> {
        debug!(%url, "connecting to push endpoint");
        let (stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| Error::Connect(e.to_string()))?;
        Ok(Box::new(WsSocket { stream }))
    }
}

struct WsSocket {
    stream: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
}

#[async_trait]
impl PushSocket for WsSocket {
    async fn next_frame(&mut self) -> Option<Result<String, Error>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(Message::Close(_)) => return None,
                // Binary, ping and pong frames are not part of the feed.
                Ok(_) => {}
                Err(e) => return Some(Err(Error::Stream(e.to_string()))),
            }
        }
    }
}

/// Push subscription wrapper with automatic bounded reconnection.
///
/// From `Connected`, a close or stream error moves back through
/// `Connecting` and costs one attempt; a successful open resets the
/// counter to zero. Spending the whole budget ends in `Exhausted`, which
/// is reported as a terminal event and holds until [`connect`] is called
/// again — the manual recovery path.
///
/// [`connect`]: Self::connect
pub struct ReconnectingConnection {
    connector: Arc<dyn PushConnector>,
    url: Url,
    config: Config,
    state: Arc<RwLock<ConnectionState>>,
    events: mpsc::Sender<PushEvent>,
    run: Mutex<Option<CancellationToken>>,
}

impl ReconnectingConnection {
    /// Creates the connection and the event stream consumers read from.
    /// Nothing happens until [`connect`](Self::connect) is called.
    #[must_use]
    pub fn new(
        connector: Arc<dyn PushConnector>,
        url: Url,
        config: Config,
    ) -> (Self, mpsc::Receiver<PushEvent>) {
        let (events, events_rx) = mpsc::channel(64);
        let connection = Self {
            connector,
            url,
            config,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            events,
            run: Mutex::new(None),
        };
        (connection, events_rx)
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Starts the subscription.
    ///
    /// No-op while a connect attempt is in progress or the subscription is
    /// live. From `Disconnected` or `Exhausted` this begins a fresh run
    /// with a zeroed attempt counter.
    pub async fn connect(&self) {
        {
            let state = self.state.read().await;
            if matches!(
                *state,
                ConnectionState::Connecting | ConnectionState::Connected
            ) {
                debug!(state = %*state, "connect ignored, subscription already active");
                return;
            }
        }

        let cancel = CancellationToken::new();
        {
            let mut run = self.run.lock().await;
            if let Some(previous) = run.take() {
                previous.cancel();
            }
            *run = Some(cancel.clone());
        }

        let worker = RunLoop {
            connector: self.connector.clone(),
            url: self.url.clone(),
            config: self.config.clone(),
            state: self.state.clone(),
            events: self.events.clone(),
            cancel,
        };
        tokio::spawn(worker.run());
    }

    /// Closes the subscription and cancels any pending scheduled retry, so
    /// no stale attempt fires after teardown.
    pub async fn disconnect(&self) {
        if let Some(run) = self.run.lock().await.take() {
            run.cancel();
        }
        *self.state.write().await = ConnectionState::Disconnected;
        let _ = self
            .events
            .send(PushEvent::State(ConnectionState::Disconnected))
            .await;
    }
}

impl fmt::Debug for ReconnectingConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconnectingConnection")
            .field("url", &self.url.as_str())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

struct RunLoop {
    connector: Arc<dyn PushConnector>,
    url: Url,
    config: Config,
    state: Arc<RwLock<ConnectionState>>,
    events: mpsc::Sender<PushEvent>,
    cancel: CancellationToken,
}

impl RunLoop {
    async fn transition(&self, next: ConnectionState) {
        // A cancelled worker must not publish state on top of a
        // disconnect that has already been reported.
        if self.cancel.is_cancelled() {
            return;
        }
        *self.state.write().await = next;
        let _ = self.events.send(PushEvent::State(next)).await;
    }

    async fn run(self) {
        let mut attempts: u32 = 0;
        self.transition(ConnectionState::Connecting).await;
        loop {
            let attempt = tokio::select! {
                () = self.cancel.cancelled() => return,
                result = self.connector.connect(&self.url) => result,
            };

            match attempt {
                Ok(socket) => {
                    attempts = 0;
                    info!("push subscription established");
                    self.transition(ConnectionState::Connected).await;
                    self.pump(socket).await;
                    if self.cancel.is_cancelled() {
                        return;
                    }
                    // Losing a live subscription costs one attempt, the
                    // same as a failed connect, and is reported before
                    // the retry wait rather than after it.
                    attempts += 1;
                    self.transition(ConnectionState::Connecting).await;
                }
                Err(e) => {
                    warn!("push connect failed: {e}");
                    attempts += 1;
                }
            }

            if attempts >= self.config.max_attempts {
                warn!(attempts, "push retry budget spent, giving up");
                self.transition(ConnectionState::Exhausted).await;
                return;
            }

            debug!(attempt = attempts, "scheduling push reconnect");
            tokio::select! {
                () = self.cancel.cancelled() => return,
                () = tokio::time::sleep(self.config.retry_delay) => {}
            }
        }
    }

    /// Forwards frames until the subscription drops or we are cancelled.
    async fn pump(&self, mut socket: Box<dyn PushSocket>) {
        loop {
            let frame = tokio::select! {
                () = self.cancel.cancelled() => return,
                frame = socket.next_frame() => frame,
            };
            match frame {
                Some(Ok(text)) => {
                    let _ = self.events.send(PushEvent::Frame(text)).await;
                }
                Some(Err(e)) => {
                    warn!("push stream error: {e}");
                    return;
                }
                None => {
                    info!("push subscription closed by peer");
                    return;
                }
            }
        }
    }
}

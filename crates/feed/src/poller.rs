//! Fixed-interval fallback poller for metrics and the server list.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use warden_api::ApiClient;

use crate::{FeedEvent, now_ms};

/// Pull-based metrics source.
///
/// On a fixed timer, fetches the current metrics and the server list and
/// emits them as feed events. A failed fetch is transient: it is logged
/// and skipped, and the timer keeps running.
#[derive(Debug)]
pub(crate) struct Poller {
    api: ApiClient,
    period: Duration,
    events: mpsc::Sender<FeedEvent>,
    run: Option<CancellationToken>,
}

impl Poller {
    pub(crate) const fn new(
        api: ApiClient,
        period: Duration,
        events: mpsc::Sender<FeedEvent>,
    ) -> Self {
        Self {
            api,
            period,
            events,
            run: None,
        }
    }

    /// Starts polling. The first fetch fires immediately, so consumers see
    /// data within one period of fallback activation. No-op while running.
    pub(crate) fn start(&mut self) {
        if self.run.is_some() {
            return;
        }
        debug!(period_ms = self.period.as_millis() as u64, "starting poller");

        let cancel = CancellationToken::new();
        self.run = Some(cancel.clone());

        let api = self.api.clone();
        let events = self.events.clone();
        let period = self.period;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => return,
                    _ = ticker.tick() => poll_once(&api, &events).await,
                }
            }
        });
    }

    /// Stops polling and releases the timer. Idempotent.
    pub(crate) fn stop(&mut self) {
        if let Some(run) = self.run.take() {
            debug!("stopping poller");
            run.cancel();
        }
    }

    pub(crate) const fn is_running(&self) -> bool {
        self.run.is_some()
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn poll_once(api: &ApiClient, events: &mpsc::Sender<FeedEvent>) {
    match api.get_metrics().await {
        Ok(metrics) => {
            for line in &metrics.recent_activity {
                let _ = events.send(FeedEvent::Log(line.clone())).await;
            }
            let snapshot = metrics.to_snapshot(now_ms());
            let _ = events.send(FeedEvent::Snapshot(snapshot)).await;
        }
        Err(e) => warn!("metrics poll failed: {e}"),
    }

    match api.get_servers().await {
        Ok(servers) => {
            let _ = events.send(FeedEvent::Servers(servers)).await;
        }
        Err(e) => warn!("server list poll failed: {e}"),
    }
}

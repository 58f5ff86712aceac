//! # LogWriter: renders engine host events through `tracing`.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! INFO imehost::log: engine starting seq=0
//! INFO imehost::log: engine ready seq=1
//! DEBUG imehost::log: engine pushed topic="commit" payload="你好"
//! INFO imehost::log: client connected client="keyboard" clients=1
//! WARN imehost::log: jobs abandoned count=2 labels="sync-clipboard,refresh"
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber (target `imehost::log`).
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let client = e.client.as_deref().unwrap_or("unknown");
        let reason = e.reason.as_deref().unwrap_or("");
        match e.kind {
            EventKind::EngineStarting => {
                tracing::info!(target: "imehost::log", seq = e.seq, "engine starting");
            }
            EventKind::EngineReady => {
                tracing::info!(target: "imehost::log", seq = e.seq, "engine ready");
            }
            EventKind::EngineStopping => {
                tracing::info!(target: "imehost::log", seq = e.seq, "engine stopping");
            }
            EventKind::EngineStopped => {
                tracing::info!(target: "imehost::log", seq = e.seq, "engine stopped");
            }
            EventKind::EngineCrashed => {
                tracing::error!(target: "imehost::log", seq = e.seq, reason, "engine crashed");
            }
            EventKind::EnginePushed => {
                tracing::debug!(
                    target: "imehost::log",
                    topic = e.topic.as_deref().unwrap_or(""),
                    payload = e.payload.as_deref().unwrap_or(""),
                    "engine pushed"
                );
            }
            EventKind::EngineEventDropped => {
                tracing::warn!(
                    target: "imehost::log",
                    topic = e.topic.as_deref().unwrap_or(""),
                    "engine event dropped"
                );
            }
            EventKind::ClientConnected => {
                tracing::info!(target: "imehost::log", client, clients = e.count, "client connected");
            }
            EventKind::ClientDisconnected => {
                tracing::info!(target: "imehost::log", client, clients = e.count, "client disconnected");
            }
            EventKind::JobsAbandoned => {
                tracing::warn!(target: "imehost::log", count = e.count, labels = reason, "jobs abandoned");
            }
            EventKind::SubscriberOverflow => {
                tracing::warn!(target: "imehost::log", subscriber = client, reason, "subscriber overflow");
            }
            EventKind::SubscriberPanicked => {
                tracing::error!(target: "imehost::log", subscriber = client, info = reason, "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}

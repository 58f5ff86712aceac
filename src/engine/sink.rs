//! # Engine callback queue.
//!
//! The native engine reports events through [`EventSink::deliver`] on the worker
//! thread. The sink only does a `try_send` into a bounded queue; a separate
//! forwarder task drains that queue into the [`Bus`]. A slow subscriber therefore
//! never extends the time the engine thread is blocked.
//!
//! ```text
//! engine thread ── deliver() ──► [bounded mpsc] ──► forward() task ──► Bus
//!                     │ full
//!                     └──► EngineEventDropped
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::events::{Bus, Event, EventKind};

/// One event pushed by the native engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineEvent {
    pub topic: Arc<str>,
    pub payload: Arc<str>,
}

/// Callback handle given to the binding on start.
#[derive(Clone, Debug)]
pub struct EventSink {
    tx: mpsc::Sender<EngineEvent>,
    bus: Bus,
}

impl EventSink {
    /// Queues an engine event for broadcast. Never blocks.
    ///
    /// Returns `false` if the event was dropped (queue full or forwarder gone).
    pub fn deliver(&self, topic: impl Into<Arc<str>>, payload: impl Into<Arc<str>>) -> bool {
        let ev = EngineEvent {
            topic: topic.into(),
            payload: payload.into(),
        };
        match self.tx.try_send(ev) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(ev)) => {
                tracing::warn!(topic = %ev.topic, "engine event queue full, dropping event");
                self.bus
                    .publish(Event::new(EventKind::EngineEventDropped).with_topic(ev.topic));
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

/// Creates a sink and the receiving half for [`forward`].
pub(crate) fn channel(capacity: usize, bus: Bus) -> (EventSink, mpsc::Receiver<EngineEvent>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSink { tx, bus }, rx)
}

/// Drains engine events into the bus until every sink is dropped.
pub(crate) async fn forward(mut rx: mpsc::Receiver<EngineEvent>, bus: Bus) {
    while let Some(ev) = rx.recv().await {
        bus.publish(
            Event::new(EventKind::EnginePushed)
                .with_topic(ev.topic)
                .with_payload(ev.payload),
        );
    }
}

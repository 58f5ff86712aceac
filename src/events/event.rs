//! # Events emitted by the engine host.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Lifecycle events**: engine state changes (starting, ready, stopping, stopped)
//! - **Engine events**: data pushed by the native engine through its callback
//! - **Client events**: clients attaching to / detaching from the shared engine
//! - **Diagnostic events**: abandoned jobs, dropped engine events, subscriber trouble
//!
//! The [`Event`] struct carries additional metadata such as timestamps, client id,
//! engine topic and payload.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use imehost::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::EnginePushed)
//!     .with_topic("commit")
//!     .with_payload("你好");
//!
//! assert_eq!(ev.kind, EventKind::EnginePushed);
//! assert_eq!(ev.topic.as_deref(), Some("commit"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::engine::EngineState;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of engine host events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Lifecycle events ===
    /// Engine worker is starting the native engine.
    EngineStarting,

    /// Native engine finished starting and accepts jobs.
    EngineReady,

    /// Engine worker is shutting the native engine down.
    EngineStopping,

    /// Native engine stopped; the worker thread is exiting.
    EngineStopped,

    /// The binding panicked; the engine went straight to `Stopped`.
    ///
    /// Sets:
    /// - `reason`: panic message
    EngineCrashed,

    // === Engine-originated events ===
    /// Data pushed by the native engine.
    ///
    /// Sets:
    /// - `topic`: engine event type
    /// - `payload`: engine event data
    EnginePushed,

    /// Engine event dropped because the engine → forwarder queue was full.
    ///
    /// Sets:
    /// - `topic`: type of the dropped event
    EngineEventDropped,

    // === Client events ===
    /// A new client attached to the shared engine.
    ///
    /// Sets:
    /// - `client`: client id
    /// - `count`: number of clients after attaching
    ClientConnected,

    /// A client detached from the shared engine.
    ///
    /// Sets:
    /// - `client`: client id
    /// - `count`: number of clients after detaching
    ClientDisconnected,

    /// Jobs were still queued when the engine stopped and were never executed.
    ///
    /// Sets:
    /// - `count`: number of abandoned jobs
    /// - `reason`: labels of the abandoned jobs
    JobsAbandoned,

    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `client`: subscriber name
    /// - `reason`: panic message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `client`: subscriber name
    /// - `reason`: "full" or "closed"
    SubscriberOverflow,
}

impl EventKind {
    /// Event emitted when the lifecycle enters `state`.
    pub fn for_state(state: EngineState) -> Self {
        match state {
            EngineState::Starting => EventKind::EngineStarting,
            EngineState::Ready => EventKind::EngineReady,
            EngineState::Stopping => EventKind::EngineStopping,
            EngineState::Stopped => EventKind::EngineStopped,
        }
    }
}

/// Engine host event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Client (or subscriber) the event refers to.
    pub client: Option<Arc<str>>,
    /// Engine event type for engine-originated events.
    pub topic: Option<Arc<str>>,
    /// Engine event data.
    pub payload: Option<Arc<str>>,
    /// Human-readable reason (overflow details, abandoned job labels, ...).
    pub reason: Option<Arc<str>>,
    /// Counter attached to the event (clients, abandoned jobs).
    pub count: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            client: None,
            topic: None,
            payload: None,
            reason: None,
            count: None,
        }
    }

    #[inline]
    pub fn with_client(mut self, client: impl Into<Arc<str>>) -> Self {
        self.client = Some(client.into());
        self
    }

    #[inline]
    pub fn with_topic(mut self, topic: impl Into<Arc<str>>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    #[inline]
    pub fn with_payload(mut self, payload: impl Into<Arc<str>>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a counter (saturating at `u32::MAX`).
    #[inline]
    pub fn with_count(mut self, n: usize) -> Self {
        self.count = Some(u32::try_from(n).unwrap_or(u32::MAX));
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_client(subscriber)
            .with_reason(reason)
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_client(subscriber)
            .with_reason(info)
    }

    /// True for lifecycle state-change events.
    #[inline]
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self.kind,
            EventKind::EngineStarting
                | EventKind::EngineReady
                | EventKind::EngineStopping
                | EventKind::EngineStopped
        )
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }
}

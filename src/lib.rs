//! # imehost
//!
//! **imehost** hosts one native, non-thread-safe input-method engine on behalf
//! of many UI components (keyboard view, candidate bar, settings page).
//!
//! The engine runs on a dedicated worker thread and is only ever touched there.
//! Clients attach by id; the engine is started for the first client and stopped
//! after the last one leaves. Work is sent as closures and runs in submission
//! order between two turns of the engine's own message loop.
//!
//! ## Architecture
//! ```text
//!  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!  │  Connection  │   │  Connection  │   │  Connection  │
//!  │  ("keyboard")│   │  ("bar")     │   │ ("settings") │
//!  └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!         │ run_immediately / run_on_ready / run_if_ready
//!         ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────┐
//! │  Daemon (client registry, refcounted start/stop)              │
//! │  - Dispatcher (job queue + worker thread)                     │
//! │  - Lifecycle  (Stopped → Starting → Ready → Stopping)         │
//! └──────┬───────────────────────────────────────────────┬────────┘
//!        ▼                                               │
//!  ┌───────────────────────────────┐                     │ lifecycle,
//!  │ worker thread                 │                     │ client events
//!  │   binding.start(cfg, sink)    │                     │
//!  │   loop { pump_once(); jobs }  │── EventSink ──► [bounded queue]
//!  │   binding.stop()              │                     │   │ forwarder
//!  └───────────────────────────────┘                     ▼   ▼
//! ┌───────────────────────────────────────────────────────────────┐
//! │                   Bus (broadcast channel)                     │
//! └───────────────────────────────┬───────────────────────────────┘
//!                                 ▼
//!                     subscriber_listener ──► SubscriberSet
//!                                              ┌─────┼─────┐
//!                                              ▼     ▼     ▼
//!                                           sub1  sub2  subN
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                          |
//! |-------------------|--------------------------------------------------------------|---------------------------------------------|
//! | **Clients**       | Attach/detach clients, engine runs while any is attached.    | [`Daemon`], [`Connection`]                  |
//! | **Engine**        | Contract for native engine adapters.                         | [`EngineBinding`], [`WakeHandle`]           |
//! | **Dispatch**      | Serialized calls into the engine thread.                     | [`Dispatcher`], [`AbandonedJob`]            |
//! | **Lifecycle**     | Engine state machine with observers.                         | [`Lifecycle`], [`EngineState`]              |
//! | **Cursor**        | Reconciles predicted and confirmed cursor positions.         | [`CursorTracker`], [`CursorRange`]          |
//! | **Events**        | Broadcast stream of host events, subscriber fan-out.         | [`Event`], [`Subscribe`]                    |
//! | **Errors**        | Typed errors with stable labels.                             | [`EngineError`], [`LifecycleError`]         |
//! | **Configuration** | Host and engine settings.                                    | [`Config`], [`EngineConfig`]                |
//!
//! ## Optional features
//! - `logging` (default): exports the built-in [`LogWriter`] subscriber.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use imehost::{BindingFactory, Config, DaemonBuilder, EngineBinding, EngineConfig, EventSink, WakeHandle};
//!
//! struct Echo {
//!     sink: Option<EventSink>,
//!     text: String,
//! }
//!
//! impl EngineBinding for Echo {
//!     fn start(&mut self, _config: &EngineConfig, sink: EventSink) {
//!         self.sink = Some(sink);
//!     }
//!     fn stop(&mut self) {
//!         self.sink = None;
//!     }
//!     fn pump_once(&mut self) {
//!         std::thread::sleep(Duration::from_millis(5));
//!     }
//!     fn wake_handle(&self) -> WakeHandle {
//!         WakeHandle::new(|| {})
//!     }
//! }
//!
//! #[tokio::main(flavor = "multi_thread")]
//! async fn main() -> Result<(), imehost::EngineError> {
//!     let factory: BindingFactory<Echo> = Arc::new(|| Echo { sink: None, text: String::new() });
//!     let daemon = DaemonBuilder::new(Config::default()).build(factory);
//!
//!     let keyboard = daemon.connect("keyboard")?;
//!     let len = keyboard
//!         .run_on_ready(|engine: &mut Echo| {
//!             engine.text.push_str("ni");
//!             Ok(engine.text.len())
//!         })
//!         .await?;
//!     assert_eq!(len, 2);
//!
//!     daemon.disconnect("keyboard")?;
//!     Ok(())
//! }
//! ```
mod core;
mod cursor;
mod engine;
mod error;
mod events;
mod subscribers;

// ---- Public re-exports ----

pub use core::{Config, Connection, Daemon, DaemonBuilder};
pub use cursor::{CursorRange, CursorTracker, Reconciled};
pub use engine::{
    AbandonedJob, BindingFactory, Dispatcher, EngineBinding, EngineConfig, EngineEvent, EngineState,
    EventSink, Lifecycle, LifecycleEvent, LifecycleObserver, ObserverId, WakeHandle,
};
pub use error::{EngineError, LifecycleError, PredictionMismatch};
pub use events::{Bus, Event, EventKind};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: expose the built-in logger subscriber.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;

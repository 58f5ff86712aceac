//! # Event subscribers for the engine host.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out
//! and built-in implementations for handling events broadcast through the
//! [`Bus`](crate::events::Bus).
//!
//! ## Architecture
//! ```text
//! engine worker / lifecycle / daemon ── publish(Event) ──► Bus
//!                                                           │
//!                                          daemon listener ◄┘
//!                                                 │
//!                                          SubscriberSet::emit()
//!                                      ┌──────────┼──────────┐
//!                                      ▼          ▼          ▼
//!                                  LogWriter   candidate   toolbar ...
//!                                              view sync
//! ```
//!
//! ## Implementing custom subscribers
//! ```no_run
//! use imehost::{Event, EventKind, Subscribe};
//! use async_trait::async_trait;
//!
//! struct CommitCounter;
//!
//! #[async_trait]
//! impl Subscribe for CommitCounter {
//!     async fn on_event(&self, event: &Event) {
//!         if event.kind == EventKind::EnginePushed && event.topic.as_deref() == Some("commit") {
//!             // update counters...
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str {
//!         "commit-counter"
//!     }
//! }
//! ```

mod embedded;
mod set;
mod subscribe;

#[cfg(feature = "logging")]
pub use embedded::LogWriter;
pub(crate) use set::panic_message;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;

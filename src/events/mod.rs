//! Engine host events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to events emitted by the engine worker, the lifecycle,
//! the connection daemon and subscriber workers.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: lifecycle observer (state changes), engine event forwarder
//!   (engine-pushed data), `Daemon` (client attach/detach, abandoned jobs),
//!   `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: `Daemon::subscribe()` receivers and the daemon's own
//!   listener that fans out to the `SubscriberSet`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};

//! Host core: client bookkeeping on top of the engine dispatcher.
//!
//! The public API from this module is [`Daemon`] (built with [`DaemonBuilder`])
//! and the per-client [`Connection`] it hands out.
//!
//! Internal modules:
//! - [`daemon`]: reference-counted engine start/stop and client events;
//! - [`connection`]: the three ways a client runs work on the engine;
//! - [`registry`]: attached clients and their cancellation tokens;
//! - [`builder`]: wiring of bus, subscribers, lifecycle and dispatcher;
//! - [`config`]: host settings.

mod builder;
mod config;
mod connection;
mod daemon;
mod registry;

pub use builder::DaemonBuilder;
pub use config::Config;
pub use connection::Connection;
pub use daemon::Daemon;

//! # Built-in subscribers
//!
//! - [`LogWriter`]: renders events through `tracing` (debug/diagnostics).

#[cfg(feature = "logging")]
mod log;

#[cfg(feature = "logging")]
pub use log::LogWriter;

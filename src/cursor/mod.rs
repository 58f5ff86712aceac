//! Cursor reconciliation for the text-editing surface.
//!
//! Edits the host makes to the text surface are applied asynchronously, so the
//! host keeps a queue of locally predicted cursor ranges and reconciles it with
//! the confirmations the surface reports later.
//!
//! ## Contents
//! - [`CursorRange`] normalized `(start, end)` selection
//! - [`CursorTracker`] confirmed range plus FIFO of predictions

mod range;
mod tracker;

pub use range::CursorRange;
pub use tracker::{CursorTracker, Reconciled};

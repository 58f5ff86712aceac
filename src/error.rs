//! Error types used by the engine host.
//!
//! This module defines the error enums raised by the core:
//!
//! - [`EngineError`]: errors raised by the dispatch path and the connection daemon.
//! - [`LifecycleError`]: invalid engine lifecycle transitions (always fatal).
//! - [`PredictionMismatch`]: non-fatal cursor reconciliation inconsistency.
//!
//! All types provide helper methods (`as_label`, `as_message`) for logging/metrics
//! and [`EngineError::is_fatal`] to tell programming errors from transient failures.

use thiserror::Error;

use crate::cursor::CursorRange;
use crate::engine::{EngineState, LifecycleEvent};

/// # Errors produced by the dispatch path and the connection daemon.
///
/// Fatal variants (`EngineAlreadyRunning`, `ReentrantDispatch`) signal a bug in
/// the layer above the core and are never retried.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Operation attempted with zero active clients (or on a disconnected connection).
    #[error("engine is not running")]
    EngineNotRunning,

    /// Duplicate start attempted directly on a running dispatcher.
    #[error("engine is already running")]
    EngineAlreadyRunning,

    /// Job submitted after shutdown has begun, or discarded by a stop.
    #[error("dispatch rejected: engine is shutting down")]
    DispatchRejected,

    /// Failure captured from inside a dispatched closure.
    #[error("native call failed: {error}")]
    NativeCallFailure {
        /// The underlying error (or panic) message.
        error: String,
    },

    /// Blocking dispatch issued from the engine worker thread itself.
    #[error("blocking dispatch from the engine worker thread would deadlock")]
    ReentrantDispatch,
}

impl EngineError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use imehost::EngineError;
    ///
    /// let err = EngineError::DispatchRejected;
    /// assert_eq!(err.as_label(), "dispatch_rejected");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            EngineError::EngineNotRunning => "engine_not_running",
            EngineError::EngineAlreadyRunning => "engine_already_running",
            EngineError::DispatchRejected => "dispatch_rejected",
            EngineError::NativeCallFailure { .. } => "native_call_failure",
            EngineError::ReentrantDispatch => "reentrant_dispatch",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            EngineError::NativeCallFailure { error } => format!("native call failed: {error}"),
            other => other.to_string(),
        }
    }

    /// Indicates whether the error is a programming error rather than a runtime condition.
    ///
    /// # Example
    /// ```
    /// use imehost::EngineError;
    ///
    /// assert!(EngineError::EngineAlreadyRunning.is_fatal());
    /// assert!(!EngineError::EngineNotRunning.is_fatal());
    /// ```
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::EngineAlreadyRunning | EngineError::ReentrantDispatch
        )
    }

    pub(crate) fn native(error: impl std::fmt::Display) -> Self {
        EngineError::NativeCallFailure {
            error: error.to_string(),
        }
    }
}

/// # Invalid lifecycle transition.
///
/// Raised when an event is posted that is not a valid transition from the current
/// state. This means two startups or shutdowns raced above the core; it is fatal.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleError {
    /// The event is not accepted in the current state.
    #[error("invalid lifecycle transition: {event:?} while {state:?}")]
    InvalidTransition {
        /// State at the time the event was posted.
        state: EngineState,
        /// The rejected event.
        event: LifecycleEvent,
    },
}

impl LifecycleError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            LifecycleError::InvalidTransition { .. } => "lifecycle_invalid_transition",
        }
    }
}

/// # Confirmed cursor range matched none of the pending predictions.
///
/// Out-of-order confirmations are expected under asynchrony; the tracker adopts
/// the confirmed range and reports this for diagnostics only.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cursor confirmation {confirmed} matched none of {discarded} pending predictions")]
pub struct PredictionMismatch {
    /// The authoritative range reported by the editing surface.
    pub confirmed: CursorRange,
    /// Number of predictions dropped while searching for a match.
    pub discarded: usize,
}

impl PredictionMismatch {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        "prediction_mismatch"
    }
}

//! # Cursor tracker: confirmed state plus speculative predictions.
//!
//! ```text
//! predict(a) ─► [a]        predict(b) ─► [a, b]
//!                                │
//! consume(a) ─► confirmed = a, queue = [b]
//! consume(c) ─► no match: confirmed = c, queue = [], PredictionMismatch
//! ```
//!
//! ## Rules
//! - The queue never holds two equal neighbours (no-op predictions are dropped).
//! - A confirmation resolves the matching prediction and every prediction before it.
//! - The editing surface is authoritative: an unmatched confirmation is adopted anyway.

use std::collections::VecDeque;

use crate::cursor::CursorRange;
use crate::error::PredictionMismatch;

/// Outcome of [`CursorTracker::consume`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    /// Confirmation equals the confirmed range; nothing changed.
    InSync,
    /// A prediction matched; `discarded` older predictions were dropped before it.
    Resolved { discarded: usize },
    /// No prediction matched; the confirmation was adopted and the queue emptied.
    Mismatch(PredictionMismatch),
}

impl Reconciled {
    #[inline]
    pub fn is_mismatch(&self) -> bool {
        matches!(self, Reconciled::Mismatch(_))
    }
}

/// Reconciles locally predicted cursor edits against confirmed ones.
#[derive(Debug, Clone, Default)]
pub struct CursorTracker {
    confirmed: CursorRange,
    predictions: VecDeque<CursorRange>,
}

impl CursorTracker {
    /// Creates a tracker with a collapsed cursor at 0 and no predictions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new editing context: clears predictions and sets the confirmed range.
    pub fn reset_to(&mut self, start: usize, end: usize) {
        self.predictions.clear();
        self.confirmed = CursorRange::new(start, end);
    }

    /// Same as [`reset_to`](Self::reset_to) with a collapsed cursor.
    pub fn reset_to_pos(&mut self, pos: usize) {
        self.reset_to(pos, pos);
    }

    /// Drops all predictions, keeping the confirmed range.
    pub fn clear(&mut self) {
        self.predictions.clear();
    }

    /// Last confirmed range.
    #[inline]
    pub fn current(&self) -> CursorRange {
        self.confirmed
    }

    /// Most recent known state: the last prediction, or the confirmed range.
    #[inline]
    pub fn latest(&self) -> CursorRange {
        self.predictions.back().copied().unwrap_or(self.confirmed)
    }

    /// Pending predictions, oldest first.
    pub fn predictions(&self) -> impl ExactSizeIterator<Item = CursorRange> + '_ {
        self.predictions.iter().copied()
    }

    #[inline]
    pub fn has_predictions(&self) -> bool {
        !self.predictions.is_empty()
    }

    /// Queues `range` as a future state unless it equals the latest known state.
    ///
    /// Returns `true` if the prediction was queued.
    pub fn predict(&mut self, range: impl Into<CursorRange>) -> bool {
        let range = range.into();
        if range == self.latest() {
            return false;
        }
        self.predictions.push_back(range);
        true
    }

    /// Predicts the latest known state shifted by the given offsets.
    pub fn predict_offset(&mut self, d_start: isize, d_end: isize) -> bool {
        let next = self.latest().offset(d_start, d_end);
        self.predict(next)
    }

    /// Applies an authoritative confirmation from the editing surface.
    pub fn consume(&mut self, start: usize, end: usize) -> Reconciled {
        let confirmed = CursorRange::new(start, end);
        if confirmed == self.confirmed {
            return Reconciled::InSync;
        }

        let mut discarded = 0;
        while let Some(predicted) = self.predictions.pop_front() {
            if predicted == confirmed {
                self.confirmed = confirmed;
                return Reconciled::Resolved { discarded };
            }
            discarded += 1;
        }

        self.confirmed = confirmed;
        let mismatch = PredictionMismatch {
            confirmed,
            discarded,
        };
        tracing::warn!(
            label = mismatch.as_label(),
            confirmed = %confirmed,
            discarded,
            "cursor confirmation matched no prediction"
        );
        Reconciled::Mismatch(mismatch)
    }
}

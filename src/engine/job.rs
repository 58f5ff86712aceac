//! # Deferred units of engine work.
//!
//! A [`Job`] pairs a caller's closure with the response slot the caller awaits.
//! Jobs are owned by the dispatcher queue until the worker executes them or a
//! stop discards them; a discarded job is reported as an [`AbandonedJob`] and its
//! caller observes [`EngineError::DispatchRejected`].

use std::borrow::Cow;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;

use crate::error::EngineError;
use crate::subscribers::panic_message;

/// Response slot filled by the worker.
pub(crate) type Reply<R> = oneshot::Receiver<Result<R, EngineError>>;

type Thunk<B> = Box<dyn FnOnce(&mut B) + Send>;

/// A queued closure bound to its response slot.
pub(crate) struct Job<B> {
    id: u64,
    label: Cow<'static, str>,
    queued_at: Instant,
    thunk: Thunk<B>,
}

impl<B: 'static> Job<B> {
    /// Wraps `f` so that its outcome (value, error or panic) lands in the returned reply.
    pub(crate) fn new<F, R>(id: u64, label: Cow<'static, str>, f: F) -> (Self, Reply<R>)
    where
        F: FnOnce(&mut B) -> anyhow::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job_label = label.clone();
        let thunk: Thunk<B> = Box::new(move |binding: &mut B| {
            // A panic may leave the binding mid-call; the engine keeps serving
            // later jobs regardless.
            let outcome = match catch_unwind(AssertUnwindSafe(|| f(binding))) {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(err)) => Err(EngineError::native(format!("{err:#}"))),
                Err(panic) => Err(EngineError::native(panic_message(panic.as_ref()))),
            };
            if let Err(Err(err)) = tx.send(outcome) {
                tracing::warn!(job = %job_label, error = %err, "detached engine job failed");
            }
        });
        (
            Self {
                id,
                label,
                queued_at: Instant::now(),
                thunk,
            },
            rx,
        )
    }

    #[inline]
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Runs the job against the binding (worker thread only).
    pub(crate) fn execute(self, binding: &mut B) {
        (self.thunk)(binding)
    }

    /// Discards the job without running it; the awaiting caller sees `DispatchRejected`.
    pub(crate) fn abandon(self) -> AbandonedJob {
        AbandonedJob {
            id: self.id,
            label: self.label,
            queued_for: self.queued_at.elapsed(),
        }
    }
}

/// Record of a job that was queued when the engine stopped and never ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbandonedJob {
    /// Submission number (monotonic per dispatcher).
    pub id: u64,
    /// Who submitted it (client id for connection calls).
    pub label: Cow<'static, str>,
    /// Time the job spent in the queue.
    pub queued_for: Duration,
}

//! # Per-client handle onto the shared engine.
//!
//! A [`Connection`] is what UI components hold. It never owns the engine; it
//! forwards work to the daemon's dispatcher and stops working the moment its
//! client id is disconnected.
//!
//! | method            | when the engine is not Ready         | caller        |
//! |-------------------|--------------------------------------|---------------|
//! | `run_immediately` | queued, runs once Ready              | blocks thread |
//! | `run_on_ready`    | waits for Ready, then queued         | awaits        |
//! | `run_if_ready`    | skipped (`Ok(false)`)                | returns       |

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::engine::{Dispatcher, EngineBinding, EngineState, wait_reply};
use crate::error::EngineError;

/// Handle bound to one client id. Cheap to clone.
pub struct Connection<B: EngineBinding> {
    id: Arc<str>,
    token: CancellationToken,
    dispatcher: Arc<Dispatcher<B>>,
}

impl<B: EngineBinding> Clone for Connection<B> {
    fn clone(&self) -> Self {
        Self {
            id: Arc::clone(&self.id),
            token: self.token.clone(),
            dispatcher: Arc::clone(&self.dispatcher),
        }
    }
}

impl<B: EngineBinding> fmt::Debug for Connection<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl<B: EngineBinding> Connection<B> {
    pub(crate) fn new(id: Arc<str>, token: CancellationToken, dispatcher: Arc<Dispatcher<B>>) -> Self {
        Self {
            id,
            token,
            dispatcher,
        }
    }

    /// Client id this connection was created for.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// False once the client id was disconnected.
    pub fn is_connected(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// Engine state right now.
    pub fn state(&self) -> EngineState {
        self.dispatcher.lifecycle().state()
    }

    /// Runs `f` on the engine thread and blocks until it finished.
    ///
    /// Must not be called from inside an async task (it parks the thread) nor
    /// from the engine thread ([`EngineError::ReentrantDispatch`]).
    pub fn run_immediately<F, R>(&self, f: F) -> Result<R, EngineError>
    where
        F: FnOnce(&mut B) -> anyhow::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        self.ensure_connected()?;
        self.dispatcher.dispatch_blocking(self.label(), f)
    }

    /// Waits until the engine is Ready, then runs `f` and returns its result.
    ///
    /// Keeps waiting through restarts, including one that begins after the
    /// engine was seen Ready but before `f` was queued. Fails with
    /// [`EngineError::EngineNotRunning`] if this client is disconnected (or the
    /// engine crashes) while waiting. A job already queued when a stop begins
    /// is abandoned and fails with [`EngineError::DispatchRejected`].
    pub async fn run_on_ready<F, R>(&self, f: F) -> Result<R, EngineError>
    where
        F: FnOnce(&mut B) -> anyhow::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let mut states = self.dispatcher.lifecycle().watch();
        let mut f = f;
        loop {
            self.ensure_connected()?;
            tokio::select! {
                _ = self.token.cancelled() => return Err(EngineError::EngineNotRunning),
                ready = wait_state(&mut states, true) => ready?,
            }
            self.ensure_connected()?;
            match self.dispatcher.try_submit(self.label().into(), f) {
                Ok(reply) => return wait_reply(reply).await,
                Err((EngineError::DispatchRejected, back)) => {
                    tracing::trace!(client = %self.id, "stop in progress, waiting for the next start");
                    f = back;
                    tokio::select! {
                        _ = self.token.cancelled() => return Err(EngineError::EngineNotRunning),
                        left = wait_state(&mut states, false) => left?,
                    }
                }
                Err((err, _)) => return Err(err),
            }
        }
    }

    /// Queues `f` only if the engine is Ready right now; never waits.
    ///
    /// Returns whether the job was queued. Failures of `f` are logged.
    pub fn run_if_ready<F>(&self, f: F) -> Result<bool, EngineError>
    where
        F: FnOnce(&mut B) -> anyhow::Result<()> + Send + 'static,
    {
        self.ensure_connected()?;
        if !self.dispatcher.lifecycle().is_ready() {
            tracing::trace!(client = %self.id, "engine not ready, job skipped");
            return Ok(false);
        }
        match self.dispatcher.post(self.label(), f) {
            Ok(()) => Ok(true),
            // Lost a race with a stop.
            Err(EngineError::DispatchRejected) => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn ensure_connected(&self) -> Result<(), EngineError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(EngineError::EngineNotRunning)
        }
    }

    fn label(&self) -> String {
        self.id.to_string()
    }
}

/// Waits until the engine is (or is no longer) Ready.
async fn wait_state(
    states: &mut watch::Receiver<EngineState>,
    ready: bool,
) -> Result<(), EngineError> {
    states
        .wait_for(|state| (*state == EngineState::Ready) == ready)
        .await
        .map(|_| ())
        .map_err(|_| EngineError::EngineNotRunning)
}

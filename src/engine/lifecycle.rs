//! # Engine lifecycle state machine.
//!
//! ```text
//!            OnStart            OnReady           OnStop            OnStopped
//! Stopped ───────────► Starting ───────► Ready ───────────► Stopping ──────────► Stopped
//! ```
//!
//! ## Rules
//! - Only the transitions above are valid; anything else is a fatal
//!   [`LifecycleError::InvalidTransition`] (two startups/shutdowns raced).
//! - Events are posted by the dispatcher's worker thread only.
//! - Observers run synchronously on the posting thread, in registration order.
//! - [`Lifecycle::when_ready`] callbacks run exactly once, on the next entry into `Ready`
//!   (or immediately if already `Ready`).
//! - The current state is readable from any thread and awaitable via [`Lifecycle::wait_ready`].
//! - A crashed worker drops the state straight to `Stopped`; ready callbacks stay pending.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use crate::engine::lock;
use crate::error::{EngineError, LifecycleError};

/// Engine state as seen by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineState {
    Stopped,
    Starting,
    Ready,
    Stopping,
}

/// Events driving [`EngineState`] transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    OnStart,
    OnReady,
    OnStop,
    OnStopped,
}

impl EngineState {
    /// Returns the state reached by `event`, or `None` if the transition is invalid.
    pub fn next(self, event: LifecycleEvent) -> Option<EngineState> {
        use EngineState::*;
        use LifecycleEvent::*;
        match (self, event) {
            (Stopped, OnStart) => Some(Starting),
            (Starting, OnReady) => Some(Ready),
            (Ready, OnStop) => Some(Stopping),
            (Stopping, OnStopped) => Some(Stopped),
            _ => None,
        }
    }
}

/// Receives every state change, synchronously on the worker thread.
///
/// Implementations must be quick and must not dispatch blocking engine calls.
pub trait LifecycleObserver: Send + Sync + 'static {
    fn on_state_changed(&self, state: EngineState);
}

impl<F> LifecycleObserver for F
where
    F: Fn(EngineState) + Send + Sync + 'static,
{
    fn on_state_changed(&self, state: EngineState) {
        self(state)
    }
}

/// Registration handle returned by [`Lifecycle::add_observer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type ReadyCallback = Box<dyn FnOnce() + Send>;

/// Lifecycle state machine with observers.
pub struct Lifecycle {
    state: watch::Sender<EngineState>,
    observers: Mutex<Vec<(ObserverId, Arc<dyn LifecycleObserver>)>>,
    on_ready: Mutex<Vec<ReadyCallback>>,
    next_id: AtomicU64,
}

impl Lifecycle {
    /// Creates a lifecycle in [`EngineState::Stopped`].
    pub fn new() -> Self {
        let (state, _rx) = watch::channel(EngineState::Stopped);
        Self {
            state,
            observers: Mutex::new(Vec::new()),
            on_ready: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Current state.
    #[inline]
    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.state() == EngineState::Ready
    }

    /// Receiver observing every subsequent state change.
    pub fn watch(&self) -> watch::Receiver<EngineState> {
        self.state.subscribe()
    }

    /// Applies `event`, then notifies observers and pending ready callbacks.
    pub fn post_event(&self, event: LifecycleEvent) -> Result<EngineState, LifecycleError> {
        let state = self.state();
        let next = state
            .next(event)
            .ok_or(LifecycleError::InvalidTransition { state, event })?;
        self.state.send_replace(next);
        tracing::debug!(?state, ?event, ?next, "engine lifecycle transition");

        let observers: Vec<Arc<dyn LifecycleObserver>> = lock(&self.observers)
            .iter()
            .map(|(_, o)| Arc::clone(o))
            .collect();
        for observer in observers {
            observer.on_state_changed(next);
        }

        if next == EngineState::Ready {
            let pending = std::mem::take(&mut *lock(&self.on_ready));
            for callback in pending {
                callback();
            }
        }
        Ok(next)
    }

    /// Runs `f` now if `Ready`, otherwise exactly once when `Ready` is next entered.
    pub fn when_ready(&self, f: impl FnOnce() + Send + 'static) {
        let mut pending = lock(&self.on_ready);
        if self.is_ready() {
            drop(pending);
            f();
        } else {
            pending.push(Box::new(f));
        }
    }

    /// Registers an observer; observers are notified in registration order.
    pub fn add_observer(&self, observer: impl LifecycleObserver) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.observers).push((id, Arc::new(observer)));
        id
    }

    /// Removes an observer. Returns `false` if it was not registered.
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        let mut observers = lock(&self.observers);
        let before = observers.len();
        observers.retain(|(oid, _)| *oid != id);
        observers.len() != before
    }

    /// Waits until the state is `Ready`, through any number of start cycles.
    pub async fn wait_ready(&self) -> Result<(), EngineError> {
        let mut rx = self.state.subscribe();
        rx.wait_for(|s| *s == EngineState::Ready)
            .await
            .map(|_| ())
            .map_err(|_| EngineError::EngineNotRunning)
    }

    /// Forces `Stopped` after the worker died mid-cycle.
    ///
    /// Observers see the `Stopped` state. Ready callbacks do not run.
    pub(crate) fn abort(&self) {
        let state = self.state.send_replace(EngineState::Stopped);
        if state == EngineState::Stopped {
            return;
        }
        tracing::debug!(?state, "engine lifecycle aborted");

        let observers: Vec<Arc<dyn LifecycleObserver>> = lock(&self.observers)
            .iter()
            .map(|(_, o)| Arc::clone(o))
            .collect();
        for observer in observers {
            observer.on_state_changed(EngineState::Stopped);
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

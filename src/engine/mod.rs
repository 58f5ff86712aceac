//! Engine side of the host: the binding contract, the worker-thread dispatcher,
//! the lifecycle state machine and the event callback queue.
//!
//! - [`binding`]: what a native engine adapter implements;
//! - [`dispatcher`]: runs the binding on its own thread and serializes calls into it;
//! - [`lifecycle`]: `Stopped → Starting → Ready → Stopping → Stopped`;
//! - [`sink`]: engine callbacks → bounded queue → event bus;
//! - [`job`]: queued closures and their response slots.

mod binding;
mod dispatcher;
mod job;
mod lifecycle;
mod sink;

#[cfg(test)]
pub(crate) mod fake;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use binding::{BindingFactory, EngineBinding, EngineConfig, WakeHandle};
pub use dispatcher::Dispatcher;
pub(crate) use dispatcher::wait_reply;
pub use job::AbandonedJob;
pub use lifecycle::{EngineState, Lifecycle, LifecycleEvent, LifecycleObserver, ObserverId};
pub use sink::{EngineEvent, EventSink};

/// Locks `m`, recovering the guard if a previous holder panicked.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

//! # Foreign-call surface of the native engine.
//!
//! [`EngineBinding`] is implemented by the adapter over the real native engine
//! (and by an in-memory fake in tests). Only the dispatcher's worker thread ever
//! calls it; the binding is created on that thread by a [`BindingFactory`], so
//! implementations do not need to be `Send` or `Sync`.
//!
//! The one exception is [`WakeHandle`]: a thread-safe token handed out by the
//! binding that interrupts a blocking [`EngineBinding::pump_once`] from any thread.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::engine::EventSink;

/// Contract between the dispatcher and a native engine.
///
/// ## Call order (worker thread only)
/// ```text
/// start(config, sink) ─► wake_handle() ─► { pump_once() ; jobs(&mut self) }* ─► stop()
/// ```
pub trait EngineBinding: 'static {
    /// Starts the native engine. May block for as long as engine startup takes.
    ///
    /// `sink` is the engine's event callback; the binding keeps it and calls
    /// [`EventSink::deliver`] whenever the engine pushes an event.
    fn start(&mut self, config: &EngineConfig, sink: EventSink);

    /// Stops the native engine.
    fn stop(&mut self);

    /// Runs the native message loop once.
    ///
    /// Blocks until the engine has native work (timers, I/O) or until a
    /// [`WakeHandle::wake`] arrives, processes it, and returns.
    fn pump_once(&mut self);

    /// Returns a handle that wakes a blocked [`pump_once`](Self::pump_once).
    ///
    /// A wake that arrives while the loop is not blocked must make the next
    /// `pump_once` return promptly.
    fn wake_handle(&self) -> WakeHandle;
}

/// Creates the binding on the worker thread.
pub type BindingFactory<B> = Arc<dyn Fn() -> B + Send + Sync>;

/// Thread-safe wake-up signal for the native message loop.
#[derive(Clone)]
pub struct WakeHandle(Arc<dyn Fn() + Send + Sync>);

impl WakeHandle {
    pub fn new(wake: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Arc::new(wake))
    }

    /// Wakes the engine's message loop.
    #[inline]
    pub fn wake(&self) {
        (self.0)()
    }
}

impl fmt::Debug for WakeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WakeHandle")
    }
}

/// Startup parameters handed to [`EngineBinding::start`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EngineConfig {
    /// Read-only engine data (dictionaries, tables).
    pub data_dir: PathBuf,
    /// Writable per-user engine state.
    pub user_dir: PathBuf,
    /// Locale the engine starts with (e.g. `"zh_CN"`); empty = engine default.
    pub locale: String,
    /// Extra engine-specific arguments.
    pub args: Vec<String>,
}

impl EngineConfig {
    /// Returns the locale as an `Option` (`None` when the engine default is wanted).
    #[inline]
    pub fn locale(&self) -> Option<&str> {
        if self.locale.is_empty() {
            None
        } else {
            Some(&self.locale)
        }
    }
}

//! # Dispatcher: the single point of contact with the native engine.
//!
//! The [`Dispatcher`] owns one worker thread. That thread creates the binding,
//! starts the engine, and then alternates between pumping the native message
//! loop once and draining the jobs that were queued when the drain began, so
//! neither native timers nor caller jobs can starve the other.
//!
//! ## Architecture
//! ```text
//! callers (any thread / task)                       worker thread
//!   dispatch(f) ──┐                                 factory() ─► binding
//!   dispatch(g) ──┼─► [job queue] ─► wake() ─►      OnStart ─► binding.start(cfg, sink) ─► OnReady
//!   post(h)     ──┘        ▲                        loop {
//!                          │                          binding.pump_once()
//!   stop() ── take queued ─┘ (abandoned)              drain(snapshot of queue) ─► job(&mut binding)
//!                                                   }
//!                                                   OnStop ─► binding.stop() ─► OnStopped
//! ```
//!
//! ## Rules
//! - Jobs run strictly in submission order (one FIFO queue).
//! - A failing or panicking job only fails its own caller; the worker keeps running.
//! - Dropping an awaiting caller detaches it; the job still runs.
//! - `stop()` never runs still-queued jobs; it returns them as [`AbandonedJob`]s.
//! - Submissions after a stop began fail with [`EngineError::DispatchRejected`].
//! - A blocking dispatch from the worker thread fails with [`EngineError::ReentrantDispatch`].
//! - If the binding panics, the lifecycle drops straight to `Stopped` (no `Ready`),
//!   `EngineCrashed` is published and the session token is cancelled.

use std::borrow::Cow;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle, ThreadId};

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::core::Config;
use crate::engine::job::{Job, Reply};
use crate::engine::sink::{self, EventSink};
use crate::engine::{
    AbandonedJob, BindingFactory, EngineBinding, EngineConfig, Lifecycle, LifecycleEvent,
    WakeHandle, lock,
};
use crate::error::{EngineError, LifecycleError};
use crate::events::{Bus, Event, EventKind};
use crate::subscribers::panic_message;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Never started.
    Idle,
    Running,
    /// Stop requested; the worker is winding down.
    Stopping,
    Stopped,
}

struct Queue<B> {
    phase: Phase,
    jobs: VecDeque<Job<B>>,
    wake: Option<WakeHandle>,
    next_id: u64,
}

struct Shared<B> {
    queue: Mutex<Queue<B>>,
    worker_thread: Mutex<Option<ThreadId>>,
}

/// Runs a non-thread-safe engine on its own worker thread.
pub struct Dispatcher<B: EngineBinding> {
    factory: BindingFactory<B>,
    engine: EngineConfig,
    worker_name: String,
    event_queue_capacity: usize,
    lifecycle: Arc<Lifecycle>,
    bus: Bus,
    rt: Handle,
    shared: Arc<Shared<B>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    session: Mutex<CancellationToken>,
}

impl<B: EngineBinding> Dispatcher<B> {
    /// Creates a stopped dispatcher. The engine forwarder task is spawned on `rt`.
    pub fn new(
        factory: BindingFactory<B>,
        cfg: &Config,
        lifecycle: Arc<Lifecycle>,
        bus: Bus,
        rt: Handle,
    ) -> Self {
        Self {
            factory,
            engine: cfg.engine.clone(),
            worker_name: cfg.worker_name().to_string(),
            event_queue_capacity: cfg.event_queue_capacity_clamped(),
            lifecycle,
            bus,
            rt,
            shared: Arc::new(Shared {
                queue: Mutex::new(Queue {
                    phase: Phase::Idle,
                    jobs: VecDeque::new(),
                    wake: None,
                    next_id: 0,
                }),
                worker_thread: Mutex::new(None),
            }),
            worker: Mutex::new(None),
            session: Mutex::new(CancellationToken::new()),
        }
    }

    /// Lifecycle driven by this dispatcher's worker.
    pub fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.lifecycle
    }

    /// True between `start()` and the moment a stop is requested.
    pub fn is_running(&self) -> bool {
        lock(&self.shared.queue).phase == Phase::Running
    }

    /// Number of jobs waiting for the worker.
    pub fn queued(&self) -> usize {
        lock(&self.shared.queue).jobs.len()
    }

    /// Token cancelled when the engine crashes.
    ///
    /// Survives normal stops and restarts; a start after a crash begins a new session.
    pub(crate) fn session(&self) -> CancellationToken {
        lock(&self.session).clone()
    }

    /// True when called on this dispatcher's worker thread.
    pub fn is_worker_thread(&self) -> bool {
        *lock(&self.shared.worker_thread) == Some(thread::current().id())
    }

    /// Spawns the worker thread, which starts the engine.
    ///
    /// Fails with [`EngineError::EngineAlreadyRunning`] if the dispatcher is running
    /// or still stopping.
    pub fn start(&self) -> Result<(), EngineError> {
        let mut worker = lock(&self.worker);
        {
            let mut q = lock(&self.shared.queue);
            if matches!(q.phase, Phase::Running | Phase::Stopping) {
                return Err(EngineError::EngineAlreadyRunning);
            }
            q.phase = Phase::Running;
        }
        // Left behind by a stop issued from the worker thread itself.
        if let Some(previous) = worker.take() {
            join_worker(previous);
        }

        let session = {
            let mut session = lock(&self.session);
            if session.is_cancelled() {
                *session = CancellationToken::new();
            }
            session.clone()
        };

        let (sink, events) = sink::channel(self.event_queue_capacity, self.bus.clone());
        self.rt.spawn(sink::forward(events, self.bus.clone()));

        let ctx = WorkerContext {
            factory: Arc::clone(&self.factory),
            engine: self.engine.clone(),
            lifecycle: Arc::clone(&self.lifecycle),
            shared: Arc::clone(&self.shared),
            sink,
            bus: self.bus.clone(),
            session,
        };
        match thread::Builder::new()
            .name(self.worker_name.clone())
            .spawn(move || ctx.run())
        {
            Ok(handle) => {
                *worker = Some(handle);
                tracing::debug!(worker = %self.worker_name, "engine worker spawned");
                Ok(())
            }
            Err(err) => {
                lock(&self.shared.queue).phase = Phase::Idle;
                tracing::error!(error = %err, "failed to spawn engine worker");
                Err(EngineError::native(err))
            }
        }
    }

    /// Stops the engine and returns the jobs that were still queued.
    ///
    /// Waits for the worker to finish its current job and shut the engine down,
    /// unless called from the worker thread itself. Calling it again (or on a
    /// dispatcher that never started) returns an empty list.
    pub fn stop(&self) -> Vec<AbandonedJob> {
        let mut worker = lock(&self.worker);
        let (abandoned, wake) = {
            let mut q = lock(&self.shared.queue);
            if q.phase != Phase::Running {
                return Vec::new();
            }
            q.phase = Phase::Stopping;
            let abandoned: Vec<AbandonedJob> = q.jobs.drain(..).map(Job::abandon).collect();
            (abandoned, q.wake.clone())
        };
        if let Some(wake) = wake {
            wake.wake();
        }

        if self.is_worker_thread() {
            tracing::warn!("engine stop requested from the worker thread; not joining");
        } else if let Some(handle) = worker.take() {
            join_worker(handle);
        }

        if !abandoned.is_empty() {
            tracing::warn!(count = abandoned.len(), "engine stopped with queued jobs");
        }
        abandoned
    }

    /// Queues `f` and returns a future resolving to its result.
    ///
    /// The job is queued immediately, before the future is first polled.
    pub fn dispatch<F, R>(
        &self,
        f: F,
    ) -> impl Future<Output = Result<R, EngineError>> + Send + 'static + use<B, F, R>
    where
        F: FnOnce(&mut B) -> anyhow::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        self.dispatch_labeled("dispatch", f)
    }

    /// Same as [`dispatch`](Self::dispatch) with a label used when the job is abandoned.
    pub fn dispatch_labeled<L, F, R>(
        &self,
        label: L,
        f: F,
    ) -> impl Future<Output = Result<R, EngineError>> + Send + 'static + use<B, L, F, R>
    where
        L: Into<Cow<'static, str>>,
        F: FnOnce(&mut B) -> anyhow::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let reply = self.submit(label.into(), f);
        async move { wait_reply(reply?).await }
    }

    /// Queues `f` and blocks the calling thread until it ran.
    pub fn dispatch_blocking<F, R>(
        &self,
        label: impl Into<Cow<'static, str>>,
        f: F,
    ) -> Result<R, EngineError>
    where
        F: FnOnce(&mut B) -> anyhow::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        if self.is_worker_thread() {
            return Err(EngineError::ReentrantDispatch);
        }
        let reply = self.submit(label.into(), f)?;
        match futures::executor::block_on(reply) {
            Ok(result) => result,
            Err(_) => Err(EngineError::DispatchRejected),
        }
    }

    /// Queues `f` without waiting for it. Failures are logged by the worker.
    pub fn post<F>(&self, label: impl Into<Cow<'static, str>>, f: F) -> Result<(), EngineError>
    where
        F: FnOnce(&mut B) -> anyhow::Result<()> + Send + 'static,
    {
        self.submit(label.into(), f).map(drop)
    }

    fn submit<F, R>(&self, label: Cow<'static, str>, f: F) -> Result<Reply<R>, EngineError>
    where
        F: FnOnce(&mut B) -> anyhow::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        self.try_submit(label, f).map_err(|(err, _)| err)
    }

    /// Queues `f`, or hands it back with the reason it was refused.
    pub(crate) fn try_submit<F, R>(
        &self,
        label: Cow<'static, str>,
        f: F,
    ) -> Result<Reply<R>, (EngineError, F)>
    where
        F: FnOnce(&mut B) -> anyhow::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let (reply, wake) = {
            let mut q = lock(&self.shared.queue);
            match q.phase {
                Phase::Idle => return Err((EngineError::EngineNotRunning, f)),
                Phase::Stopping | Phase::Stopped => {
                    return Err((EngineError::DispatchRejected, f));
                }
                Phase::Running => {}
            }
            let id = q.next_id;
            q.next_id += 1;
            let (job, reply) = Job::new(id, label, f);
            q.jobs.push_back(job);
            (reply, q.wake.clone())
        };
        if let Some(wake) = wake {
            wake.wake();
        }
        Ok(reply)
    }
}

impl<B: EngineBinding> Drop for Dispatcher<B> {
    fn drop(&mut self) {
        let abandoned = self.stop();
        if !abandoned.is_empty() {
            tracing::warn!(count = abandoned.len(), "dispatcher dropped with queued jobs");
        }
    }
}

/// Resolves a reply slot; a slot dropped unfilled means the job was abandoned.
pub(crate) async fn wait_reply<R>(reply: Reply<R>) -> Result<R, EngineError> {
    match reply.await {
        Ok(result) => result,
        Err(_) => Err(EngineError::DispatchRejected),
    }
}

fn join_worker(handle: JoinHandle<()>) {
    if let Err(panic) = handle.join() {
        tracing::error!(info = %panic_message(panic.as_ref()), "engine worker panicked");
    }
}

/// Everything the worker thread owns.
struct WorkerContext<B: EngineBinding> {
    factory: BindingFactory<B>,
    engine: EngineConfig,
    lifecycle: Arc<Lifecycle>,
    shared: Arc<Shared<B>>,
    sink: EventSink,
    bus: Bus,
    session: CancellationToken,
}

impl<B: EngineBinding> WorkerContext<B> {
    fn run(self) {
        *lock(&self.shared.worker_thread) = Some(thread::current().id());

        let crash = match catch_unwind(AssertUnwindSafe(|| self.drive())) {
            Ok(Ok(())) => {
                tracing::debug!("engine worker finished");
                None
            }
            Ok(Err(err)) => {
                tracing::error!(label = err.as_label(), error = %err, "engine lifecycle misuse");
                Some(err.to_string())
            }
            Err(panic) => {
                let info = panic_message(panic.as_ref());
                tracing::error!(%info, "engine worker crashed");
                Some(info)
            }
        };
        if crash.is_some() {
            self.lifecycle.abort();
        }

        *lock(&self.shared.worker_thread) = None;
        let leftovers: Vec<Job<B>> = {
            let mut q = lock(&self.shared.queue);
            q.phase = Phase::Stopped;
            q.wake = None;
            q.jobs.drain(..).collect()
        };
        if !leftovers.is_empty() {
            tracing::warn!(count = leftovers.len(), "engine worker exited with queued jobs");
        }

        // Only once the dispatcher accepts a new start.
        if let Some(info) = crash {
            self.bus
                .publish(Event::new(EventKind::EngineCrashed).with_reason(info));
            self.session.cancel();
        }
    }

    fn drive(&self) -> Result<(), LifecycleError> {
        let mut binding = (self.factory)();

        self.lifecycle.post_event(LifecycleEvent::OnStart)?;
        binding.start(&self.engine, self.sink.clone());

        let wake = binding.wake_handle();
        {
            let mut q = lock(&self.shared.queue);
            // Anything submitted while starting had nobody to wake.
            if !q.jobs.is_empty() || q.phase != Phase::Running {
                wake.wake();
            }
            q.wake = Some(wake);
        }
        self.lifecycle.post_event(LifecycleEvent::OnReady)?;

        loop {
            binding.pump_once();
            if !self.drain(&mut binding) {
                break;
            }
        }

        lock(&self.shared.queue).wake = None;
        self.lifecycle.post_event(LifecycleEvent::OnStop)?;
        binding.stop();
        self.lifecycle.post_event(LifecycleEvent::OnStopped)?;
        Ok(())
    }

    /// Runs the jobs queued when the drain began. Returns `false` once a stop is observed.
    fn drain(&self, binding: &mut B) -> bool {
        let budget = {
            let q = lock(&self.shared.queue);
            if q.phase != Phase::Running {
                return false;
            }
            q.jobs.len()
        };
        for _ in 0..budget {
            let job = {
                let mut q = lock(&self.shared.queue);
                if q.phase != Phase::Running {
                    return false;
                }
                match q.jobs.pop_front() {
                    Some(job) => job,
                    None => break,
                }
            };
            tracing::trace!(job = job.id(), "running engine job");
            job.execute(binding);
        }
        true
    }
}

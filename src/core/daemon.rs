//! # Daemon: reference-counted owner of the shared engine.
//!
//! Any number of UI components (keyboard view, candidate bar, settings page)
//! share one engine instance. Each attaches under a client id; the engine runs
//! exactly while at least one client is attached.
//!
//! ```text
//! connect("kb")    ── clients 0→1 ──► Dispatcher::start() ─► Starting ─► Ready
//! connect("bar")   ── clients 1→2
//! disconnect("kb") ── clients 2→1
//! disconnect("bar")── clients 1→0 ──► Dispatcher::stop()  ─► Stopping ─► Stopped
//!                                          └─► JobsAbandoned (if jobs were queued)
//! ```
//!
//! ## Rules
//! - A transition mutex serializes `connect`, `disconnect`, `restart` and
//!   `shutdown`, so any interleaving yields one engine start per 0→1 and one
//!   stop per 1→0 transition.
//! - The registry mutex is only held to read or update entries, never across
//!   an engine start or stop. Jobs may call [`Daemon::clients`] while the
//!   engine is being stopped.
//! - `connect` is idempotent; `disconnect` of an unknown id is a no-op.
//! - An engine crash cancels every client. The dead entries are reported as
//!   disconnected on the next transition, and the next `connect` starts a
//!   fresh engine.
//! - Calls that may start or stop the engine are refused on the engine thread
//!   ([`EngineError::ReentrantDispatch`]).

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::core::{Connection, registry::Registry};
use crate::engine::{AbandonedJob, Dispatcher, EngineBinding, EngineState, Lifecycle, ObserverId, lock};
use crate::error::EngineError;
use crate::events::{Bus, Event, EventKind};

/// Shares one engine among named clients.
pub struct Daemon<B: EngineBinding> {
    bus: Bus,
    dispatcher: Arc<Dispatcher<B>>,
    registry: Mutex<Registry>,
    transitions: Mutex<()>,
    runtime_token: CancellationToken,
    observer: ObserverId,
}

impl<B: EngineBinding> Daemon<B> {
    pub(crate) fn new_internal(
        bus: Bus,
        dispatcher: Arc<Dispatcher<B>>,
        runtime_token: CancellationToken,
        observer: ObserverId,
    ) -> Self {
        Self {
            bus,
            dispatcher,
            registry: Mutex::new(Registry::default()),
            transitions: Mutex::new(()),
            runtime_token,
            observer,
        }
    }

    /// Attaches `client_id`, starting the engine if it is the first client.
    ///
    /// Connecting an id that is already attached returns another handle for
    /// the same registration.
    pub fn connect(&self, client_id: &str) -> Result<Connection<B>, EngineError> {
        self.ensure_off_engine_thread("connect")?;
        let _transition = lock(&self.transitions);

        let (attached, first) = {
            let mut registry = lock(&self.registry);
            self.report_crashed(registry.purge_cancelled());
            (registry.contains(client_id), registry.is_empty())
        };
        if first {
            if let Err(err) = self.dispatcher.start() {
                tracing::error!(client = client_id, error = %err, "engine failed to start");
                return Err(err);
            }
        }

        let session = self.dispatcher.session();
        let (id, token, clients) = {
            let mut registry = lock(&self.registry);
            let (id, token, _) = registry.register(client_id, &session);
            (id, token, registry.len())
        };
        if attached {
            return Ok(Connection::new(id, token, Arc::clone(&self.dispatcher)));
        }

        tracing::debug!(client = client_id, clients, "client connected");
        self.bus.publish(
            Event::new(EventKind::ClientConnected)
                .with_client(Arc::clone(&id))
                .with_count(clients),
        );
        Ok(Connection::new(id, token, Arc::clone(&self.dispatcher)))
    }

    /// Detaches `client_id`, stopping the engine if it was the last client.
    ///
    /// Returns `false` if the id was not attached. Existing handles for the id
    /// fail with [`EngineError::EngineNotRunning`] afterwards.
    pub fn disconnect(&self, client_id: &str) -> Result<bool, EngineError> {
        self.ensure_off_engine_thread("disconnect")?;
        let _transition = lock(&self.transitions);

        let (removed, clients) = {
            let mut registry = lock(&self.registry);
            self.report_crashed(registry.purge_cancelled());
            (registry.unregister(client_id), registry.len())
        };
        if !removed {
            return Ok(false);
        }
        let abandoned = if clients == 0 {
            self.dispatcher.stop()
        } else {
            Vec::new()
        };

        tracing::debug!(client = client_id, clients, "client disconnected");
        self.bus.publish(
            Event::new(EventKind::ClientDisconnected)
                .with_client(client_id)
                .with_count(clients),
        );
        self.report_abandoned(&abandoned);
        Ok(true)
    }

    /// Stops and starts the engine again, keeping every client attached.
    ///
    /// Pending [`Connection::run_on_ready`] calls keep waiting and run once the
    /// new engine is Ready. Does nothing when no client is attached.
    pub fn restart(&self) -> Result<Vec<AbandonedJob>, EngineError> {
        self.ensure_off_engine_thread("restart")?;
        let _transition = lock(&self.transitions);

        let idle = {
            let mut registry = lock(&self.registry);
            self.report_crashed(registry.purge_cancelled());
            registry.is_empty()
        };
        if idle {
            return Ok(Vec::new());
        }
        let abandoned = self.dispatcher.stop();
        let started = self.dispatcher.start();

        self.report_abandoned(&abandoned);
        match started {
            Ok(()) => {
                tracing::debug!("engine restarted");
                Ok(abandoned)
            }
            Err(err) => {
                tracing::error!(error = %err, "engine failed to restart");
                Err(err)
            }
        }
    }

    /// Detaches every client; the engine is stopped once.
    pub fn shutdown(&self) -> Result<Vec<AbandonedJob>, EngineError> {
        self.ensure_off_engine_thread("shutdown")?;
        let _transition = lock(&self.transitions);

        let ids = lock(&self.registry).drain();
        let abandoned = if ids.is_empty() {
            Vec::new()
        } else {
            self.dispatcher.stop()
        };

        for (i, id) in ids.iter().enumerate() {
            self.bus.publish(
                Event::new(EventKind::ClientDisconnected)
                    .with_client(Arc::clone(id))
                    .with_count(ids.len() - i - 1),
            );
        }
        self.report_abandoned(&abandoned);
        Ok(abandoned)
    }

    /// Attached client ids, sorted.
    pub fn clients(&self) -> Vec<String> {
        lock(&self.registry).ids()
    }

    /// Handle for the client that attached earliest and is still attached.
    pub fn first_connection(&self) -> Option<Connection<B>> {
        let (id, token) = lock(&self.registry).first()?;
        Some(Connection::new(id, token, Arc::clone(&self.dispatcher)))
    }

    /// True while the engine is started (any state but a requested stop).
    pub fn is_running(&self) -> bool {
        self.dispatcher.is_running()
    }

    /// Current engine state.
    pub fn state(&self) -> EngineState {
        self.dispatcher.lifecycle().state()
    }

    /// Engine lifecycle (observers, ready callbacks).
    pub fn lifecycle(&self) -> &Arc<Lifecycle> {
        self.dispatcher.lifecycle()
    }

    /// Receiver for every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    fn ensure_off_engine_thread(&self, op: &'static str) -> Result<(), EngineError> {
        if self.dispatcher.is_worker_thread() {
            tracing::error!(op, "daemon called from the engine thread");
            return Err(EngineError::ReentrantDispatch);
        }
        Ok(())
    }

    /// Reports clients whose engine crashed under them.
    fn report_crashed(&self, ids: Vec<Arc<str>>) {
        for id in ids {
            tracing::debug!(client = %id, "client dropped after engine crash");
            self.bus.publish(
                Event::new(EventKind::ClientDisconnected)
                    .with_client(id)
                    .with_reason("engine_crashed"),
            );
        }
    }

    fn report_abandoned(&self, abandoned: &[AbandonedJob]) {
        if abandoned.is_empty() {
            return;
        }
        for job in abandoned {
            tracing::debug!(job = job.id, label = %job.label, queued_for = ?job.queued_for, "job abandoned");
        }
        let labels = abandoned
            .iter()
            .map(|job| job.label.as_ref())
            .collect::<Vec<_>>()
            .join(",");
        self.bus.publish(
            Event::new(EventKind::JobsAbandoned)
                .with_count(abandoned.len())
                .with_reason(labels),
        );
    }
}

impl<B: EngineBinding> Drop for Daemon<B> {
    fn drop(&mut self) {
        let registry = self.registry.get_mut().unwrap_or_else(PoisonError::into_inner);
        if !registry.drain().is_empty() {
            self.dispatcher.stop();
        }
        self.dispatcher.lifecycle().remove_observer(self.observer);
        self.runtime_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Config, DaemonBuilder};
    use crate::engine::fake::{FakeEngine, Tally};
    use crate::subscribers::Subscribe;
    use async_trait::async_trait;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    fn daemon(tally: &Arc<Tally>) -> Arc<Daemon<FakeEngine>> {
        DaemonBuilder::new(Config::default()).build(FakeEngine::factory(tally.clone()))
    }

    fn slow_daemon(tally: &Arc<Tally>, delay: Duration) -> Arc<Daemon<FakeEngine>> {
        DaemonBuilder::new(Config::default())
            .build(FakeEngine::factory_with_delay(tally.clone(), delay))
    }

    fn assert_alternating(journal: &[&str]) {
        for (i, entry) in journal.iter().enumerate() {
            let expected = if i % 2 == 0 { "start" } else { "stop" };
            assert_eq!(*entry, expected, "journal out of order: {journal:?}");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_two_clients_share_one_engine() {
        let tally = Arc::new(Tally::default());
        let d = daemon(&tally);

        let a = d.connect("A").unwrap();
        assert!(d.is_running());
        let b = d.connect("B").unwrap();
        assert_eq!(d.clients(), vec!["A", "B"]);

        assert!(d.disconnect("A").unwrap());
        assert!(d.is_running());
        assert!(!a.is_connected());
        assert!(b.is_connected());

        assert!(d.disconnect("B").unwrap());
        assert!(!d.is_running());
        assert!(!d.disconnect("B").unwrap());

        assert_eq!(tally.starts(), 1);
        assert_eq!(tally.stops(), 1);
        assert_eq!(d.state(), EngineState::Stopped);
        assert!(!tally.touched_from_foreign_thread());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_connect_is_idempotent() {
        let tally = Arc::new(Tally::default());
        let d = daemon(&tally);

        let first = d.connect("kb").unwrap();
        let second = d.connect("kb").unwrap();
        assert_eq!(first.id(), second.id());
        assert_eq!(d.clients().len(), 1);

        d.disconnect("kb").unwrap();
        assert!(!first.is_connected());
        assert!(!second.is_connected());
        assert_eq!(tally.starts(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_random_interleavings_keep_refcount() {
        let tally = Arc::new(Tally::default());
        let d = daemon(&tally);
        let ids = ["kb", "bar", "settings", "emoji"];
        let mut attached = [false; 4];
        let mut rng = StdRng::seed_from_u64(0x1ee7);
        let (mut expected_starts, mut expected_stops) = (0, 0);

        for _ in 0..200 {
            let i = rng.random_range(0..ids.len());
            let before = attached.iter().filter(|a| **a).count();
            if rng.random_bool(0.5) {
                d.connect(ids[i]).unwrap();
                attached[i] = true;
            } else {
                d.disconnect(ids[i]).unwrap();
                attached[i] = false;
            }
            let after = attached.iter().filter(|a| **a).count();
            match (before, after) {
                (0, 1) => expected_starts += 1,
                (1, 0) => expected_stops += 1,
                _ => {}
            }
            assert_eq!(d.is_running(), after > 0);
        }
        d.shutdown().unwrap();
        if attached.iter().any(|a| *a) {
            expected_stops += 1;
        }

        assert_eq!(tally.starts(), expected_starts);
        assert_eq!(tally.stops(), expected_stops);
        assert_alternating(&tally.journal());
        assert!(!tally.touched_from_foreign_thread());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_clients_never_double_start() {
        let tally = Arc::new(Tally::default());
        let d = daemon(&tally);

        let threads: Vec<_> = (0..4u64)
            .map(|n| {
                let d = Arc::clone(&d);
                std::thread::spawn(move || {
                    let mut rng = StdRng::seed_from_u64(n);
                    let id = format!("client-{n}");
                    for _ in 0..50 {
                        if rng.random_bool(0.5) {
                            d.connect(&id).unwrap();
                        } else {
                            d.disconnect(&id).unwrap();
                        }
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        d.shutdown().unwrap();

        assert_eq!(tally.starts(), tally.stops());
        assert_alternating(&tally.journal());
        assert!(!tally.touched_from_foreign_thread());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dispatch_order_across_connections() {
        let tally = Arc::new(Tally::default());
        let d = daemon(&tally);
        let kb = d.connect("kb").unwrap();
        let bar = d.connect("bar").unwrap();
        kb.run_on_ready(|_| Ok(())).await.unwrap();

        let seq = Arc::new(AtomicU64::new(0));
        let mut replies = Vec::new();
        for n in 0..10u64 {
            let conn = if n % 2 == 0 { &kb } else { &bar };
            let seq = seq.clone();
            let (tx, rx) = tokio::sync::oneshot::channel();
            let queued = conn.run_if_ready(move |_| {
                tx.send(seq.fetch_add(1, Ordering::SeqCst)).ok();
                Ok(())
            });
            assert_eq!(queued, Ok(true));
            replies.push(rx);
        }
        for (n, rx) in replies.into_iter().enumerate() {
            assert_eq!(rx.await, Ok(n as u64));
        }
        d.shutdown().unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_on_ready_waits_for_slow_start() {
        let tally = Arc::new(Tally::default());
        let d = slow_daemon(&tally, Duration::from_millis(150));

        let conn = d.connect("kb").unwrap();
        assert_ne!(conn.state(), EngineState::Ready);

        let seen = tally.clone();
        let started_when_run = conn.run_on_ready(move |_| Ok(seen.starts())).await;
        assert_eq!(started_when_run, Ok(1));
        assert_eq!(conn.state(), EngineState::Ready);
        d.shutdown().unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_if_ready_skips_until_ready() {
        let tally = Arc::new(Tally::default());
        let d = slow_daemon(&tally, Duration::from_millis(150));
        let conn = d.connect("kb").unwrap();

        assert_eq!(conn.run_if_ready(|_| Ok(())), Ok(false));

        conn.run_on_ready(|_| Ok(())).await.unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();
        assert_eq!(
            conn.run_if_ready(move |e: &mut FakeEngine| {
                e.counter += 1;
                tx.send(e.counter).ok();
                Ok(())
            }),
            Ok(true)
        );
        assert_eq!(rx.await, Ok(1));
        d.shutdown().unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_disconnected_connection_is_dead() {
        let tally = Arc::new(Tally::default());
        let d = daemon(&tally);
        let conn = d.connect("kb").unwrap();
        d.disconnect("kb").unwrap();

        assert_eq!(conn.run_if_ready(|_| Ok(())), Err(EngineError::EngineNotRunning));
        assert_eq!(
            conn.run_on_ready(|_| Ok(())).await,
            Err(EngineError::EngineNotRunning)
        );
        assert_eq!(
            conn.run_immediately(|_| Ok(())),
            Err(EngineError::EngineNotRunning)
        );

        // Reconnecting the same id gives a fresh, working handle.
        let again = d.connect("kb").unwrap();
        assert!(!conn.is_connected());
        assert_eq!(again.run_on_ready(|_| Ok(5)).await, Ok(5));
        d.shutdown().unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_waiter_released_on_disconnect() {
        let tally = Arc::new(Tally::default());
        let d = slow_daemon(&tally, Duration::from_millis(300));
        let conn = d.connect("kb").unwrap();

        let waiter = tokio::spawn({
            let conn = conn.clone();
            async move { conn.run_on_ready(|_| Ok(())).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let d2 = Arc::clone(&d);
        tokio::task::spawn_blocking(move || d2.disconnect("kb"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(waiter.await.unwrap(), Err(EngineError::EngineNotRunning));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_immediately_from_plain_thread() {
        let tally = Arc::new(Tally::default());
        let d = daemon(&tally);
        let conn = d.connect("kb").unwrap();

        let value = tokio::task::spawn_blocking(move || {
            conn.run_immediately(|e: &mut FakeEngine| {
                e.counter = 42;
                Ok(e.counter)
            })
        })
        .await
        .unwrap();
        assert_eq!(value, Ok(42));
        d.shutdown().unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_restart_keeps_clients() {
        let tally = Arc::new(Tally::default());
        let d = daemon(&tally);
        assert_eq!(d.restart(), Ok(Vec::new()));
        assert_eq!(tally.starts(), 0);

        let conn = d.connect("kb").unwrap();
        conn.run_on_ready(|_| Ok(())).await.unwrap();
        d.restart().unwrap();

        assert_eq!(conn.run_on_ready(|e: &mut FakeEngine| Ok(e.counter)).await, Ok(0));
        assert_eq!(tally.starts(), 2);
        assert_eq!(tally.stops(), 1);
        assert_eq!(d.clients(), vec!["kb"]);
        d.shutdown().unwrap();
        assert_alternating(&tally.journal());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_waiter_rides_through_restart() {
        let tally = Arc::new(Tally::default());
        let d = slow_daemon(&tally, Duration::from_millis(150));
        let conn = d.connect("kb").unwrap();

        let waiter = tokio::spawn({
            let conn = conn.clone();
            let tally = tally.clone();
            async move { conn.run_on_ready(move |_| Ok(tally.starts())).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let abandoned = tokio::task::spawn_blocking({
            let d = Arc::clone(&d);
            move || d.restart()
        })
        .await
        .unwrap()
        .unwrap();

        assert!(abandoned.is_empty());
        assert_eq!(waiter.await.unwrap(), Ok(2));
        assert_eq!(tally.stops(), 1);
        assert_eq!(d.clients(), vec!["kb"]);
        d.shutdown().unwrap();
        assert_alternating(&tally.journal());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_jobs_can_read_clients_while_last_client_leaves() {
        let tally = Arc::new(Tally::default());
        let d = daemon(&tally);
        let conn = d.connect("kb").unwrap();
        conn.run_on_ready(|_| Ok(())).await.unwrap();

        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (seen_tx, seen_rx) = tokio::sync::oneshot::channel();
        let inner = Arc::clone(&d);
        let queued = conn
            .run_if_ready(move |_| {
                entered_tx.send(()).ok();
                let deadline = std::time::Instant::now() + Duration::from_secs(2);
                let mut clients = inner.clients();
                while !clients.is_empty() && std::time::Instant::now() < deadline {
                    std::thread::sleep(Duration::from_millis(5));
                    clients = inner.clients();
                }
                let first = inner.first_connection().map(|c| c.id().to_string());
                seen_tx.send((clients, first)).ok();
                Ok(())
            })
            .unwrap();
        assert!(queued);
        entered_rx.recv().unwrap();

        // Plain thread: a stuck disconnect must fail the test, not hang runtime shutdown.
        let (left_tx, left_rx) = tokio::sync::oneshot::channel();
        std::thread::spawn({
            let d = Arc::clone(&d);
            move || {
                left_tx.send(d.disconnect("kb")).ok();
            }
        });
        let left = tokio::time::timeout(Duration::from_secs(2), left_rx)
            .await
            .expect("disconnect finished while a job read the clients")
            .unwrap();

        assert_eq!(left, Ok(true));
        assert_eq!(seen_rx.await.unwrap(), (Vec::<String>::new(), None));
        assert!(!d.is_running());
        assert_eq!(tally.stops(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_engine_crash_drops_clients_and_next_connect_restarts() {
        let tally = Arc::new(Tally::default());
        tally.fail_next_start();
        let d = daemon(&tally);
        let mut events = d.subscribe();
        let readies = Arc::new(AtomicU64::new(0));
        d.lifecycle().when_ready({
            let readies = readies.clone();
            move || {
                readies.fetch_add(1, Ordering::SeqCst);
            }
        });

        let a = d.connect("A").unwrap();
        let waited = tokio::time::timeout(Duration::from_secs(2), a.run_on_ready(|_| Ok(())))
            .await
            .expect("crash releases the waiter");
        assert_eq!(waited, Err(EngineError::EngineNotRunning));
        assert!(!a.is_connected());
        assert!(!d.is_running());
        assert_eq!(d.state(), EngineState::Stopped);
        assert!(d.clients().is_empty());
        assert!(d.first_connection().is_none());
        assert_eq!(readies.load(Ordering::SeqCst), 0);

        let b = d.connect("B").unwrap();
        assert_eq!(b.run_on_ready(|_| Ok(7)).await, Ok(7));
        assert_eq!(readies.load(Ordering::SeqCst), 1);
        assert_eq!(d.clients(), vec!["B"]);
        assert_eq!(tally.starts(), 1);

        let mut seen = Vec::new();
        while let Ok(ev) = events.try_recv() {
            seen.push(ev);
        }
        let pos = |pred: &dyn Fn(&Event) -> bool| seen.iter().position(|e| pred(e)).unwrap();
        let crashed = pos(&|e| e.kind == EventKind::EngineCrashed);
        let dropped = pos(&|e| {
            e.kind == EventKind::ClientDisconnected
                && e.client.as_deref() == Some("A")
                && e.reason.as_deref() == Some("engine_crashed")
        });
        let ready = pos(&|e| e.kind == EventKind::EngineReady);
        assert!(crashed < dropped && dropped < ready, "{seen:?}");
        d.shutdown().unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_daemon_refuses_calls_from_engine_thread() {
        let tally = Arc::new(Tally::default());
        let d = daemon(&tally);
        let conn = d.connect("kb").unwrap();

        let inner = Arc::clone(&d);
        let refused = conn
            .run_on_ready(move |_| Ok((inner.connect("x").err(), inner.disconnect("kb").err())))
            .await
            .unwrap();
        assert_eq!(
            refused,
            (
                Some(EngineError::ReentrantDispatch),
                Some(EngineError::ReentrantDispatch)
            )
        );
        assert_eq!(d.clients(), vec!["kb"]);
        d.shutdown().unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_first_connection_by_attach_order() {
        let tally = Arc::new(Tally::default());
        let d = daemon(&tally);
        assert!(d.first_connection().is_none());

        d.connect("settings").unwrap();
        d.connect("bar").unwrap();
        assert_eq!(d.first_connection().map(|c| c.id().to_string()).as_deref(), Some("settings"));

        d.disconnect("settings").unwrap();
        assert_eq!(d.first_connection().map(|c| c.id().to_string()).as_deref(), Some("bar"));
        d.shutdown().unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_lifecycle_and_client_events_are_published() {
        let tally = Arc::new(Tally::default());
        let d = daemon(&tally);
        let mut rx = d.subscribe();

        let conn = d.connect("kb").unwrap();
        conn.run_on_ready(|e: &mut FakeEngine| Ok(e.push("commit", "好")))
            .await
            .unwrap();
        d.disconnect("kb").unwrap();

        let mut kinds = Vec::new();
        while let Ok(Ok(ev)) = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await {
            kinds.push(ev.kind);
        }
        for kind in [
            EventKind::EngineStarting,
            EventKind::EngineReady,
            EventKind::ClientConnected,
            EventKind::EnginePushed,
            EventKind::EngineStopping,
            EventKind::EngineStopped,
            EventKind::ClientDisconnected,
        ] {
            assert!(kinds.contains(&kind), "missing {kind:?} in {kinds:?}");
        }
        let pos = |k| kinds.iter().position(|x| *x == k);
        assert!(pos(EventKind::EngineStarting) < pos(EventKind::EngineReady));
        assert!(pos(EventKind::EngineStopping) < pos(EventKind::EngineStopped));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_abandoned_jobs_are_reported() {
        let tally = Arc::new(Tally::default());
        let d = daemon(&tally);
        let mut rx = d.subscribe();
        let conn = d.connect("kb").unwrap();
        conn.run_on_ready(|_| Ok(())).await.unwrap();

        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        assert!(conn.run_if_ready(move |_| {
            entered_tx.send(()).ok();
            release_rx.recv().ok();
            Ok(())
        })
        .unwrap());
        entered_rx.recv().unwrap();
        assert!(conn.run_if_ready(|_| Ok(())).unwrap());

        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            release_tx.send(()).ok();
        });
        let abandoned = d.shutdown().unwrap();
        assert_eq!(abandoned.len(), 1);
        assert_eq!(abandoned[0].label, "kb");

        let mut found = None;
        while let Ok(Ok(ev)) = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await {
            if ev.kind == EventKind::JobsAbandoned {
                found = Some(ev);
                break;
            }
        }
        let ev = found.expect("JobsAbandoned published");
        assert_eq!(ev.count, Some(1));
        assert_eq!(ev.reason.as_deref(), Some("kb"));
    }

    struct Recorder(Arc<Mutex<Vec<EventKind>>>);

    #[async_trait]
    impl Subscribe for Recorder {
        async fn on_event(&self, e: &Event) {
            self.0.lock().unwrap().push(e.kind);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_subscribers_receive_events() {
        let tally = Arc::new(Tally::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let d = DaemonBuilder::new(Config::default())
            .with_subscribers(vec![Arc::new(Recorder(seen.clone()))])
            .build(FakeEngine::factory(tally.clone()));

        d.connect("kb").unwrap();
        d.disconnect("kb").unwrap();

        for _ in 0..50 {
            if seen.lock().unwrap().contains(&EventKind::ClientDisconnected) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let seen = seen.lock().unwrap();
        assert!(seen.contains(&EventKind::ClientConnected));
        assert!(seen.contains(&EventKind::ClientDisconnected));
        assert!(tally.pumps() > 0);
    }
}

//! In-memory engine used by tests.
//!
//! Records which thread touched it and how often it was started, stopped and
//! pumped. It is deliberately `!Send`: it only works because the dispatcher
//! creates it on the worker thread.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, ThreadId};
use std::time::Duration;

use crate::engine::{BindingFactory, EngineBinding, EngineConfig, EventSink, WakeHandle, lock};

const PUMP_TIMEOUT: Duration = Duration::from_millis(50);

/// Shared counters observed by the test.
#[derive(Default)]
pub(crate) struct Tally {
    starts: AtomicUsize,
    stops: AtomicUsize,
    pumps: AtomicUsize,
    owner: Mutex<Option<ThreadId>>,
    foreign: AtomicBool,
    fail_next_start: AtomicBool,
    journal: Mutex<Vec<&'static str>>,
}

impl Tally {
    pub(crate) fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub(crate) fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub(crate) fn pumps(&self) -> usize {
        self.pumps.load(Ordering::SeqCst)
    }

    /// Every start and stop, in order.
    pub(crate) fn journal(&self) -> Vec<&'static str> {
        lock(&self.journal).clone()
    }

    /// Makes the next `start` panic, as a native crash would.
    pub(crate) fn fail_next_start(&self) {
        self.fail_next_start.store(true, Ordering::SeqCst);
    }

    pub(crate) fn touched_from_foreign_thread(&self) -> bool {
        self.foreign.load(Ordering::SeqCst)
    }

    fn touch(&self) {
        let me = thread::current().id();
        let mut owner = lock(&self.owner);
        match *owner {
            None => *owner = Some(me),
            Some(id) if id != me => self.foreign.store(true, Ordering::SeqCst),
            Some(_) => {}
        }
    }
}

pub(crate) struct FakeEngine {
    tally: Arc<Tally>,
    start_delay: Duration,
    signal: Arc<(Mutex<bool>, Condvar)>,
    sink: Option<EventSink>,
    /// Scratch state for jobs.
    pub(crate) counter: u64,
    _not_send: PhantomData<*const ()>,
}

impl FakeEngine {
    pub(crate) fn factory(tally: Arc<Tally>) -> BindingFactory<Self> {
        Self::factory_with_delay(tally, Duration::ZERO)
    }

    /// Engine whose `start` takes `delay`.
    pub(crate) fn factory_with_delay(tally: Arc<Tally>, delay: Duration) -> BindingFactory<Self> {
        Arc::new(move || FakeEngine {
            tally: tally.clone(),
            start_delay: delay,
            signal: Arc::new((Mutex::new(false), Condvar::new())),
            sink: None,
            counter: 0,
            _not_send: PhantomData,
        })
    }

    /// Pushes an engine event, as a native callback would.
    pub(crate) fn push(&self, topic: &str, payload: &str) -> bool {
        self.tally.touch();
        self.sink
            .as_ref()
            .is_some_and(|sink| sink.deliver(topic, payload))
    }
}

impl EngineBinding for FakeEngine {
    fn start(&mut self, _config: &EngineConfig, sink: EventSink) {
        self.tally.touch();
        if !self.start_delay.is_zero() {
            thread::sleep(self.start_delay);
        }
        if self.tally.fail_next_start.swap(false, Ordering::SeqCst) {
            *lock(&self.tally.owner) = None;
            panic!("dictionary failed to load");
        }
        self.sink = Some(sink);
        self.tally.starts.fetch_add(1, Ordering::SeqCst);
        lock(&self.tally.journal).push("start");
    }

    fn stop(&mut self) {
        self.tally.touch();
        self.sink = None;
        self.tally.stops.fetch_add(1, Ordering::SeqCst);
        lock(&self.tally.journal).push("stop");
        // The next cycle runs on a fresh worker thread.
        *lock(&self.tally.owner) = None;
    }

    fn pump_once(&mut self) {
        self.tally.touch();
        self.tally.pumps.fetch_add(1, Ordering::SeqCst);
        let (flag, cvar) = &*self.signal;
        let guard = lock(flag);
        let mut woken = match cvar.wait_timeout_while(guard, PUMP_TIMEOUT, |woken| !*woken) {
            Ok((guard, _)) => guard,
            Err(poisoned) => poisoned.into_inner().0,
        };
        *woken = false;
    }

    fn wake_handle(&self) -> WakeHandle {
        let signal = Arc::clone(&self.signal);
        WakeHandle::new(move || {
            let (flag, cvar) = &*signal;
            *lock(flag) = true;
            cvar.notify_one();
        })
    }
}

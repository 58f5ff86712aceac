//! # Example: shared_engine
//!
//! Two UI components share one toy input-method engine.
//!
//! Shows how to:
//! - Implement [`EngineBinding`] for an engine that must stay on one thread.
//! - Attach clients with [`Daemon::connect`] and run work through [`Connection`].
//! - Push engine events back through [`EventSink`] and watch them on the bus.
//! - Reconcile predicted cursor moves with [`CursorTracker`].
//!
//! ## Flow
//! ```text
//! connect("keyboard") ──► engine start (worker thread)
//! connect("candidates")
//! keyboard.run_on_ready(type "nihao") ──► engine pushes "preedit" / "commit"
//! candidates.run_immediately(read candidates)
//! disconnect("keyboard"), disconnect("candidates") ──► engine stop
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=debug cargo run --example shared_engine
//! ```

use std::sync::{Arc, mpsc};
use std::time::Duration;

use imehost::{
    BindingFactory, Config, CursorTracker, DaemonBuilder, EngineBinding, EngineConfig, EventKind,
    EventSink, Subscribe, WakeHandle,
};
use tracing_subscriber::EnvFilter;

const TABLE: &[(&str, &[&str])] = &[
    ("ni", &["你", "尼", "泥"]),
    ("hao", &["好", "号", "毫"]),
    ("nihao", &["你好"]),
];

/// Toy engine: composes pinyin and offers candidates from a fixed table.
/// Not `Sync` (it owns an `mpsc::Receiver`); only the engine thread sees it.
struct ToyEngine {
    sink: Option<EventSink>,
    wake_tx: mpsc::Sender<()>,
    wake_rx: mpsc::Receiver<()>,
    composing: String,
}

impl ToyEngine {
    fn new() -> Self {
        let (wake_tx, wake_rx) = mpsc::channel();
        Self {
            sink: None,
            wake_tx,
            wake_rx,
            composing: String::new(),
        }
    }

    fn push(&self, topic: &str, payload: &str) {
        if let Some(sink) = &self.sink {
            sink.deliver(topic, payload);
        }
    }

    fn type_key(&mut self, key: char) {
        self.composing.push(key);
        self.push("preedit", &self.composing);
    }

    fn candidates(&self) -> Vec<&'static str> {
        TABLE
            .iter()
            .find(|(pinyin, _)| *pinyin == self.composing)
            .map(|(_, words)| words.to_vec())
            .unwrap_or_default()
    }

    fn commit(&mut self, index: usize) -> anyhow::Result<&'static str> {
        let word = self
            .candidates()
            .get(index)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("no candidate {index} for {:?}", self.composing))?;
        self.composing.clear();
        self.push("commit", word);
        Ok(word)
    }
}

impl EngineBinding for ToyEngine {
    fn start(&mut self, config: &EngineConfig, sink: EventSink) {
        tracing::info!(locale = config.locale().unwrap_or("default"), "toy engine starting");
        self.sink = Some(sink);
    }

    fn stop(&mut self) {
        self.sink = None;
        self.composing.clear();
    }

    fn pump_once(&mut self) {
        let _ = self.wake_rx.recv_timeout(Duration::from_millis(100));
    }

    fn wake_handle(&self) -> WakeHandle {
        let tx = self.wake_tx.clone();
        WakeHandle::new(move || {
            let _ = tx.send(());
        })
    }
}

/// Prints what the engine pushes.
struct CandidateBar;

#[async_trait::async_trait]
impl Subscribe for CandidateBar {
    async fn on_event(&self, ev: &imehost::Event) {
        if ev.kind == EventKind::EnginePushed {
            println!(
                "[bar] {}: {}",
                ev.topic.as_deref().unwrap_or("<none>"),
                ev.payload.as_deref().unwrap_or("")
            );
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut cfg = Config::default();
    cfg.engine.locale = "zh_CN".into();

    let mut subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(CandidateBar)];
    #[cfg(feature = "logging")]
    subs.push(Arc::new(imehost::LogWriter::new()));

    let factory: BindingFactory<ToyEngine> = Arc::new(ToyEngine::new);
    let daemon = DaemonBuilder::new(cfg).with_subscribers(subs).build(factory);

    let keyboard = daemon.connect("keyboard")?;
    let candidates = daemon.connect("candidates")?;
    println!("clients: {:?}", daemon.clients());

    // The keyboard predicts the cursor as it types; the engine confirms later.
    let mut cursor = CursorTracker::new();
    for key in "nihao".chars() {
        cursor.predict_offset(1, 1);
        keyboard
            .run_on_ready(move |engine: &mut ToyEngine| {
                engine.type_key(key);
                Ok(())
            })
            .await?;
    }

    let offered = tokio::task::spawn_blocking({
        let candidates = candidates.clone();
        move || candidates.run_immediately(|engine: &mut ToyEngine| Ok(engine.candidates()))
    })
    .await??;
    println!("candidates: {offered:?}");

    let word = keyboard.run_on_ready(|engine: &mut ToyEngine| engine.commit(0)).await?;
    let outcome = cursor.consume(5, 5);
    println!("committed {word}, cursor {} ({outcome:?})", cursor.current());

    // Committing again fails only for this call.
    if let Err(err) = keyboard.run_on_ready(|engine: &mut ToyEngine| engine.commit(3)).await {
        println!("expected failure: {} ({})", err, err.as_label());
    }

    daemon.disconnect("keyboard")?;
    println!("after keyboard left: running={}", daemon.is_running());
    daemon.disconnect("candidates")?;
    println!("after candidates left: running={}", daemon.is_running());

    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok(())
}

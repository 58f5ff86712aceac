use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;

use crate::{
    core::{Config, Daemon},
    engine::{BindingFactory, Dispatcher, EngineBinding, EngineState, Lifecycle},
    events::{Bus, Event, EventKind},
    subscribers::{Subscribe, SubscriberSet},
};

/// Builder for a [`Daemon`].
pub struct DaemonBuilder {
    cfg: Config,
    subscribers: Vec<Arc<dyn Subscribe>>,
    runtime: Option<Handle>,
}

impl DaemonBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            runtime: None,
        }
    }

    /// Sets event subscribers.
    ///
    /// Subscribers receive host events (engine lifecycle, engine pushes, clients)
    /// through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Runtime for the event forwarder and subscriber workers.
    ///
    /// Defaults to the runtime `build` is called from.
    pub fn with_runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Builds the daemon. The engine is not started until the first `connect`.
    ///
    /// # Panics
    /// Without [`with_runtime`](Self::with_runtime), panics when called outside
    /// a tokio runtime.
    pub fn build<B: EngineBinding>(self, factory: BindingFactory<B>) -> Arc<Daemon<B>> {
        let rt = self.runtime.unwrap_or_else(Handle::current);
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let runtime_token = CancellationToken::new();

        let subs = SubscriberSet::new(self.subscribers, bus.clone(), &rt);
        rt.spawn(subscriber_listener(bus.subscribe(), subs, runtime_token.clone()));

        let lifecycle = Arc::new(Lifecycle::new());
        let observer = lifecycle.add_observer({
            let bus = bus.clone();
            move |state: EngineState| bus.publish(Event::new(EventKind::for_state(state)))
        });

        let dispatcher = Arc::new(Dispatcher::new(
            factory,
            &self.cfg,
            lifecycle,
            bus.clone(),
            rt,
        ));
        Arc::new(Daemon::new_internal(bus, dispatcher, runtime_token, observer))
    }
}

/// Forwards bus events to the subscriber set until the daemon is dropped.
async fn subscriber_listener(
    mut rx: broadcast::Receiver<Event>,
    subs: SubscriberSet,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            msg = rx.recv() => match msg {
                Ok(ev) => subs.emit(&ev),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "subscriber listener lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
    subs.shutdown().await;
}

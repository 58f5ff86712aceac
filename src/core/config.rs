//! # Host configuration.
//!
//! Provides [`Config`], the settings for one [`Daemon`](crate::Daemon) and the
//! engine it runs.
//!
//! ## Sentinel values
//! - `bus_capacity = 0` → treated as 1
//! - `event_queue_capacity = 0` → treated as 1
//! - `worker_name = ""` → `"imehost-engine"`

use crate::engine::EngineConfig;

const DEFAULT_WORKER_NAME: &str = "imehost-engine";

/// Configuration for the daemon and its engine worker.
///
/// ## Field semantics
/// - `bus_capacity`: event bus ring buffer size (min 1)
/// - `event_queue_capacity`: engine callback queue size (min 1); callbacks past it are dropped
/// - `worker_name`: name of the engine worker thread
/// - `engine`: startup parameters handed to the binding
///
/// ## Notes
/// All fields are public. Prefer the helper accessors over sentinel checks.
#[derive(Clone, Debug)]
pub struct Config {
    /// Capacity of the event bus broadcast channel.
    ///
    /// Receivers lagging behind by more than `bus_capacity` events get
    /// `Lagged` and skip the older ones.
    pub bus_capacity: usize,

    /// Capacity of the queue between engine callbacks and the bus.
    ///
    /// The engine thread never waits on it: an event that does not fit is
    /// dropped and reported as `EngineEventDropped`.
    pub event_queue_capacity: usize,

    /// Name of the engine worker thread.
    pub worker_name: String,

    /// Parameters for [`EngineBinding::start`](crate::engine::EngineBinding::start).
    pub engine: EngineConfig,
}

impl Config {
    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Returns an engine callback queue capacity clamped to a minimum of 1.
    #[inline]
    pub fn event_queue_capacity_clamped(&self) -> usize {
        self.event_queue_capacity.max(1)
    }

    /// Worker thread name, falling back to the default when empty.
    #[inline]
    pub fn worker_name(&self) -> &str {
        if self.worker_name.is_empty() {
            DEFAULT_WORKER_NAME
        } else {
            &self.worker_name
        }
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `bus_capacity = 1024`
    /// - `event_queue_capacity = 256`
    /// - `worker_name = "imehost-engine"`
    /// - `engine = EngineConfig::default()` (engine defaults everywhere)
    fn default() -> Self {
        Self {
            bus_capacity: 1024,
            event_queue_capacity: 256,
            worker_name: DEFAULT_WORKER_NAME.to_string(),
            engine: EngineConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels_are_clamped() {
        let cfg = Config {
            bus_capacity: 0,
            event_queue_capacity: 0,
            worker_name: String::new(),
            ..Config::default()
        };
        assert_eq!(cfg.bus_capacity_clamped(), 1);
        assert_eq!(cfg.event_queue_capacity_clamped(), 1);
        assert_eq!(cfg.worker_name(), "imehost-engine");
    }
}

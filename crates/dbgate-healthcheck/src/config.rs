use crate::events::HealthEvent;
use dbgate_core::events::{EventListeners, FnListener};
use std::time::Duration;

/// Default probe interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

/// Configuration for a [`HealthMonitor`](crate::HealthMonitor).
#[derive(Clone)]
pub struct HealthMonitorConfig {
    pub(crate) interval: Duration,
    pub(crate) name: String,
    pub(crate) event_listeners: EventListeners<HealthEvent>,
}

impl HealthMonitorConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> HealthMonitorConfigBuilder {
        HealthMonitorConfigBuilder::new()
    }

    /// Time between probes.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        HealthMonitorConfigBuilder::new().build()
    }
}

impl std::fmt::Debug for HealthMonitorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitorConfig")
            .field("interval", &self.interval)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Builder for [`HealthMonitorConfig`].
pub struct HealthMonitorConfigBuilder {
    interval: Duration,
    name: String,
    event_listeners: EventListeners<HealthEvent>,
}

impl HealthMonitorConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            name: "health".to_string(),
            event_listeners: EventListeners::new(),
        }
    }

    /// Sets the time between probes. Also the activity window that suppresses a probe.
    ///
    /// Default: 30 seconds. Zero keeps the background loop off.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the monitor's name.
    ///
    /// Default: "health"
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback when a probe fails.
    pub fn on_probe_failed<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let HealthEvent::ProbeFailed { reason, .. } = event {
                f(reason);
            }
        }));
        self
    }

    /// Registers a callback when a probe succeeds, with its latency.
    pub fn on_probe_succeeded<F>(mut self, f: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let HealthEvent::ProbeSucceeded { latency, .. } = event {
                f(*latency);
            }
        }));
        self
    }

    /// Registers a listener for every health event.
    pub fn on_event<F>(mut self, f: F) -> Self
    where
        F: Fn(&HealthEvent) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(f));
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> HealthMonitorConfig {
        HealthMonitorConfig {
            interval: self.interval,
            name: self.name,
            event_listeners: self.event_listeners,
        }
    }
}

impl Default for HealthMonitorConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

//! Configuration for the query scheduler.

use crate::events::SchedulerEvent;
use crate::QueryScheduler;
use dbgate_core::events::{EventListeners, FnListener};
use std::time::Duration;

/// Default number of concurrent execution slots.
pub const DEFAULT_MAX_CONCURRENT: usize = 25;
/// Default queue depth above which a backpressure warning is raised.
pub const DEFAULT_QUEUE_WARN_DEPTH: usize = 50;
/// Default wait after which the oldest queued task is reported as stalled.
pub const DEFAULT_STALL_THRESHOLD: Duration = Duration::from_secs(5);

/// Configuration for a [`QueryScheduler`].
#[derive(Clone)]
pub struct SchedulerConfig {
    pub(crate) max_concurrent: usize,
    pub(crate) queue_warn_depth: usize,
    pub(crate) stall_threshold: Duration,
    pub(crate) name: String,
    pub(crate) event_listeners: EventListeners<SchedulerEvent>,
}

impl SchedulerConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> SchedulerConfigBuilder {
        SchedulerConfigBuilder::new()
    }

    /// Number of execution slots.
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}

impl std::fmt::Debug for SchedulerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerConfig")
            .field("max_concurrent", &self.max_concurrent)
            .field("queue_warn_depth", &self.queue_warn_depth)
            .field("stall_threshold", &self.stall_threshold)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Builder for [`SchedulerConfig`].
pub struct SchedulerConfigBuilder {
    max_concurrent: usize,
    queue_warn_depth: usize,
    stall_threshold: Duration,
    name: String,
    event_listeners: EventListeners<SchedulerEvent>,
}

impl SchedulerConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            queue_warn_depth: DEFAULT_QUEUE_WARN_DEPTH,
            stall_threshold: DEFAULT_STALL_THRESHOLD,
            name: "scheduler".to_string(),
            event_listeners: EventListeners::new(),
        }
    }

    /// Sets the number of tasks that may run at once.
    ///
    /// Values below 1 are treated as 1.
    ///
    /// Default: 25
    pub fn max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max.max(1);
        self
    }

    /// Sets the queue depth that triggers a backpressure warning.
    ///
    /// Default: 50
    pub fn queue_warn_depth(mut self, depth: usize) -> Self {
        self.queue_warn_depth = depth;
        self
    }

    /// Sets how long the oldest queued task may wait before a stall is reported.
    ///
    /// Default: 5 seconds
    pub fn stall_threshold(mut self, threshold: Duration) -> Self {
        self.stall_threshold = threshold;
        self
    }

    /// Sets the scheduler's name.
    ///
    /// Default: "scheduler"
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback when queue depth crosses the warning threshold.
    ///
    /// Fires once per episode; it re-arms when the queue drains back under
    /// the threshold.
    ///
    /// # Example
    /// ```rust
    /// use dbgate_scheduler::SchedulerConfig;
    ///
    /// let scheduler = SchedulerConfig::builder()
    ///     .max_concurrent(25)
    ///     .queue_warn_depth(50)
    ///     .on_backpressure(|depth| eprintln!("{depth} queries waiting"))
    ///     .build();
    /// ```
    pub fn on_backpressure<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let SchedulerEvent::Backpressure { depth, .. } = event {
                f(*depth);
            }
        }));
        self
    }

    /// Registers a callback when the oldest queued task exceeds the stall threshold.
    pub fn on_stalled<F>(mut self, f: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let SchedulerEvent::Stalled { oldest_wait, .. } = event {
                f(*oldest_wait);
            }
        }));
        self
    }

    /// Registers a callback when a task is granted a slot.
    ///
    /// # Callback Signature
    /// `Fn(i32, Duration)` - the task's priority and how long it waited.
    pub fn on_admitted<F>(mut self, f: F) -> Self
    where
        F: Fn(i32, Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let SchedulerEvent::Admitted {
                priority, waited, ..
            } = event
            {
                f(*priority, *waited);
            }
        }));
        self
    }

    /// Registers a listener for every scheduler event.
    pub fn on_event<F>(mut self, f: F) -> Self
    where
        F: Fn(&SchedulerEvent) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(f));
        self
    }

    /// Builds the configuration without constructing a scheduler.
    pub fn into_config(self) -> SchedulerConfig {
        SchedulerConfig {
            max_concurrent: self.max_concurrent,
            queue_warn_depth: self.queue_warn_depth,
            stall_threshold: self.stall_threshold,
            name: self.name,
            event_listeners: self.event_listeners,
        }
    }

    /// Builds the scheduler.
    pub fn build(self) -> QueryScheduler {
        QueryScheduler::new(self.into_config())
    }
}

impl Default for SchedulerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

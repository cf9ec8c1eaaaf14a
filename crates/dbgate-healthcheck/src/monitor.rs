//! The background probe loop.

use crate::config::HealthMonitorConfig;
use crate::events::HealthEvent;
use crate::target::{LivenessTarget, ProbeOutcome};
#[cfg(feature = "metrics")]
use metrics::{counter, histogram};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// What one monitor tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// A real operation succeeded within the interval; no probe was sent.
    Skipped,
    /// No connection exists; nothing was probed.
    NotConnected,
    /// The probe succeeded.
    Alive {
        /// Round-trip time of the probe.
        latency: Duration,
    },
    /// The probe failed and the connection was invalidated.
    Dead {
        /// Why the probe failed.
        reason: String,
    },
}

/// Snapshot of the monitor's bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorStatus {
    /// Whether the background loop is running.
    pub running: bool,
    /// Probes actually sent.
    pub probes: u64,
    /// Ticks skipped because of recent activity.
    pub skipped: u64,
    /// Probes that failed.
    pub failures: u64,
    /// Consecutive failed probes, reset by any success.
    pub consecutive_failures: u64,
    /// When the last tick ran.
    pub last_tick_at: Option<Instant>,
    /// What the last tick did.
    pub last_outcome: Option<TickOutcome>,
}

struct Shared<T> {
    target: T,
    config: HealthMonitorConfig,
    status: Mutex<MonitorStatus>,
}

/// Periodically probes a [`LivenessTarget`] and lets it invalidate itself on failure.
///
/// The monitor never reconnects: reconnection stays with whoever calls next.
pub struct HealthMonitor<T> {
    shared: Arc<Shared<T>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<T: LivenessTarget> HealthMonitor<T> {
    /// Creates a stopped monitor.
    pub fn new(target: T, config: HealthMonitorConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                target,
                config,
                status: Mutex::new(MonitorStatus::default()),
            }),
            task: Mutex::new(None),
        }
    }

    /// Starts the background loop. Does nothing if it is already running or
    /// the interval is zero.
    ///
    /// The first probe happens one interval after start. Must be called from
    /// within a tokio runtime.
    pub fn start(&self) {
        if self.shared.config.interval.is_zero() {
            #[cfg(feature = "tracing")]
            tracing::debug!(monitor = %self.shared.config.name, "health monitor disabled");
            return;
        }
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }

        let shared = Arc::clone(&self.shared);
        let period = shared.config.interval;
        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                shared.tick().await;
            }
        }));
        self.shared.status.lock().running = true;

        #[cfg(feature = "tracing")]
        tracing::debug!(monitor = %self.shared.config.name, interval_ms = period.as_millis() as u64, "health monitor started");
    }

    /// Stops the background loop.
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
            #[cfg(feature = "tracing")]
            tracing::debug!(monitor = %self.shared.config.name, "health monitor stopped");
        }
        self.shared.status.lock().running = false;
    }

    /// Returns true while the background loop is running.
    pub fn is_running(&self) -> bool {
        self.task.lock().as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Runs a single tick now, independent of the background loop.
    pub async fn run_once(&self) -> TickOutcome {
        self.shared.tick().await
    }

    /// Returns a snapshot of the monitor's bookkeeping.
    pub fn status(&self) -> MonitorStatus {
        let mut status = self.shared.status.lock().clone();
        status.running = self.is_running();
        status
    }

    /// Returns the probed target.
    pub fn target(&self) -> &T {
        &self.shared.target
    }
}

impl<T: LivenessTarget> Shared<T> {
    async fn tick(&self) -> TickOutcome {
        let started = Instant::now();
        let name = &self.config.name;

        let recent = self
            .target
            .last_activity()
            .map(|at| started.saturating_duration_since(at))
            .filter(|since| *since < self.config.interval);

        let outcome = if let Some(since_activity) = recent {
            self.config.event_listeners.emit(&HealthEvent::ProbeSkipped {
                component_name: name.clone(),
                timestamp: std::time::Instant::now(),
                since_activity,
            });
            TickOutcome::Skipped
        } else {
            match self.target.probe().await {
                ProbeOutcome::Alive => {
                    let latency = started.elapsed();
                    self.config.event_listeners.emit(&HealthEvent::ProbeSucceeded {
                        component_name: name.clone(),
                        timestamp: std::time::Instant::now(),
                        latency,
                    });
                    #[cfg(feature = "metrics")]
                    histogram!("dbgate_health_probe_duration_seconds", "monitor" => name.clone())
                        .record(latency.as_secs_f64());
                    TickOutcome::Alive { latency }
                }
                ProbeOutcome::NotConnected => {
                    self.config.event_listeners.emit(&HealthEvent::NotConnected {
                        component_name: name.clone(),
                        timestamp: std::time::Instant::now(),
                    });
                    TickOutcome::NotConnected
                }
                ProbeOutcome::Dead(reason) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(monitor = %name, reason = %reason, "liveness probe failed, connection invalidated");
                    self.config.event_listeners.emit(&HealthEvent::ProbeFailed {
                        component_name: name.clone(),
                        timestamp: std::time::Instant::now(),
                        reason: reason.clone(),
                    });
                    TickOutcome::Dead { reason }
                }
            }
        };

        #[cfg(feature = "metrics")]
        counter!(
            "dbgate_health_ticks_total",
            "monitor" => name.clone(),
            "outcome" => match &outcome {
                TickOutcome::Skipped => "skipped",
                TickOutcome::NotConnected => "not_connected",
                TickOutcome::Alive { .. } => "alive",
                TickOutcome::Dead { .. } => "dead",
            }
        )
        .increment(1);

        let mut status = self.status.lock();
        status.last_tick_at = Some(started);
        match &outcome {
            TickOutcome::Skipped => status.skipped += 1,
            TickOutcome::NotConnected => {}
            TickOutcome::Alive { .. } => {
                status.probes += 1;
                status.consecutive_failures = 0;
            }
            TickOutcome::Dead { .. } => {
                status.probes += 1;
                status.failures += 1;
                status.consecutive_failures += 1;
            }
        }
        status.last_outcome = Some(outcome.clone());
        outcome
    }
}

impl<T> Drop for HealthMonitor<T> {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

impl<T> std::fmt::Debug for HealthMonitor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

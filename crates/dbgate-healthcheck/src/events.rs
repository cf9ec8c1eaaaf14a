use dbgate_core::events::GateEvent;
use std::time::{Duration, Instant};

/// Events emitted by the health monitor.
#[derive(Debug, Clone)]
pub enum HealthEvent {
    /// A real operation succeeded within the interval, so no probe was sent.
    ProbeSkipped {
        component_name: String,
        timestamp: Instant,
        since_activity: Duration,
    },
    /// The probe succeeded.
    ProbeSucceeded {
        component_name: String,
        timestamp: Instant,
        latency: Duration,
    },
    /// The probe failed and the connection was invalidated.
    ProbeFailed {
        component_name: String,
        timestamp: Instant,
        reason: String,
    },
    /// No connection exists; the monitor left reconnection to the next caller.
    NotConnected {
        component_name: String,
        timestamp: Instant,
    },
}

impl GateEvent for HealthEvent {
    fn event_type(&self) -> &'static str {
        match self {
            HealthEvent::ProbeSkipped { .. } => "probe_skipped",
            HealthEvent::ProbeSucceeded { .. } => "probe_succeeded",
            HealthEvent::ProbeFailed { .. } => "probe_failed",
            HealthEvent::NotConnected { .. } => "not_connected",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            HealthEvent::ProbeSkipped { timestamp, .. }
            | HealthEvent::ProbeSucceeded { timestamp, .. }
            | HealthEvent::ProbeFailed { timestamp, .. }
            | HealthEvent::NotConnected { timestamp, .. } => *timestamp,
        }
    }

    fn component_name(&self) -> &str {
        match self {
            HealthEvent::ProbeSkipped { component_name, .. }
            | HealthEvent::ProbeSucceeded { component_name, .. }
            | HealthEvent::ProbeFailed { component_name, .. }
            | HealthEvent::NotConnected { component_name, .. } => component_name,
        }
    }
}

use dbgate_core::events::GateEvent;
use std::time::{Duration, Instant};

/// Events emitted by the cooldown gate.
#[derive(Debug, Clone)]
pub enum CooldownEvent {
    /// A quota-exhaustion error opened the gate.
    Tripped {
        component_name: String,
        timestamp: Instant,
        cooldown: Duration,
    },
    /// A trip arrived while the gate was already open; the window was left as is.
    TripIgnored {
        component_name: String,
        timestamp: Instant,
        remaining: Duration,
    },
    /// An admission was refused because the gate is open.
    Rejected {
        component_name: String,
        timestamp: Instant,
        remaining: Duration,
    },
    /// The window elapsed and the gate closed on the next check.
    Expired {
        component_name: String,
        timestamp: Instant,
    },
    /// An operator closed the gate early.
    Reset {
        component_name: String,
        timestamp: Instant,
    },
}

impl GateEvent for CooldownEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CooldownEvent::Tripped { .. } => "tripped",
            CooldownEvent::TripIgnored { .. } => "trip_ignored",
            CooldownEvent::Rejected { .. } => "rejected",
            CooldownEvent::Expired { .. } => "expired",
            CooldownEvent::Reset { .. } => "reset",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            CooldownEvent::Tripped { timestamp, .. }
            | CooldownEvent::TripIgnored { timestamp, .. }
            | CooldownEvent::Rejected { timestamp, .. }
            | CooldownEvent::Expired { timestamp, .. }
            | CooldownEvent::Reset { timestamp, .. } => *timestamp,
        }
    }

    fn component_name(&self) -> &str {
        match self {
            CooldownEvent::Tripped { component_name, .. }
            | CooldownEvent::TripIgnored { component_name, .. }
            | CooldownEvent::Rejected { component_name, .. }
            | CooldownEvent::Expired { component_name, .. }
            | CooldownEvent::Reset { component_name, .. } => component_name,
        }
    }
}

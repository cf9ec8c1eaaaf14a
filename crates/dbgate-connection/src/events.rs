use dbgate_core::events::GateEvent;
use std::time::{Duration, Instant};

/// Events emitted by the connection manager.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// A connect attempt is starting (1-indexed).
    ConnectAttempt {
        component_name: String,
        timestamp: Instant,
        attempt: u32,
    },
    /// A handle was established and verified.
    Connected {
        component_name: String,
        timestamp: Instant,
        generation: u64,
        attempts: u32,
        duration: Duration,
    },
    /// A connect attempt failed.
    ConnectFailed {
        component_name: String,
        timestamp: Instant,
        attempt: u32,
        error: String,
    },
    /// A caller joined a connect attempt already in flight.
    Joined {
        component_name: String,
        timestamp: Instant,
    },
    /// The current handle was marked invalid.
    Invalidated {
        component_name: String,
        timestamp: Instant,
        generation: u64,
        reason: String,
    },
    /// The manager was closed and its handle released.
    Closed {
        component_name: String,
        timestamp: Instant,
    },
}

impl GateEvent for ConnectionEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ConnectionEvent::ConnectAttempt { .. } => "connect_attempt",
            ConnectionEvent::Connected { .. } => "connected",
            ConnectionEvent::ConnectFailed { .. } => "connect_failed",
            ConnectionEvent::Joined { .. } => "joined",
            ConnectionEvent::Invalidated { .. } => "invalidated",
            ConnectionEvent::Closed { .. } => "closed",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            ConnectionEvent::ConnectAttempt { timestamp, .. }
            | ConnectionEvent::Connected { timestamp, .. }
            | ConnectionEvent::ConnectFailed { timestamp, .. }
            | ConnectionEvent::Joined { timestamp, .. }
            | ConnectionEvent::Invalidated { timestamp, .. }
            | ConnectionEvent::Closed { timestamp, .. } => *timestamp,
        }
    }

    fn component_name(&self) -> &str {
        match self {
            ConnectionEvent::ConnectAttempt { component_name, .. }
            | ConnectionEvent::Connected { component_name, .. }
            | ConnectionEvent::ConnectFailed { component_name, .. }
            | ConnectionEvent::Joined { component_name, .. }
            | ConnectionEvent::Invalidated { component_name, .. }
            | ConnectionEvent::Closed { component_name, .. } => component_name,
        }
    }
}

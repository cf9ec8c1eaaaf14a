use dbgate_core::events::GateEvent;
use std::time::{Duration, Instant};

/// Events emitted by the retry loop.
#[derive(Debug, Clone)]
pub enum RetryEvent {
    /// A retry is about to be made after `delay`.
    Retry {
        component_name: String,
        timestamp: Instant,
        attempt: usize,
        delay: Duration,
    },
    /// The operation succeeded, on the first try or after retries.
    Success {
        component_name: String,
        timestamp: Instant,
        attempts: usize,
    },
    /// Every permitted attempt failed with a retryable error.
    Exhausted {
        component_name: String,
        timestamp: Instant,
        attempts: usize,
    },
    /// The error was fatal or quota-related and was propagated immediately.
    NotRetried {
        component_name: String,
        timestamp: Instant,
        attempts: usize,
    },
    /// The cooldown gate refused the attempt before it reached the driver.
    RejectedByCooldown {
        component_name: String,
        timestamp: Instant,
        attempt: usize,
        remaining: Duration,
    },
}

impl GateEvent for RetryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RetryEvent::Retry { .. } => "retry",
            RetryEvent::Success { .. } => "success",
            RetryEvent::Exhausted { .. } => "exhausted",
            RetryEvent::NotRetried { .. } => "not_retried",
            RetryEvent::RejectedByCooldown { .. } => "rejected_by_cooldown",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RetryEvent::Retry { timestamp, .. }
            | RetryEvent::Success { timestamp, .. }
            | RetryEvent::Exhausted { timestamp, .. }
            | RetryEvent::NotRetried { timestamp, .. }
            | RetryEvent::RejectedByCooldown { timestamp, .. } => *timestamp,
        }
    }

    fn component_name(&self) -> &str {
        match self {
            RetryEvent::Retry { component_name, .. }
            | RetryEvent::Success { component_name, .. }
            | RetryEvent::Exhausted { component_name, .. }
            | RetryEvent::NotRetried { component_name, .. }
            | RetryEvent::RejectedByCooldown { component_name, .. } => component_name,
        }
    }
}

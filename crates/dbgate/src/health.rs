//! Health reporting.

use std::fmt;
use std::time::Duration;

/// Overall health as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum HealthStatus {
    /// Connected, and the queue is moving.
    Healthy,
    /// The quota cooldown is open; every call is refused.
    Cooldown,
    /// Connected or connecting, but the queue is backing up or stalled.
    Degraded,
    /// No usable connection.
    Disconnected,
}

impl HealthStatus {
    /// Short lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Cooldown => "cooldown",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of [`Database::health_check`](crate::Database::health_check).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HealthReport {
    /// Overall status.
    pub status: HealthStatus,
    /// Connection lifecycle state ("ready", "invalid", ...).
    pub connection_state: String,
    /// Queries waiting for a slot.
    pub queue_length: usize,
    /// Queries holding a slot.
    pub active_queries: usize,
    /// Slot count.
    pub max_concurrent: usize,
    /// How long the oldest queued query has been waiting.
    pub oldest_queued: Option<Duration>,
    /// Whole minutes left in the cooldown, rounded up. Present only in cooldown.
    pub remaining_cooldown_minutes: Option<u64>,
    /// Round-trip of the probe run for this report, when one was sent.
    pub probe_latency: Option<Duration>,
}

impl HealthReport {
    /// Returns true for [`HealthStatus::Healthy`].
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

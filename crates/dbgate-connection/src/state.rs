//! Connection lifecycle state.

use std::time::Duration;
use tokio::time::Instant;

/// Where the connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No connection has been attempted yet.
    Uninitialized,
    /// A connect attempt is in flight; callers join it.
    Connecting,
    /// A verified handle is available.
    Ready,
    /// The last handle failed or connecting gave up; the next caller reconnects.
    Invalid,
}

impl ConnectionState {
    /// Returns true if a verified handle is available.
    pub fn is_ready(&self) -> bool {
        matches!(self, ConnectionState::Ready)
    }

    /// Short lowercase name for logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Uninitialized => "uninitialized",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Ready => "ready",
            ConnectionState::Invalid => "invalid",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the connection manager.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionStatus {
    /// Current lifecycle state.
    pub state: ConnectionState,
    /// Incremented on every successful connect; tags handles for invalidation.
    pub generation: u64,
    /// When the current handle was established.
    pub connected_at: Option<Instant>,
    /// When a real operation last succeeded.
    pub last_activity: Option<Instant>,
    /// Connect attempts made since the manager was created.
    pub connect_attempts: u64,
    /// Message of the most recent connect or probe failure.
    pub last_error: Option<String>,
}

impl ConnectionStatus {
    /// Time since the last successful operation, if any.
    pub fn idle_for(&self) -> Option<Duration> {
        self.last_activity.map(|at| at.elapsed())
    }
}

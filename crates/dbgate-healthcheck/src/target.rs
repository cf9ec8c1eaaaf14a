//! What the monitor probes.

use std::future::Future;
use tokio::time::Instant;

/// Result of a single liveness probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The probe query succeeded.
    Alive,
    /// There is no live connection to probe; nothing was sent.
    NotConnected,
    /// The probe failed or timed out. The target has already invalidated itself.
    Dead(String),
}

/// A resource the [`HealthMonitor`](crate::HealthMonitor) can probe.
///
/// Implementors bound their own probe with a timeout and, when it fails, mark
/// themselves invalid so the next caller reconnects. They must never reconnect
/// from inside `probe`.
///
/// # Examples
///
/// ```rust
/// use dbgate_healthcheck::{LivenessTarget, ProbeOutcome};
/// use tokio::time::Instant;
///
/// struct AlwaysUp;
///
/// impl LivenessTarget for AlwaysUp {
///     fn last_activity(&self) -> Option<Instant> {
///         None
///     }
///
///     async fn probe(&self) -> ProbeOutcome {
///         ProbeOutcome::Alive
///     }
/// }
/// ```
pub trait LivenessTarget: Send + Sync + 'static {
    /// When a real operation last succeeded, if ever.
    fn last_activity(&self) -> Option<Instant>;

    /// Issues one liveness probe.
    fn probe(&self) -> impl Future<Output = ProbeOutcome> + Send;
}

impl<T: LivenessTarget> LivenessTarget for std::sync::Arc<T> {
    fn last_activity(&self) -> Option<Instant> {
        (**self).last_activity()
    }

    fn probe(&self) -> impl Future<Output = ProbeOutcome> + Send {
        (**self).probe()
    }
}

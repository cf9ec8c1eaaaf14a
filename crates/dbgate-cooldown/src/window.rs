//! Lock-free cooldown window.
//!
//! The window end is stored as microseconds since a per-gate epoch, offset by
//! one so that zero always means "inactive". Expiry is lazy: whoever observes
//! `now >= ends_at` first clears the slot with a compare-and-swap.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// What a caller observed when polling the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Observation {
    /// No window is active.
    Closed,
    /// The window is active with this much time left.
    Open(Duration),
    /// The window had elapsed and this caller cleared it.
    Expired,
}

/// Result of an attempt to open the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Trip {
    /// The window opened for the full duration.
    Opened,
    /// A window was already active; it was left unchanged.
    AlreadyOpen(Duration),
}

pub(crate) struct CooldownWindow {
    epoch: Instant,
    ends_at: AtomicU64,
}

impl CooldownWindow {
    pub(crate) fn new() -> Self {
        Self {
            epoch: Instant::now(),
            ends_at: AtomicU64::new(0),
        }
    }

    fn now(&self) -> u64 {
        micros(Instant::now().saturating_duration_since(self.epoch)).saturating_add(1)
    }

    pub(crate) fn observe(&self) -> Observation {
        let ends_at = self.ends_at.load(Ordering::Acquire);
        if ends_at == 0 {
            return Observation::Closed;
        }

        let now = self.now();
        if now < ends_at {
            return Observation::Open(Duration::from_micros(ends_at - now));
        }

        match self
            .ends_at
            .compare_exchange(ends_at, 0, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Observation::Expired,
            // Someone else cleared it (or re-tripped it); report what is there now.
            Err(0) => Observation::Closed,
            Err(other) if now < other => Observation::Open(Duration::from_micros(other - now)),
            Err(_) => Observation::Closed,
        }
    }

    pub(crate) fn trip(&self, duration: Duration) -> Trip {
        let now = self.now();
        let until = now.saturating_add(micros(duration));
        let mut current = self.ends_at.load(Ordering::Acquire);

        loop {
            if current != 0 && now < current {
                return Trip::AlreadyOpen(Duration::from_micros(current - now));
            }
            match self
                .ends_at
                .compare_exchange(current, until, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Trip::Opened,
                Err(actual) => current = actual,
            }
        }
    }

    /// Returns true if an active window was cleared.
    pub(crate) fn clear(&self) -> bool {
        self.ends_at.swap(0, Ordering::AcqRel) != 0
    }
}

fn micros(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}

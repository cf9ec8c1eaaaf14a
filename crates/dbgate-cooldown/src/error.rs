use dbgate_core::error::whole_minutes;
use dbgate_core::DbError;
use std::time::Duration;

/// Returned when an admission is attempted while the cooldown window is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("in cooldown, retry after {} minute(s)", whole_minutes(.remaining))]
pub struct CooldownActive {
    /// Time left before the gate closes.
    pub remaining: Duration,
}

impl CooldownActive {
    /// Remaining time rounded up to whole minutes.
    pub fn remaining_minutes(&self) -> u64 {
        whole_minutes(self.remaining)
    }

    /// Remaining time rounded up to whole seconds.
    pub fn remaining_seconds(&self) -> u64 {
        let secs = self.remaining.as_secs();
        if self.remaining.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }
}

impl From<CooldownActive> for DbError {
    fn from(err: CooldownActive) -> Self {
        DbError::CooldownActive {
            remaining: err.remaining,
        }
    }
}

use dbgate_core::DbError;
use std::time::Duration;

/// Errors produced by the scheduler itself, as opposed to the scheduled task.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    /// The scheduler is shutting down and accepts no new work.
    #[error("scheduler is shutting down")]
    Shutdown,

    /// The per-call deadline expired, either in the queue or while running.
    #[error("call deadline exceeded after {waited:?}")]
    DeadlineExceeded {
        /// Time spent in the call before it gave up.
        waited: Duration,
    },

    /// Shutdown's drain window closed while the task was queued or running.
    #[error("abandoned by shutdown")]
    Abandoned,
}

impl From<SchedulerError> for DbError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::Shutdown | SchedulerError::Abandoned => DbError::Shutdown,
            SchedulerError::DeadlineExceeded { waited } => DbError::DeadlineExceeded { waited },
        }
    }
}

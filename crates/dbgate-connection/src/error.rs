use dbgate_core::{DbError, DriverError};
use std::time::Duration;

/// Why a connection could not be provided.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    /// Every connect attempt failed.
    #[error("could not connect after {attempts} attempt(s): {source}")]
    Exhausted {
        /// Attempts made.
        attempts: u32,
        /// The last driver error seen.
        source: DriverError,
    },

    /// The provider refused the connection for quota reasons; no further attempts were made.
    #[error("connection refused, quota exhausted: {source}")]
    QuotaExhausted {
        /// The driver error, unchanged.
        source: DriverError,
    },

    /// The connect task stopped before reporting a result.
    #[error("connect attempt aborted")]
    Aborted,

    /// The manager was closed.
    #[error("connection manager is closed")]
    Closed,
}

impl ConnectError {
    /// Returns the underlying driver error, if any.
    pub fn driver_error(&self) -> Option<&DriverError> {
        match self {
            ConnectError::Exhausted { source, .. } | ConnectError::QuotaExhausted { source } => {
                Some(source)
            }
            ConnectError::Aborted | ConnectError::Closed => None,
        }
    }
}

impl From<ConnectError> for DbError {
    fn from(err: ConnectError) -> Self {
        match err {
            ConnectError::Exhausted { attempts, source } => DbError::Connect { attempts, source },
            // The caller owning the cooldown gate fills in the real hint.
            ConnectError::QuotaExhausted { source } => DbError::QuotaExhausted {
                source,
                retry_after: Duration::ZERO,
            },
            ConnectError::Aborted => DbError::Retryable {
                source: DriverError::connection("connect attempt aborted"),
            },
            ConnectError::Closed => DbError::Shutdown,
        }
    }
}

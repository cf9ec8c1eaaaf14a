//! Error types shared across dbgate.
//!
//! [`DriverError`] is what the database driver (and operations built on it)
//! report. It keeps the driver's own code and message intact so callers can
//! still tell causes apart after the error has travelled through retries.
//!
//! [`DbError`] is the single error type surfaced by the facade. Component
//! errors (`ConnectError`, `CooldownActive`, `SchedulerError`) convert into it
//! through `From` impls provided by their own crates.

use crate::classifier::ErrorClass;
use std::fmt;
use std::time::Duration;

/// Broad category of a driver failure, as far as the transport can tell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverErrorKind {
    /// The session could not be established or was lost.
    Connection,
    /// An operation exceeded its wall-clock ceiling.
    Timeout,
    /// The database rejected the statement itself.
    Query,
    /// Anything the driver could not categorise.
    Other,
}

/// An error reported by the database driver or by an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverError {
    kind: DriverErrorKind,
    code: Option<String>,
    message: String,
}

impl DriverError {
    /// Creates an error of the given kind.
    pub fn new(kind: DriverErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
        }
    }

    /// A connection-class failure (refused, reset, lost).
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Connection, message)
    }

    /// A statement-level failure (constraint violation, syntax error, ...).
    pub fn query(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Query, message)
    }

    /// A wall-clock expiry for the named step.
    pub fn timeout(step: &str, after: Duration) -> Self {
        Self::new(
            DriverErrorKind::Timeout,
            format!("{step} timed out after {}ms", after.as_millis()),
        )
    }

    /// Attaches a driver-specific error code (SQLSTATE, errno name, ...).
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Returns the error kind.
    pub fn kind(&self) -> DriverErrorKind {
        self.kind
    }

    /// Returns the driver error code, if any.
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    /// Returns the driver message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns true for timeouts and lost/refused connections.
    pub fn is_connection_class(&self) -> bool {
        matches!(
            self.kind,
            DriverErrorKind::Connection | DriverErrorKind::Timeout
        )
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "[{}] {}", code, self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for DriverError {}

/// The error surfaced to callers of the database layer.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DbError {
    /// No connection could be established within the bounded attempts.
    #[error("could not connect after {attempts} attempt(s): {source}")]
    Connect {
        /// Number of connect attempts made.
        attempts: u32,
        /// The last driver error seen.
        source: DriverError,
    },

    /// A transient failure that survived every permitted retry.
    #[error("transient database error: {source}")]
    Retryable {
        /// The driver error, unchanged.
        source: DriverError,
    },

    /// A non-transient failure; never retried.
    #[error("database error: {source}")]
    Fatal {
        /// The driver error, unchanged.
        source: DriverError,
    },

    /// The provider's hard capacity limit was hit; the cooldown gate is now open.
    #[error("database quota exhausted, retry after {}s: {source}", .retry_after.as_secs())]
    QuotaExhausted {
        /// The driver error, unchanged.
        source: DriverError,
        /// How long until the cooldown window closes.
        retry_after: Duration,
    },

    /// The cooldown gate is open; the call never reached the driver.
    #[error("service degraded, retry after {} minute(s)", whole_minutes(.remaining))]
    CooldownActive {
        /// Time left in the cooldown window.
        remaining: Duration,
    },

    /// The per-call deadline expired while waiting for a slot, connecting, or
    /// running the operation.
    #[error("call deadline exceeded after {waited:?}")]
    DeadlineExceeded {
        /// Time spent in the call before it gave up.
        waited: Duration,
    },

    /// The layer is shutting down; the call was refused or abandoned.
    #[error("database layer is shutting down")]
    Shutdown,
}

/// Rounds up so "30 seconds left" reads as "1 minute", never "0 minutes".
pub fn whole_minutes(remaining: impl std::borrow::Borrow<Duration>) -> u64 {
    let remaining = remaining.borrow();
    let secs = if remaining.subsec_nanos() > 0 {
        remaining.as_secs() + 1
    } else {
        remaining.as_secs()
    };
    secs.div_ceil(60)
}

impl DbError {
    /// Wraps a driver error according to its classification.
    ///
    /// `retry_after` is only used for [`ErrorClass::QuotaExhausted`].
    pub fn classified(source: DriverError, class: ErrorClass, retry_after: Duration) -> Self {
        match class {
            ErrorClass::Retryable => DbError::Retryable { source },
            ErrorClass::Fatal => DbError::Fatal { source },
            ErrorClass::QuotaExhausted => DbError::QuotaExhausted {
                source,
                retry_after,
            },
        }
    }

    /// Returns true if the retry loop may try again after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DbError::Retryable { .. })
    }

    /// Returns true if this error reports quota exhaustion.
    pub fn is_quota_exhausted(&self) -> bool {
        matches!(self, DbError::QuotaExhausted { .. })
    }

    /// Returns true if the call was refused by an open cooldown gate.
    pub fn is_cooldown(&self) -> bool {
        matches!(self, DbError::CooldownActive { .. })
    }

    /// Returns true if the call was refused or abandoned by shutdown.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, DbError::Shutdown)
    }

    /// Returns the underlying driver error, if one exists.
    pub fn driver_error(&self) -> Option<&DriverError> {
        match self {
            DbError::Connect { source, .. }
            | DbError::Retryable { source }
            | DbError::Fatal { source }
            | DbError::QuotaExhausted { source, .. } => Some(source),
            DbError::CooldownActive { .. } | DbError::DeadlineExceeded { .. } | DbError::Shutdown => {
                None
            }
        }
    }

    /// Returns the suggested wait before trying again, for quota and cooldown errors.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            DbError::QuotaExhausted { retry_after, .. } => Some(*retry_after),
            DbError::CooldownActive { remaining } => Some(*remaining),
            _ => None,
        }
    }

    /// Replaces the retry hint on a quota error; other variants pass through.
    pub fn with_retry_after(self, hint: Duration) -> Self {
        match self {
            DbError::QuotaExhausted { source, .. } => DbError::QuotaExhausted {
                source,
                retry_after: hint,
            },
            other => other,
        }
    }
}

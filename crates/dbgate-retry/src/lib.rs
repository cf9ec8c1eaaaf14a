//! Bounded retry for database operations.
//!
//! [`Retry::execute`] runs a closure until it succeeds, the error is not
//! retryable, or the attempt budget is spent. Between attempts it sleeps for a
//! jittered exponential delay (`min(initial * 2^n, cap) + random(0, 1s)`).
//!
//! When a cooldown gate is attached:
//! - every attempt is admitted through [`CircuitBreaker::check`] first, so a
//!   window opened by another caller stops this loop too;
//! - a quota-exhaustion error trips the gate and is returned at once with a
//!   retry hint, no matter how many attempts remain.
//!
//! The last error is returned as produced by the operation, so callers can
//! still see the driver's code and message.
//!
//! ## Example
//!
//! ```rust
//! use dbgate_core::{DbError, DriverError};
//! use dbgate_retry::RetryConfig;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let retry = RetryConfig::builder()
//!     .max_attempts(3)
//!     .initial_delay(Duration::from_millis(1))
//!     .max_jitter(Duration::ZERO)
//!     .build();
//!
//! let result = retry
//!     .execute(|attempt| async move {
//!         if attempt < 2 {
//!             Err(DbError::Retryable { source: DriverError::connection("connection reset") })
//!         } else {
//!             Ok(attempt)
//!         }
//!     })
//!     .await;
//! assert_eq!(result.unwrap(), 2);
//! # }
//! ```
//!
//! ## Feature Flags
//! - `metrics`: attempt counters and backoff histograms
//! - `tracing`: retry decisions via the tracing crate

mod backoff;
mod config;
mod events;

pub use backoff::{ExponentialBackoff, FixedInterval, FnInterval, IntervalFunction, JitteredBackoff};
pub use config::{
    RetryConfig, RetryConfigBuilder, DEFAULT_INITIAL_DELAY, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_MAX_DELAY, DEFAULT_MAX_JITTER,
};
pub use events::RetryEvent;

use dbgate_cooldown::CircuitBreaker;
use dbgate_core::DbError;
#[cfg(feature = "metrics")]
use metrics::{counter, histogram};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

/// Runs operations with bounded, jittered retries.
///
/// Cloning is cheap; clones share configuration and cooldown gate.
#[derive(Clone)]
pub struct Retry {
    config: Arc<RetryConfig>,
    breaker: Option<CircuitBreaker>,
}

impl Retry {
    /// Creates a retry loop, optionally consulting a cooldown gate.
    pub fn new(config: RetryConfig, breaker: Option<CircuitBreaker>) -> Self {
        Self {
            config: Arc::new(config),
            breaker,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Returns a copy with a different attempt budget.
    pub fn with_max_attempts(&self, max_attempts: usize) -> Self {
        let mut config = (*self.config).clone();
        config.max_attempts = max_attempts.max(1);
        Self {
            config: Arc::new(config),
            breaker: self.breaker.clone(),
        }
    }

    /// Returns a copy with a different base delay, keeping the configured cap and jitter.
    pub fn with_initial_delay(&self, initial: std::time::Duration) -> Self {
        let mut config = (*self.config).clone();
        config.backoff = Arc::new(
            JitteredBackoff::new(initial)
                .max_interval(config.max_delay)
                .max_jitter(config.max_jitter),
        );
        Self {
            config: Arc::new(config),
            breaker: self.breaker.clone(),
        }
    }

    /// Runs `operation` until it succeeds or may not be retried.
    ///
    /// The closure receives the 0-indexed attempt number.
    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> Result<T, DbError>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, DbError>>,
    {
        let config = &self.config;
        let mut attempt = 0;

        loop {
            if let Some(breaker) = &self.breaker {
                if let Err(refused) = breaker.check() {
                    config.event_listeners.emit(&RetryEvent::RejectedByCooldown {
                        component_name: config.name.clone(),
                        timestamp: Instant::now(),
                        attempt,
                        remaining: refused.remaining,
                    });
                    self.record_outcome("rejected");
                    return Err(refused.into());
                }
            }

            #[cfg(feature = "metrics")]
            counter!("dbgate_retry_attempts_total", "retry" => config.name.clone()).increment(1);

            let error = match operation(attempt).await {
                Ok(value) => {
                    config.event_listeners.emit(&RetryEvent::Success {
                        component_name: config.name.clone(),
                        timestamp: Instant::now(),
                        attempts: attempt + 1,
                    });
                    self.record_outcome("success");
                    return Ok(value);
                }
                Err(error) => error,
            };

            if error.is_quota_exhausted() {
                let error = match &self.breaker {
                    Some(breaker) => {
                        if !breaker.is_open() {
                            breaker.trip();
                        }
                        error.with_retry_after(breaker.remaining())
                    }
                    None => error,
                };
                #[cfg(feature = "tracing")]
                tracing::warn!(retry = %config.name, attempt, error = %error, "quota exhausted, not retrying");
                return Err(self.not_retried(attempt, error));
            }

            if !(config.retry_on)(&error) {
                #[cfg(feature = "tracing")]
                tracing::debug!(retry = %config.name, attempt, error = %error, "error is not retryable");
                return Err(self.not_retried(attempt, error));
            }

            if attempt + 1 >= config.max_attempts {
                config.event_listeners.emit(&RetryEvent::Exhausted {
                    component_name: config.name.clone(),
                    timestamp: Instant::now(),
                    attempts: attempt + 1,
                });
                #[cfg(feature = "tracing")]
                tracing::warn!(retry = %config.name, attempts = attempt + 1, error = %error, "retries exhausted");
                self.record_outcome("exhausted");
                return Err(error);
            }

            let delay = config.backoff.next_interval(attempt);
            config.event_listeners.emit(&RetryEvent::Retry {
                component_name: config.name.clone(),
                timestamp: Instant::now(),
                attempt,
                delay,
            });

            #[cfg(feature = "tracing")]
            tracing::info!(
                retry = %config.name,
                attempt = attempt + 1,
                max_attempts = config.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "transient failure, backing off"
            );

            #[cfg(feature = "metrics")]
            histogram!("dbgate_retry_backoff_seconds", "retry" => config.name.clone())
                .record(delay.as_secs_f64());

            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    fn not_retried(&self, attempt: usize, error: DbError) -> DbError {
        self.config.event_listeners.emit(&RetryEvent::NotRetried {
            component_name: self.config.name.clone(),
            timestamp: Instant::now(),
            attempts: attempt + 1,
        });
        self.record_outcome("not_retried");
        error
    }

    #[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
    fn record_outcome(&self, outcome: &'static str) {
        #[cfg(feature = "metrics")]
        counter!(
            "dbgate_retry_calls_total",
            "retry" => self.config.name.clone(),
            "outcome" => outcome
        )
        .increment(1);
    }
}

impl std::fmt::Debug for Retry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retry")
            .field("config", &self.config)
            .field("breaker", &self.breaker)
            .finish()
    }
}

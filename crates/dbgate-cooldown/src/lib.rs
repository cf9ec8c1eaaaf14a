//! Quota cooldown gate.
//!
//! Managed database providers enforce hard capacity limits (connections per
//! hour, concurrent sessions per user). Hammering the provider after such a
//! limit is hit only extends the outage, so once a quota-exhaustion error is
//! seen the gate opens for a fixed window and every admission fails fast.
//!
//! Unlike a classic circuit breaker there is no failure-rate window and no
//! half-open probing: a single classified error opens the gate, and it closes
//! again on its own once the window has elapsed.
//!
//! ## States
//! - **Closed**: admissions pass.
//! - **Open**: admissions are refused with [`CooldownActive`].
//!
//! A second trip while the gate is open never extends the window.
//!
//! ## Usage
//!
//! ```rust
//! use dbgate_cooldown::CooldownConfig;
//! use dbgate_core::DriverError;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let breaker = CooldownConfig::builder()
//!     .duration(Duration::from_secs(600))
//!     .name("primary-db")
//!     .build();
//!
//! assert!(breaker.check().is_ok());
//!
//! let err = DriverError::connection("User has exceeded the 'max_connections_per_hour' resource")
//!     .with_code("ER_USER_LIMIT_REACHED");
//! assert!(breaker.trip_if_quota_exhausted(&err));
//!
//! let refused = breaker.check().unwrap_err();
//! assert_eq!(refused.remaining_minutes(), 10);
//! # }
//! ```
//!
//! ## Feature Flags
//! - `metrics`: trip/rejection counters and an open-state gauge
//! - `tracing`: log transitions via the tracing crate

mod config;
mod error;
mod events;
mod window;

pub use config::{CooldownConfig, CooldownConfigBuilder, DEFAULT_COOLDOWN};
pub use error::CooldownActive;
pub use events::CooldownEvent;

use dbgate_core::classifier::{ErrorClass, ErrorClassifier};
use dbgate_core::DriverError;
#[cfg(feature = "metrics")]
use metrics::{counter, gauge};
use std::sync::Arc;
use std::time::{Duration, Instant};
use window::{CooldownWindow, Observation, Trip};

/// Observable state of the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownState {
    /// Admissions pass.
    Closed,
    /// Admissions are refused for the contained remaining time.
    Open {
        /// Time left in the window.
        remaining: Duration,
    },
}

impl CooldownState {
    /// Returns true if the gate is open.
    pub fn is_open(&self) -> bool {
        matches!(self, CooldownState::Open { .. })
    }
}

/// Process-wide quota cooldown gate.
///
/// Cloning is cheap and every clone observes the same window.
#[derive(Clone)]
pub struct CircuitBreaker {
    inner: Arc<Inner>,
}

struct Inner {
    config: CooldownConfig,
    window: CooldownWindow,
}

impl CircuitBreaker {
    /// Creates a gate from a configuration.
    pub fn new(config: CooldownConfig) -> Self {
        #[cfg(feature = "metrics")]
        gauge!("dbgate_cooldown_open", "cooldown" => config.name.clone()).set(0.0);

        Self {
            inner: Arc::new(Inner {
                config,
                window: CooldownWindow::new(),
            }),
        }
    }

    /// Creates a gate with the default one-hour window.
    pub fn with_defaults() -> Self {
        CooldownConfig::builder().build()
    }

    /// Returns the gate's name.
    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    /// Returns the configuration this gate was built with.
    pub fn config(&self) -> &CooldownConfig {
        &self.inner.config
    }

    /// Returns the current state, closing the gate first if the window has elapsed.
    pub fn state(&self) -> CooldownState {
        match self.observe() {
            Some(remaining) => CooldownState::Open { remaining },
            None => CooldownState::Closed,
        }
    }

    /// Returns true while the window is active.
    pub fn is_open(&self) -> bool {
        self.observe().is_some()
    }

    /// Time left in the window; zero when closed.
    pub fn remaining(&self) -> Duration {
        self.observe().unwrap_or(Duration::ZERO)
    }

    /// Admission check.
    ///
    /// Emits a rejection event when the gate is open.
    pub fn check(&self) -> Result<(), CooldownActive> {
        let Some(remaining) = self.observe() else {
            return Ok(());
        };

        let name = &self.inner.config.name;
        self.inner.config.event_listeners.emit(&CooldownEvent::Rejected {
            component_name: name.clone(),
            timestamp: Instant::now(),
            remaining,
        });

        #[cfg(feature = "tracing")]
        tracing::debug!(cooldown = %name, remaining_secs = remaining.as_secs(), "admission refused during cooldown");

        #[cfg(feature = "metrics")]
        counter!("dbgate_cooldown_rejections_total", "cooldown" => name.clone()).increment(1);

        Err(CooldownActive { remaining })
    }

    /// Opens the gate for the configured window.
    ///
    /// Returns true if this call opened it, false if it was already open
    /// (in which case the existing window is left untouched).
    pub fn trip(&self) -> bool {
        let config = &self.inner.config;
        match self.inner.window.trip(config.duration) {
            Trip::Opened => {
                config.event_listeners.emit(&CooldownEvent::Tripped {
                    component_name: config.name.clone(),
                    timestamp: Instant::now(),
                    cooldown: config.duration,
                });

                #[cfg(feature = "tracing")]
                tracing::warn!(
                    cooldown = %config.name,
                    window_secs = config.duration.as_secs(),
                    "quota exhausted, entering cooldown"
                );

                #[cfg(feature = "metrics")]
                {
                    counter!("dbgate_cooldown_trips_total", "cooldown" => config.name.clone())
                        .increment(1);
                    gauge!("dbgate_cooldown_open", "cooldown" => config.name.clone()).set(1.0);
                }

                true
            }
            Trip::AlreadyOpen(remaining) => {
                config.event_listeners.emit(&CooldownEvent::TripIgnored {
                    component_name: config.name.clone(),
                    timestamp: Instant::now(),
                    remaining,
                });
                false
            }
        }
    }

    /// Opens the gate if the classifier reports quota exhaustion.
    ///
    /// Returns true if the error was a quota error, whether or not the gate
    /// was already open.
    pub fn trip_if_quota_exhausted(&self, err: &DriverError) -> bool {
        if self.inner.config.classifier.classify(err) != ErrorClass::QuotaExhausted {
            return false;
        }
        self.trip();
        true
    }

    /// Closes the gate immediately.
    pub fn reset(&self) {
        if !self.inner.window.clear() {
            return;
        }
        let config = &self.inner.config;
        config.event_listeners.emit(&CooldownEvent::Reset {
            component_name: config.name.clone(),
            timestamp: Instant::now(),
        });

        #[cfg(feature = "tracing")]
        tracing::info!(cooldown = %config.name, "cooldown reset");

        #[cfg(feature = "metrics")]
        gauge!("dbgate_cooldown_open", "cooldown" => config.name.clone()).set(0.0);
    }

    fn observe(&self) -> Option<Duration> {
        match self.inner.window.observe() {
            Observation::Open(remaining) => Some(remaining),
            Observation::Closed => None,
            Observation::Expired => {
                let config = &self.inner.config;
                config.event_listeners.emit(&CooldownEvent::Expired {
                    component_name: config.name.clone(),
                    timestamp: Instant::now(),
                });

                #[cfg(feature = "tracing")]
                tracing::info!(cooldown = %config.name, "cooldown elapsed, gate closed");

                #[cfg(feature = "metrics")]
                gauge!("dbgate_cooldown_open", "cooldown" => config.name.clone()).set(0.0);

                None
            }
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.inner.config.name)
            .field("state", &self.state())
            .finish()
    }
}

//! Configuration for the retry loop.

use crate::backoff::{IntervalFunction, JitteredBackoff};
use crate::events::RetryEvent;
use crate::Retry;
use dbgate_cooldown::CircuitBreaker;
use dbgate_core::events::{EventListeners, FnListener};
use dbgate_core::DbError;
use std::sync::Arc;
use std::time::Duration;

/// Default number of attempts, the first one included.
pub const DEFAULT_MAX_ATTEMPTS: usize = 5;
/// Default base delay before the first retry.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(2);
/// Default cap on the exponential part of the delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);
/// Default upper bound of the additive jitter.
pub const DEFAULT_MAX_JITTER: Duration = Duration::from_secs(1);

pub(crate) type RetryPredicate = Arc<dyn Fn(&DbError) -> bool + Send + Sync>;

/// Configuration for [`Retry`].
#[derive(Clone)]
pub struct RetryConfig {
    pub(crate) max_attempts: usize,
    pub(crate) backoff: Arc<dyn IntervalFunction>,
    pub(crate) max_delay: Duration,
    pub(crate) max_jitter: Duration,
    pub(crate) retry_on: RetryPredicate,
    pub(crate) name: String,
    pub(crate) event_listeners: EventListeners<RetryEvent>,
}

impl RetryConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    /// Total attempts permitted, the first one included.
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Cap on the exponential part of the delay.
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Upper bound of the additive jitter.
    pub fn max_jitter(&self) -> Duration {
        self.max_jitter
    }

    /// Delay that would precede retry number `retry` (0-indexed).
    pub fn delay_for(&self, retry: usize) -> Duration {
        self.backoff.next_interval(retry)
    }
}

impl std::fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_attempts", &self.max_attempts)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Builder for [`RetryConfig`].
pub struct RetryConfigBuilder {
    max_attempts: usize,
    initial_delay: Duration,
    max_delay: Duration,
    max_jitter: Duration,
    backoff: Option<Arc<dyn IntervalFunction>>,
    retry_on: RetryPredicate,
    name: String,
    breaker: Option<CircuitBreaker>,
    event_listeners: EventListeners<RetryEvent>,
}

impl RetryConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            max_jitter: DEFAULT_MAX_JITTER,
            backoff: None,
            retry_on: Arc::new(DbError::is_retryable),
            name: "retry".to_string(),
            breaker: None,
            event_listeners: EventListeners::new(),
        }
    }

    /// Sets the total number of attempts, the first one included.
    ///
    /// Values below 1 are treated as 1.
    ///
    /// Default: 5
    pub fn max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Sets the base delay before the first retry.
    ///
    /// Default: 2 seconds
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Caps the exponential part of the delay.
    ///
    /// Default: 30 seconds
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the upper bound of the random jitter added to every delay.
    ///
    /// Default: 1 second
    pub fn max_jitter(mut self, jitter: Duration) -> Self {
        self.max_jitter = jitter;
        self
    }

    /// Replaces the jittered exponential schedule with a custom one.
    ///
    /// Overrides `initial_delay`, `max_delay` and `max_jitter`.
    pub fn backoff<I>(mut self, backoff: I) -> Self
    where
        I: IntervalFunction + 'static,
    {
        self.backoff = Some(Arc::new(backoff));
        self
    }

    /// Sets which errors are retried.
    ///
    /// Default: [`DbError::is_retryable`]
    pub fn retry_on<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&DbError) -> bool + Send + Sync + 'static,
    {
        self.retry_on = Arc::new(predicate);
        self
    }

    /// Consults (and trips) this cooldown gate around every attempt.
    pub fn circuit_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// Sets the name used in events, logs and metrics.
    ///
    /// Default: "retry"
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback before each retry.
    ///
    /// # Callback Signature
    /// `Fn(usize, Duration)` - the 0-indexed retry number and the delay about to be slept.
    ///
    /// # Example
    /// ```rust
    /// use dbgate_retry::RetryConfig;
    ///
    /// let retry = RetryConfig::builder()
    ///     .on_retry(|retry, delay| eprintln!("retry #{} in {:?}", retry + 1, delay))
    ///     .build();
    /// ```
    pub fn on_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RetryEvent::Retry { attempt, delay, .. } = event {
                f(*attempt, *delay);
            }
        }));
        self
    }

    /// Registers a callback when the operation succeeds.
    ///
    /// # Callback Signature
    /// `Fn(usize)` - the number of attempts it took.
    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RetryEvent::Success { attempts, .. } = event {
                f(*attempts);
            }
        }));
        self
    }

    /// Registers a callback when every attempt failed.
    pub fn on_exhausted<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RetryEvent::Exhausted { attempts, .. } = event {
                f(*attempts);
            }
        }));
        self
    }

    /// Registers a listener for every retry event.
    pub fn on_event<F>(mut self, f: F) -> Self
    where
        F: Fn(&RetryEvent) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(f));
        self
    }

    /// Builds the retry loop.
    pub fn build(self) -> Retry {
        let backoff = self.backoff.unwrap_or_else(|| {
            Arc::new(
                JitteredBackoff::new(self.initial_delay)
                    .max_interval(self.max_delay)
                    .max_jitter(self.max_jitter),
            )
        });
        let config = RetryConfig {
            max_attempts: self.max_attempts,
            backoff,
            max_delay: self.max_delay,
            max_jitter: self.max_jitter,
            retry_on: self.retry_on,
            name: self.name,
            event_listeners: self.event_listeners,
        };
        Retry::new(config, self.breaker)
    }
}

impl Default for RetryConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

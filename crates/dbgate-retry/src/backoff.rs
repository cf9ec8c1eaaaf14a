use rand::Rng;
use std::time::Duration;

/// Computes the wait before the next retry.
///
/// `retry` is 0-indexed: the wait before the second attempt is `next_interval(0)`.
pub trait IntervalFunction: Send + Sync {
    /// Computes the delay before the next retry attempt.
    fn next_interval(&self, retry: usize) -> Duration;
}

/// Same duration for every retry.
#[derive(Debug, Clone)]
pub struct FixedInterval {
    duration: Duration,
}

impl FixedInterval {
    /// Creates a fixed interval backoff.
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

impl IntervalFunction for FixedInterval {
    fn next_interval(&self, _retry: usize) -> Duration {
        self.duration
    }
}

/// Exponential backoff without randomization.
///
/// Used for connection establishment.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_interval: Duration,
    multiplier: f64,
    max_interval: Option<Duration>,
}

impl ExponentialBackoff {
    /// Creates an exponential backoff with a multiplier of 2.0.
    pub fn new(initial_interval: Duration) -> Self {
        Self {
            initial_interval,
            multiplier: 2.0,
            max_interval: None,
        }
    }

    /// Sets the growth factor.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Caps the interval.
    pub fn max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = Some(max_interval);
        self
    }
}

impl IntervalFunction for ExponentialBackoff {
    fn next_interval(&self, retry: usize) -> Duration {
        grow(self.initial_interval, self.multiplier, retry, self.max_interval)
    }
}

/// Exponential backoff plus additive jitter.
///
/// `delay = min(initial * 2^retry, cap) + random(0, max_jitter)`
///
/// Jitter is added on top of the capped base, so every delay is at least its base.
#[derive(Debug, Clone)]
pub struct JitteredBackoff {
    initial_interval: Duration,
    multiplier: f64,
    max_interval: Duration,
    max_jitter: Duration,
}

impl JitteredBackoff {
    /// Creates a jittered backoff: factor 2, cap 30s, up to 1s of jitter.
    pub fn new(initial_interval: Duration) -> Self {
        Self {
            initial_interval,
            multiplier: 2.0,
            max_interval: Duration::from_secs(30),
            max_jitter: Duration::from_secs(1),
        }
    }

    /// Sets the growth factor.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Caps the base interval (jitter comes on top).
    pub fn max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = max_interval;
        self
    }

    /// Sets the upper bound of the additive jitter.
    pub fn max_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    /// The deterministic part of the delay for `retry`.
    pub fn base_interval(&self, retry: usize) -> Duration {
        grow(
            self.initial_interval,
            self.multiplier,
            retry,
            Some(self.max_interval),
        )
    }

    fn jitter(&self) -> Duration {
        let bound = u64::try_from(self.max_jitter.as_micros()).unwrap_or(u64::MAX);
        if bound == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(rand::rng().random_range(0..bound))
    }
}

impl IntervalFunction for JitteredBackoff {
    fn next_interval(&self, retry: usize) -> Duration {
        self.base_interval(retry) + self.jitter()
    }
}

/// Function-based interval implementation.
pub struct FnInterval<F> {
    f: F,
}

impl<F> FnInterval<F>
where
    F: Fn(usize) -> Duration + Send + Sync,
{
    /// Creates a function-based interval.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> IntervalFunction for FnInterval<F>
where
    F: Fn(usize) -> Duration + Send + Sync,
{
    fn next_interval(&self, retry: usize) -> Duration {
        (self.f)(retry)
    }
}

fn grow(initial: Duration, multiplier: f64, retry: usize, cap: Option<Duration>) -> Duration {
    if initial.is_zero() {
        return Duration::ZERO;
    }
    let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
    let secs = initial.as_secs_f64() * multiplier.powi(exponent);
    let interval = Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX);
    match cap {
        Some(max) => interval.min(max),
        None => interval,
    }
}

//! Facade configuration: builder plus environment loading.

use std::time::Duration;

/// Default number of queries executing at once.
pub const DEFAULT_MAX_CONCURRENT: usize = 25;
/// Default per-query timeout.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);
/// Default interval of the background liveness probe.
pub const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);
/// Default drain window used by [`Database::close`](crate::Database::close).
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// An environment variable held a value that cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The value is not a non-negative integer.
    #[error("{key}: expected a non-negative integer, got {value:?}")]
    NotANumber {
        /// Full variable name, prefix included.
        key: String,
        /// The raw value.
        value: String,
    },

    /// The value parsed but is below the allowed minimum.
    #[error("{key}: must be at least {min}, got {value}")]
    OutOfRange {
        /// Full variable name, prefix included.
        key: String,
        /// The parsed value.
        value: u64,
        /// Smallest accepted value.
        min: u64,
    },
}

/// Settings for a [`Database`](crate::Database).
///
/// | Variable | Default | Effect |
/// |---|---|---|
/// | `MAX_CONCURRENT` | 25 | execution slots; also the driver pool size |
/// | `CONNECT_TIMEOUT_MS` | 15000 | ceiling for one transport connect |
/// | `CONNECT_ATTEMPTS` | 3 | connect attempts per `ensure_connected` |
/// | `PROBE_TIMEOUT_MS` | 5000 | liveness and verification probe timeout |
/// | `QUERY_TIMEOUT_MS` | 10000 | per-operation timeout |
/// | `HEALTH_CHECK_INTERVAL_MS` | 30000 | background probe period, 0 disables |
/// | `COOLDOWN_DURATION_MS` | 3600000 | quota cooldown window |
/// | `MAX_RETRY_ATTEMPTS` | 5 | attempts made by `execute_with_retry` |
/// | `RETRY_INITIAL_DELAY_MS` | 2000 | first backoff delay |
/// | `QUEUE_WARN_DEPTH` | 50 | queue depth that raises a warning |
/// | `QUEUE_STALL_MS` | 5000 | oldest-waiter age that raises an alert |
/// | `DRAIN_TIMEOUT_MS` | 10000 | drain window for `close` |
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct DatabaseConfig {
    pub(crate) name: String,
    pub(crate) max_concurrent: usize,
    pub(crate) connect_timeout: Duration,
    pub(crate) connect_attempts: u32,
    pub(crate) probe_timeout: Duration,
    pub(crate) query_timeout: Duration,
    pub(crate) health_check_interval: Duration,
    pub(crate) cooldown_duration: Duration,
    pub(crate) max_retry_attempts: usize,
    pub(crate) retry_initial_delay: Duration,
    pub(crate) queue_warn_depth: usize,
    pub(crate) queue_stall_threshold: Duration,
    pub(crate) drain_timeout: Duration,
}

impl DatabaseConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> DatabaseConfigBuilder {
        DatabaseConfigBuilder::new()
    }

    /// Reads the process environment, without a prefix.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with_prefix("")
    }

    /// Reads the process environment, prepending `prefix` to every variable
    /// name (`DBGATE_` turns `MAX_CONCURRENT` into `DBGATE_MAX_CONCURRENT`).
    pub fn from_env_with_prefix(prefix: &str) -> Result<Self, ConfigError> {
        Self::from_lookup(prefix, |key| std::env::var(key).ok())
    }

    /// Builds a configuration from any key/value source.
    ///
    /// Unset and blank variables keep their defaults.
    ///
    /// # Example
    /// ```rust
    /// use dbgate::DatabaseConfig;
    /// use std::collections::HashMap;
    /// use std::time::Duration;
    ///
    /// let vars = HashMap::from([
    ///     ("APP_MAX_CONCURRENT", "10"),
    ///     ("APP_QUERY_TIMEOUT_MS", "2500"),
    /// ]);
    /// let config = DatabaseConfig::from_lookup("APP_", |key| {
    ///     vars.get(key).map(|v| v.to_string())
    /// })
    /// .unwrap();
    ///
    /// assert_eq!(config.max_concurrent(), 10);
    /// assert_eq!(config.query_timeout(), Duration::from_millis(2500));
    /// ```
    pub fn from_lookup<F>(prefix: &str, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Lookup {
            prefix,
            lookup: &lookup,
        };
        let mut builder = Self::builder();

        if let Some(n) = env.number("MAX_CONCURRENT", 1)? {
            builder = builder.max_concurrent(n as usize);
        }
        if let Some(ms) = env.number("CONNECT_TIMEOUT_MS", 1)? {
            builder = builder.connect_timeout(Duration::from_millis(ms));
        }
        if let Some(n) = env.number("CONNECT_ATTEMPTS", 1)? {
            builder = builder.connect_attempts(u32::try_from(n).unwrap_or(u32::MAX));
        }
        if let Some(ms) = env.number("PROBE_TIMEOUT_MS", 1)? {
            builder = builder.probe_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = env.number("QUERY_TIMEOUT_MS", 1)? {
            builder = builder.query_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = env.number("HEALTH_CHECK_INTERVAL_MS", 0)? {
            builder = builder.health_check_interval(Duration::from_millis(ms));
        }
        if let Some(ms) = env.number("COOLDOWN_DURATION_MS", 0)? {
            builder = builder.cooldown_duration(Duration::from_millis(ms));
        }
        if let Some(n) = env.number("MAX_RETRY_ATTEMPTS", 1)? {
            builder = builder.max_retry_attempts(n as usize);
        }
        if let Some(ms) = env.number("RETRY_INITIAL_DELAY_MS", 0)? {
            builder = builder.retry_initial_delay(Duration::from_millis(ms));
        }
        if let Some(n) = env.number("QUEUE_WARN_DEPTH", 0)? {
            builder = builder.queue_warn_depth(n as usize);
        }
        if let Some(ms) = env.number("QUEUE_STALL_MS", 0)? {
            builder = builder.queue_stall_threshold(Duration::from_millis(ms));
        }
        if let Some(ms) = env.number("DRAIN_TIMEOUT_MS", 0)? {
            builder = builder.drain_timeout(Duration::from_millis(ms));
        }

        Ok(builder.build())
    }

    /// Name used as a prefix for component names in events, logs and metrics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Execution slots (and driver pool size).
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Ceiling for one transport connect.
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Connect attempts per `ensure_connected`.
    pub fn connect_attempts(&self) -> u32 {
        self.connect_attempts
    }

    /// Liveness probe timeout.
    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    /// Per-operation timeout.
    pub fn query_timeout(&self) -> Duration {
        self.query_timeout
    }

    /// Background probe period; zero means no background monitor.
    pub fn health_check_interval(&self) -> Duration {
        self.health_check_interval
    }

    /// Quota cooldown window.
    pub fn cooldown_duration(&self) -> Duration {
        self.cooldown_duration
    }

    /// Attempts made by `execute_with_retry`.
    pub fn max_retry_attempts(&self) -> usize {
        self.max_retry_attempts
    }

    /// First backoff delay for `execute_with_retry`.
    pub fn retry_initial_delay(&self) -> Duration {
        self.retry_initial_delay
    }

    /// Queue depth that raises a backpressure warning.
    pub fn queue_warn_depth(&self) -> usize {
        self.queue_warn_depth
    }

    /// Oldest-waiter age that raises a stall alert.
    pub fn queue_stall_threshold(&self) -> Duration {
        self.queue_stall_threshold
    }

    /// Drain window used by `close`.
    pub fn drain_timeout(&self) -> Duration {
        self.drain_timeout
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfigBuilder::new().build()
    }
}

struct Lookup<'a, F> {
    prefix: &'a str,
    lookup: &'a F,
}

impl<F> Lookup<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn number(&self, name: &str, min: u64) -> Result<Option<u64>, ConfigError> {
        let key = format!("{}{}", self.prefix, name);
        let Some(raw) = (self.lookup)(&key) else {
            return Ok(None);
        };
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        let value: u64 = trimmed.parse().map_err(|_| ConfigError::NotANumber {
            key: key.clone(),
            value: raw.clone(),
        })?;
        if value < min {
            return Err(ConfigError::OutOfRange { key, value, min });
        }
        Ok(Some(value))
    }
}

/// Builder for [`DatabaseConfig`].
#[derive(Debug, Clone)]
pub struct DatabaseConfigBuilder {
    config: DatabaseConfig,
}

impl DatabaseConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            config: DatabaseConfig {
                name: "db".to_string(),
                max_concurrent: DEFAULT_MAX_CONCURRENT,
                connect_timeout: dbgate_connection::DEFAULT_CONNECT_TIMEOUT,
                connect_attempts: dbgate_connection::DEFAULT_CONNECT_ATTEMPTS,
                probe_timeout: dbgate_connection::DEFAULT_PROBE_TIMEOUT,
                query_timeout: DEFAULT_QUERY_TIMEOUT,
                health_check_interval: DEFAULT_HEALTH_CHECK_INTERVAL,
                cooldown_duration: dbgate_cooldown::DEFAULT_COOLDOWN,
                max_retry_attempts: dbgate_retry::DEFAULT_MAX_ATTEMPTS,
                retry_initial_delay: dbgate_retry::DEFAULT_INITIAL_DELAY,
                queue_warn_depth: dbgate_scheduler::DEFAULT_QUEUE_WARN_DEPTH,
                queue_stall_threshold: dbgate_scheduler::DEFAULT_STALL_THRESHOLD,
                drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            },
        }
    }

    /// Sets the name.
    ///
    /// Default: "db"
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Sets how many queries may execute at once. Also sizes the driver pool.
    ///
    /// Default: 25
    pub fn max_concurrent(mut self, max: usize) -> Self {
        self.config.max_concurrent = max.max(1);
        self
    }

    /// Sets the ceiling for one transport connect.
    ///
    /// Default: 15 seconds
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Sets the connect attempts per `ensure_connected`.
    ///
    /// Default: 3
    pub fn connect_attempts(mut self, attempts: u32) -> Self {
        self.config.connect_attempts = attempts.max(1);
        self
    }

    /// Sets the liveness probe timeout.
    ///
    /// Default: 5 seconds
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.config.probe_timeout = timeout;
        self
    }

    /// Sets the per-operation timeout.
    ///
    /// Default: 10 seconds
    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.config.query_timeout = timeout;
        self
    }

    /// Sets the background probe period. Zero disables the monitor.
    ///
    /// Default: 30 seconds
    pub fn health_check_interval(mut self, interval: Duration) -> Self {
        self.config.health_check_interval = interval;
        self
    }

    /// Sets the quota cooldown window.
    ///
    /// Default: 1 hour
    pub fn cooldown_duration(mut self, duration: Duration) -> Self {
        self.config.cooldown_duration = duration;
        self
    }

    /// Sets the attempts made by `execute_with_retry`, the first one included.
    ///
    /// Default: 5
    pub fn max_retry_attempts(mut self, attempts: usize) -> Self {
        self.config.max_retry_attempts = attempts.max(1);
        self
    }

    /// Sets the first backoff delay for `execute_with_retry`.
    ///
    /// Default: 2 seconds
    pub fn retry_initial_delay(mut self, delay: Duration) -> Self {
        self.config.retry_initial_delay = delay;
        self
    }

    /// Sets the queue depth that raises a backpressure warning.
    ///
    /// Default: 50
    pub fn queue_warn_depth(mut self, depth: usize) -> Self {
        self.config.queue_warn_depth = depth;
        self
    }

    /// Sets the oldest-waiter age that raises a stall alert.
    ///
    /// Default: 5 seconds
    pub fn queue_stall_threshold(mut self, threshold: Duration) -> Self {
        self.config.queue_stall_threshold = threshold;
        self
    }

    /// Sets the drain window used by `close`.
    ///
    /// Default: 10 seconds
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.config.drain_timeout = timeout;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> DatabaseConfig {
        self.config
    }
}

impl Default for DatabaseConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

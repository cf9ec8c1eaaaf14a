//! Configuration for the connection manager.

use crate::driver::ConnectOptions;
use crate::events::ConnectionEvent;
use dbgate_core::classifier::{ErrorClassifier, SharedClassifier, SignatureClassifier};
use dbgate_core::events::{EventListeners, FnListener};
use dbgate_retry::{ExponentialBackoff, IntervalFunction};
use std::sync::Arc;
use std::time::Duration;

/// Default overall connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
/// Default liveness probe timeout.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
/// Default number of connect attempts per `ensure_connected`.
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 3;

/// Configuration for a [`ConnectionManager`](crate::ConnectionManager).
#[derive(Clone)]
pub struct ConnectionConfig {
    pub(crate) connect_timeout: Duration,
    pub(crate) probe_timeout: Duration,
    pub(crate) pool_timeout: Duration,
    pub(crate) statement_timeout: Duration,
    pub(crate) pool_size: usize,
    pub(crate) max_attempts: u32,
    pub(crate) backoff: Arc<dyn IntervalFunction>,
    pub(crate) probe_query: String,
    pub(crate) classifier: SharedClassifier,
    pub(crate) name: String,
    pub(crate) event_listeners: EventListeners<ConnectionEvent>,
}

impl ConnectionConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::new()
    }

    /// Options handed to the driver for each new handle.
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            connect_timeout: self.connect_timeout,
            pool_timeout: self.pool_timeout,
            statement_timeout: self.statement_timeout,
            pool_size: self.pool_size,
        }
    }

    /// Liveness probe timeout.
    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    /// Connect attempts per `ensure_connected`.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("connect_timeout", &self.connect_timeout)
            .field("probe_timeout", &self.probe_timeout)
            .field("pool_size", &self.pool_size)
            .field("max_attempts", &self.max_attempts)
            .field("probe_query", &self.probe_query)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ConnectionConfig`].
pub struct ConnectionConfigBuilder {
    connect_timeout: Duration,
    probe_timeout: Duration,
    pool_timeout: Option<Duration>,
    statement_timeout: Duration,
    pool_size: usize,
    max_attempts: u32,
    backoff: Arc<dyn IntervalFunction>,
    probe_query: String,
    classifier: SharedClassifier,
    name: String,
    event_listeners: EventListeners<ConnectionEvent>,
}

impl ConnectionConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            pool_timeout: None,
            statement_timeout: Duration::from_secs(10),
            pool_size: 25,
            max_attempts: DEFAULT_CONNECT_ATTEMPTS,
            backoff: Arc::new(
                ExponentialBackoff::new(Duration::from_secs(1)).max_interval(Duration::from_secs(10)),
            ),
            probe_query: "SELECT 1".to_string(),
            classifier: Arc::new(SignatureClassifier::default()),
            name: "connection".to_string(),
            event_listeners: EventListeners::new(),
        }
    }

    /// Sets the overall connect timeout (transport connect, not verification).
    ///
    /// Default: 15 seconds
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the timeout for liveness and verification probes.
    ///
    /// Default: 5 seconds
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Sets how long the driver's pool may wait for a free session.
    ///
    /// Default: the connect timeout
    pub fn pool_timeout(mut self, timeout: Duration) -> Self {
        self.pool_timeout = Some(timeout);
        self
    }

    /// Sets the server-side statement timeout passed to the driver.
    ///
    /// Default: 10 seconds
    pub fn statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = timeout;
        self
    }

    /// Sets the driver's pool size.
    ///
    /// Default: 25
    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = size.max(1);
        self
    }

    /// Sets the number of connect attempts before giving up.
    ///
    /// Default: 3
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Sets the wait between connect attempts.
    ///
    /// Default: exponential, 1s base, factor 2, capped at 10s
    pub fn backoff<I>(mut self, backoff: I) -> Self
    where
        I: IntervalFunction + 'static,
    {
        self.backoff = Arc::new(backoff);
        self
    }

    /// Sets the statement used to verify and probe a handle.
    ///
    /// Default: "SELECT 1"
    pub fn probe_query(mut self, sql: impl Into<String>) -> Self {
        self.probe_query = sql.into();
        self
    }

    /// Sets the classifier used to spot quota errors while connecting.
    pub fn classifier<C>(mut self, classifier: C) -> Self
    where
        C: ErrorClassifier + 'static,
    {
        self.classifier = Arc::new(classifier);
        self
    }

    /// Shares an existing classifier with other components.
    pub fn shared_classifier(mut self, classifier: SharedClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Sets the name used in events, logs and metrics.
    ///
    /// Default: "connection"
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback when a handle is established.
    ///
    /// # Callback Signature
    /// `Fn(u64, Duration)` - the new generation and how long connecting took.
    pub fn on_connected<F>(mut self, f: F) -> Self
    where
        F: Fn(u64, Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let ConnectionEvent::Connected {
                generation,
                duration,
                ..
            } = event
            {
                f(*generation, *duration);
            }
        }));
        self
    }

    /// Registers a callback when a connect attempt fails.
    pub fn on_connect_failed<F>(mut self, f: F) -> Self
    where
        F: Fn(u32, &str) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let ConnectionEvent::ConnectFailed { attempt, error, .. } = event {
                f(*attempt, error);
            }
        }));
        self
    }

    /// Registers a callback when the handle is invalidated.
    pub fn on_invalidated<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let ConnectionEvent::Invalidated { reason, .. } = event {
                f(reason);
            }
        }));
        self
    }

    /// Registers a listener for every connection event.
    pub fn on_event<F>(mut self, f: F) -> Self
    where
        F: Fn(&ConnectionEvent) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(f));
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> ConnectionConfig {
        ConnectionConfig {
            connect_timeout: self.connect_timeout,
            probe_timeout: self.probe_timeout,
            pool_timeout: self.pool_timeout.unwrap_or(self.connect_timeout),
            statement_timeout: self.statement_timeout,
            pool_size: self.pool_size,
            max_attempts: self.max_attempts,
            backoff: self.backoff,
            probe_query: self.probe_query,
            classifier: self.classifier,
            name: self.name,
            event_listeners: self.event_listeners,
        }
    }
}

impl Default for ConnectionConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

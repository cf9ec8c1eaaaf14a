//! The public facade.

use crate::config::DatabaseConfig;
use crate::health::{HealthReport, HealthStatus};
use dbgate_connection::{
    ConnectionConfig, ConnectionConfigBuilder, ConnectionEvent, ConnectionManager, ConnectionState,
    Driver,
};
use dbgate_cooldown::{CircuitBreaker, CooldownConfig, CooldownConfigBuilder, CooldownEvent};
use dbgate_core::classifier::{ErrorClassifier, SharedClassifier, SignatureClassifier};
use dbgate_core::error::whole_minutes;
use dbgate_core::{DbError, DriverError};
use dbgate_healthcheck::{
    HealthEvent, HealthMonitor, HealthMonitorConfig, HealthMonitorConfigBuilder, TickOutcome,
};
use dbgate_retry::{Retry, RetryConfig, RetryConfigBuilder, RetryEvent};
use dbgate_scheduler::{
    QueryScheduler, SchedulerConfig, SchedulerConfigBuilder, SchedulerEvent, ShutdownReport,
};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Per-call overrides for [`Database::execute_with_retry_opts`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryOptions {
    /// Total attempts, the first one included. `None` uses the configured value.
    pub max_attempts: Option<usize>,
    /// First backoff delay. `None` uses the configured value.
    pub initial_delay: Option<Duration>,
    /// Scheduling priority; higher runs sooner.
    pub priority: i32,
}

impl RetryOptions {
    /// Options that change nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the attempt budget.
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Overrides the first backoff delay.
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }

    /// Sets the scheduling priority.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

pub(crate) struct Inner<D: Driver> {
    pub(crate) config: DatabaseConfig,
    pub(crate) connection: ConnectionManager<D>,
    pub(crate) scheduler: QueryScheduler,
    pub(crate) breaker: CircuitBreaker,
    pub(crate) retry: Retry,
    pub(crate) classifier: SharedClassifier,
    pub(crate) monitor: HealthMonitor<ConnectionManager<D>>,
    monitor_started: AtomicBool,
}

impl<D: Driver> Inner<D> {
    /// Starts the background monitor the first time the connection is used.
    ///
    /// Never starts once shutdown has begun.
    pub(crate) fn start_monitor(&self) {
        if self.config.health_check_interval.is_zero() || self.scheduler.is_closed() {
            return;
        }
        if !self.monitor_started.swap(true, Ordering::AcqRel) {
            self.monitor.start();
            // shutdown may have stopped the monitor just before it started
            if self.scheduler.is_closed() {
                self.monitor.stop();
            }
        }
    }

    fn retry_for(&self, options: &RetryOptions) -> Retry {
        let mut retry = self.retry.clone();
        if let Some(attempts) = options.max_attempts {
            retry = retry.with_max_attempts(attempts);
        }
        if let Some(delay) = options.initial_delay {
            retry = retry.with_initial_delay(delay);
        }
        retry
    }
}

/// Resilient access to one database.
///
/// Cloning is cheap; every clone shares the same connection, queue and
/// cooldown gate. Tear down with [`shutdown`](Self::shutdown).
pub struct Database<D: Driver> {
    pub(crate) inner: Arc<Inner<D>>,
}

impl<D: Driver> Clone for Database<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: Driver> Database<D> {
    /// Starts building a database over `driver`.
    pub fn builder(driver: D) -> DatabaseBuilder<D> {
        DatabaseBuilder::new(driver)
    }

    /// Creates a database with the given configuration and default classification.
    pub fn new(driver: D, config: DatabaseConfig) -> Self {
        Self::builder(driver).config(config).build()
    }

    /// Guarantees a live, verified connection, connecting if needed.
    ///
    /// Refused while the cooldown gate is open.
    pub async fn ensure_connected(&self) -> Result<(), DbError> {
        let inner = &self.inner;
        inner.admit()?;
        inner.start_monitor();
        inner
            .connection
            .ensure_connected()
            .await
            .map_err(|err| inner.connect_failed(err))
    }

    /// Runs `operation` once, at `priority`, when a slot is free.
    ///
    /// Fails fast with [`DbError::CooldownActive`] while the cooldown gate is
    /// open. Otherwise the call waits for a slot, obtains a verified handle,
    /// and runs the operation under the query timeout. Driver errors are
    /// returned classified but are not retried.
    pub async fn submit<T, F, Fut>(&self, priority: i32, operation: F) -> Result<T, DbError>
    where
        F: FnOnce(D::Handle) -> Fut,
        Fut: Future<Output = Result<T, DriverError>>,
    {
        let inner = &*self.inner;
        inner.admit()?;
        inner
            .scheduler
            .submit(priority, move || inner.attempt(operation))
            .await
    }

    /// Like [`submit`](Self::submit), giving up with
    /// [`DbError::DeadlineExceeded`] unless the slot wait, the connect and the
    /// operation together finish within `deadline`.
    pub async fn submit_with_deadline<T, F, Fut>(
        &self,
        priority: i32,
        deadline: Duration,
        operation: F,
    ) -> Result<T, DbError>
    where
        F: FnOnce(D::Handle) -> Fut,
        Fut: Future<Output = Result<T, DriverError>>,
    {
        let inner = &*self.inner;
        inner.admit()?;
        inner
            .scheduler
            .submit_with_deadline(priority, deadline, move || inner.attempt(operation))
            .await
    }

    /// [`submit`](Self::submit) at priority 0.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T, DbError>
    where
        F: FnOnce(D::Handle) -> Fut,
        Fut: Future<Output = Result<T, DriverError>>,
    {
        self.submit(0, operation).await
    }

    /// Runs `operation` with the configured retry policy.
    ///
    /// See [`execute_with_retry_opts`](Self::execute_with_retry_opts).
    pub async fn execute_with_retry<T, F, Fut>(&self, operation: F) -> Result<T, DbError>
    where
        F: Fn(D::Handle) -> Fut,
        Fut: Future<Output = Result<T, DriverError>>,
    {
        self.execute_with_retry_opts(RetryOptions::default(), operation)
            .await
    }

    /// Runs `operation`, retrying transient failures with jittered backoff.
    ///
    /// The whole retry loop runs inside one execution slot:
    ///
    /// - quota exhaustion opens the cooldown gate and returns at once;
    /// - retryable errors (timeouts, resets, deadlocks) are retried up to the
    ///   attempt budget, each attempt re-checking the gate;
    /// - a connect that exhausts its own attempts is returned as
    ///   [`DbError::Connect`] without another round;
    /// - anything else is returned immediately.
    ///
    /// When the budget is spent the most recent error is returned unchanged.
    pub async fn execute_with_retry_opts<T, F, Fut>(
        &self,
        options: RetryOptions,
        operation: F,
    ) -> Result<T, DbError>
    where
        F: Fn(D::Handle) -> Fut,
        Fut: Future<Output = Result<T, DriverError>>,
    {
        let inner = &*self.inner;
        inner.admit()?;
        let retry = inner.retry_for(&options);
        let operation = &operation;
        inner
            .scheduler
            .submit(options.priority, move || async move {
                retry
                    .execute(move |_| inner.attempt(operation))
                    .await
            })
            .await
    }

    /// Reports overall health.
    ///
    /// Runs one liveness tick (skipped if a query succeeded within the health
    /// interval) and never reconnects.
    pub async fn health_check(&self) -> HealthReport {
        let inner = &self.inner;
        let cooldown = inner.breaker.remaining();

        let probe_latency = if cooldown.is_zero() {
            match inner.monitor.run_once().await {
                TickOutcome::Alive { latency } => Some(latency),
                _ => None,
            }
        } else {
            None
        };

        let stats = inner.scheduler.stats();
        let state = inner.connection.state();
        let stalled = stats
            .oldest_wait
            .is_some_and(|wait| wait >= inner.config.queue_stall_threshold);
        let backed_up = stats.queued > inner.config.queue_warn_depth;

        let status = if !cooldown.is_zero() {
            HealthStatus::Cooldown
        } else {
            match state {
                ConnectionState::Ready if stalled || backed_up => HealthStatus::Degraded,
                ConnectionState::Ready => HealthStatus::Healthy,
                ConnectionState::Connecting => HealthStatus::Degraded,
                ConnectionState::Uninitialized | ConnectionState::Invalid => {
                    HealthStatus::Disconnected
                }
            }
        };

        HealthReport {
            status,
            connection_state: state.to_string(),
            queue_length: stats.queued,
            active_queries: stats.active,
            max_concurrent: stats.max_concurrent,
            oldest_queued: stats.oldest_wait,
            remaining_cooldown_minutes: (!cooldown.is_zero()).then(|| whole_minutes(cooldown)),
            probe_latency,
        }
    }

    /// Stops admissions, drains for up to `drain_timeout`, abandons the rest,
    /// then stops the monitor and releases the connection.
    pub async fn shutdown(&self, drain_timeout: Duration) -> ShutdownReport {
        let inner = &self.inner;
        tracing::info!(
            db = %inner.config.name,
            drain_timeout_ms = drain_timeout.as_millis() as u64,
            "shutting down"
        );

        let report = inner.scheduler.shutdown(drain_timeout).await;
        inner.monitor.stop();
        inner.connection.close().await;

        if report.timed_out {
            tracing::warn!(
                db = %inner.config.name,
                drained = report.drained,
                abandoned = report.abandoned(),
                "shutdown abandoned outstanding queries"
            );
        } else {
            tracing::info!(db = %inner.config.name, drained = report.drained, "shutdown complete");
        }
        report
    }

    /// [`shutdown`](Self::shutdown) with the configured drain window.
    pub async fn close(&self) -> ShutdownReport {
        self.shutdown(self.inner.config.drain_timeout).await
    }

    /// Returns the configuration.
    pub fn config(&self) -> &DatabaseConfig {
        &self.inner.config
    }

    /// Returns the connection manager.
    pub fn connection(&self) -> &ConnectionManager<D> {
        &self.inner.connection
    }

    /// Returns the scheduler.
    pub fn scheduler(&self) -> &QueryScheduler {
        &self.inner.scheduler
    }

    /// Returns the cooldown gate.
    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.inner.breaker
    }

    /// Returns the background health monitor.
    pub fn monitor(&self) -> &HealthMonitor<ConnectionManager<D>> {
        &self.inner.monitor
    }
}

impl<D: Driver> std::fmt::Debug for Database<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("config", &self.inner.config)
            .field("connection", &self.inner.connection.state())
            .field("scheduler", &self.inner.scheduler.stats())
            .field("cooldown", &self.inner.breaker.state())
            .finish()
    }
}

/// Builder for [`Database`].
pub struct DatabaseBuilder<D: Driver> {
    driver: D,
    config: DatabaseConfig,
    classifier: SharedClassifier,
    connection: ConnectionConfigBuilder,
    scheduler: SchedulerConfigBuilder,
    cooldown: CooldownConfigBuilder,
    retry: RetryConfigBuilder,
    health: HealthMonitorConfigBuilder,
}

impl<D: Driver> DatabaseBuilder<D> {
    fn new(driver: D) -> Self {
        Self {
            driver,
            config: DatabaseConfig::default(),
            classifier: Arc::new(SignatureClassifier::default()),
            connection: ConnectionConfig::builder(),
            scheduler: SchedulerConfig::builder(),
            cooldown: CooldownConfig::builder(),
            retry: RetryConfig::builder(),
            health: HealthMonitorConfig::builder(),
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: DatabaseConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets how driver errors are classified.
    ///
    /// Default: [`SignatureClassifier::default`]
    pub fn classifier<C>(mut self, classifier: C) -> Self
    where
        C: ErrorClassifier + 'static,
    {
        self.classifier = Arc::new(classifier);
        self
    }

    /// Registers a listener for connection lifecycle events.
    pub fn on_connection_event<F>(mut self, f: F) -> Self
    where
        F: Fn(&ConnectionEvent) + Send + Sync + 'static,
    {
        self.connection = self.connection.on_event(f);
        self
    }

    /// Registers a listener for scheduler events.
    pub fn on_scheduler_event<F>(mut self, f: F) -> Self
    where
        F: Fn(&SchedulerEvent) + Send + Sync + 'static,
    {
        self.scheduler = self.scheduler.on_event(f);
        self
    }

    /// Registers a listener for cooldown gate events.
    pub fn on_cooldown_event<F>(mut self, f: F) -> Self
    where
        F: Fn(&CooldownEvent) + Send + Sync + 'static,
    {
        self.cooldown = self.cooldown.on_event(f);
        self
    }

    /// Registers a listener for retry events.
    pub fn on_retry_event<F>(mut self, f: F) -> Self
    where
        F: Fn(&RetryEvent) + Send + Sync + 'static,
    {
        self.retry = self.retry.on_event(f);
        self
    }

    /// Registers a listener for health monitor events.
    pub fn on_health_event<F>(mut self, f: F) -> Self
    where
        F: Fn(&HealthEvent) + Send + Sync + 'static,
    {
        self.health = self.health.on_event(f);
        self
    }

    /// Wires the components together. Nothing connects until first use.
    pub fn build(self) -> Database<D> {
        let config = self.config;
        let name = config.name.clone();
        let classifier = self.classifier;

        let connection = ConnectionManager::new(
            self.driver,
            self.connection
                .name(format!("{name}.connection"))
                .connect_timeout(config.connect_timeout)
                .pool_timeout(config.connect_timeout)
                .statement_timeout(config.query_timeout)
                .pool_size(config.max_concurrent)
                .probe_timeout(config.probe_timeout)
                .max_attempts(config.connect_attempts)
                .shared_classifier(Arc::clone(&classifier))
                .build(),
        );

        let breaker = self
            .cooldown
            .name(format!("{name}.cooldown"))
            .duration(config.cooldown_duration)
            .shared_classifier(Arc::clone(&classifier))
            .build();

        let scheduler = self
            .scheduler
            .name(format!("{name}.scheduler"))
            .max_concurrent(config.max_concurrent)
            .queue_warn_depth(config.queue_warn_depth)
            .stall_threshold(config.queue_stall_threshold)
            .build();

        // an exhausted connect already spent its own attempts, so the default
        // predicate leaves it fatal for the call
        let retry = self
            .retry
            .name(format!("{name}.retry"))
            .max_attempts(config.max_retry_attempts)
            .initial_delay(config.retry_initial_delay)
            .circuit_breaker(breaker.clone())
            .build();

        let monitor = HealthMonitor::new(
            connection.clone(),
            self.health
                .name(format!("{name}.health"))
                .interval(config.health_check_interval)
                .build(),
        );

        tracing::debug!(
            db = %name,
            max_concurrent = config.max_concurrent,
            query_timeout_ms = config.query_timeout.as_millis() as u64,
            "database layer configured"
        );

        Database {
            inner: Arc::new(Inner {
                config,
                connection,
                scheduler,
                breaker,
                retry,
                classifier,
                monitor,
                monitor_started: AtomicBool::new(false),
            }),
        }
    }
}

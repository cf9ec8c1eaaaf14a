//! In-memory driver shared by the integration tests.

#![allow(dead_code)]

use dbgate::connection::{ConnectOptions, Driver};
use dbgate::{Database, DatabaseConfig, DatabaseConfigBuilder, DriverError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
pub struct Counters {
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
    pub statements: AtomicUsize,
    pub connect_delay_ms: AtomicUsize,
    /// Connect attempts that fail before one succeeds.
    pub failing_connects: AtomicUsize,
    pub probes_fail: AtomicBool,
    pub connect_error: Mutex<Option<DriverError>>,
    pub sql: Mutex<Vec<String>>,
}

/// A driver whose behavior is flipped through shared counters.
#[derive(Clone, Default)]
pub struct MockDriver(pub Arc<Counters>);

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_delay(self, delay: Duration) -> Self {
        self.0
            .connect_delay_ms
            .store(delay.as_millis() as usize, Ordering::SeqCst);
        self
    }

    pub fn failing_connects(self, n: usize) -> Self {
        self.0.failing_connects.store(n, Ordering::SeqCst);
        self
    }

    pub fn fail_connects_with(&self, err: DriverError) {
        *self.0.connect_error.lock().unwrap() = Some(err);
    }

    pub fn set_probes_fail(&self, fail: bool) {
        self.0.probes_fail.store(fail, Ordering::SeqCst);
    }

    pub fn connects(&self) -> usize {
        self.0.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.0.disconnects.load(Ordering::SeqCst)
    }

    pub fn statements(&self) -> usize {
        self.0.statements.load(Ordering::SeqCst)
    }

    pub fn executed_sql(&self) -> Vec<String> {
        self.0.sql.lock().unwrap().clone()
    }
}

impl Driver for MockDriver {
    type Handle = usize;

    async fn connect(&self, _options: &ConnectOptions) -> Result<usize, DriverError> {
        let n = self.0.connects.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = self.0.connect_delay_ms.load(Ordering::SeqCst) as u64;
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let configured = self.0.connect_error.lock().unwrap().clone();
        if let Some(err) = configured {
            return Err(err);
        }
        let remaining = self.0.failing_connects.load(Ordering::SeqCst);
        if remaining > 0 {
            self.0.failing_connects.store(remaining - 1, Ordering::SeqCst);
            return Err(DriverError::connection("connection refused").with_code("ECONNREFUSED"));
        }
        Ok(n)
    }

    async fn disconnect(&self, _handle: usize) {
        self.0.disconnects.fetch_add(1, Ordering::SeqCst);
    }

    async fn run_query(&self, _handle: &usize, sql: &str) -> Result<(), DriverError> {
        self.0.statements.fetch_add(1, Ordering::SeqCst);
        self.0.sql.lock().unwrap().push(sql.to_owned());
        if self.0.probes_fail.load(Ordering::SeqCst) {
            return Err(DriverError::connection("connection reset by peer").with_code("ECONNRESET"));
        }
        Ok(())
    }
}

/// A database with background probing off and short retry delays.
pub fn database(driver: &MockDriver, config: DatabaseConfigBuilder) -> Database<MockDriver> {
    Database::builder(driver.clone())
        .config(
            config
                .health_check_interval(Duration::ZERO)
                .retry_initial_delay(Duration::from_millis(50))
                .build(),
        )
        .build()
}

pub fn default_database(driver: &MockDriver) -> Database<MockDriver> {
    database(driver, DatabaseConfig::builder())
}

/// The error MySQL returns once the hourly connection quota is spent.
pub fn quota_error() -> DriverError {
    DriverError::query("User 'app' has exceeded the 'max_connections_per_hour' resource")
        .with_code("ER_USER_LIMIT_REACHED")
}

/// Tracks the highest number of overlapping operations.
#[derive(Clone, Default)]
pub struct ConcurrencyTracker {
    current: Arc<AtomicUsize>,
    max_seen: Arc<AtomicUsize>,
}

impl ConcurrencyTracker {
    pub fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_seen.fetch_max(now, Ordering::SeqCst);
    }

    pub fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn max_seen(&self) -> usize {
        self.max_seen.load(Ordering::SeqCst)
    }
}

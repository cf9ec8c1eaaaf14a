//! Connection manager metrics regression tests

use super::helpers::*;
use dbgate_connection::{ConnectOptions, ConnectionConfig, ConnectionManager, Driver};
use dbgate_core::DriverError;
use dbgate_retry::FixedInterval;
use serial_test::serial;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Refuses the first connect, accepts the rest.
#[derive(Clone, Default)]
struct SecondTimeLucky(Arc<AtomicUsize>);

impl Driver for SecondTimeLucky {
    type Handle = ();

    async fn connect(&self, _options: &ConnectOptions) -> Result<(), DriverError> {
        if self.0.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(DriverError::connection("connection refused"))
        } else {
            Ok(())
        }
    }

    async fn disconnect(&self, _handle: ()) {}

    async fn run_query(&self, _handle: &(), _sql: &str) -> Result<(), DriverError> {
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
#[serial]
async fn connection_metrics_exist() {
    init_recorder();

    let manager = ConnectionManager::new(
        SecondTimeLucky::default(),
        ConnectionConfig::builder()
            .name("test_connection")
            .backoff(FixedInterval::new(Duration::from_millis(10)))
            .build(),
    );

    let connected = manager.acquire().await.unwrap();
    manager.invalidate(connected.generation, "test");

    assert_counter_exists("dbgate_connection_attempts_total");
    assert_metric_has_label("dbgate_connection_attempts_total", "connection", "test_connection");
    assert_counter_exists("dbgate_connection_failures_total");
    assert_counter_exists("dbgate_connection_invalidations_total");
    assert_gauge_exists("dbgate_connection_ready");
    assert_histogram_exists("dbgate_connection_connect_duration_seconds");
}

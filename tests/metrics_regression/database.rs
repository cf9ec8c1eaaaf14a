//! Facade metrics regression tests

use super::helpers::*;
use dbgate::connection::{ConnectOptions, Driver};
use dbgate::{Database, DatabaseConfig, DriverError};
use serial_test::serial;
use std::time::Duration;

#[derive(Clone)]
struct Memory;

impl Driver for Memory {
    type Handle = ();

    async fn connect(&self, _options: &ConnectOptions) -> Result<(), DriverError> {
        Ok(())
    }

    async fn disconnect(&self, _handle: ()) {}

    async fn run_query(&self, _handle: &(), _sql: &str) -> Result<(), DriverError> {
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
#[serial]
async fn database_metrics_exist() {
    init_recorder();

    let db = Database::new(
        Memory,
        DatabaseConfig::builder()
            .name("orders")
            .health_check_interval(Duration::ZERO)
            .build(),
    );

    db.execute(|_| async { Ok::<_, DriverError>(()) })
        .await
        .unwrap();
    let _ = db
        .execute(|_| async { Err::<(), _>(DriverError::query("duplicate key").with_code("23505")) })
        .await;
    db.health_check().await;

    assert_histogram_exists("dbgate_query_duration_seconds");
    assert_metric_has_label("dbgate_query_duration_seconds", "db", "orders");
    assert_counter_exists("dbgate_queries_total");
    assert_metric_has_label("dbgate_queries_total", "outcome", "success");
    assert_metric_has_label("dbgate_queries_total", "outcome", "fatal");

    // components are named after the database
    assert_metric_has_label("dbgate_scheduler_submitted_total", "scheduler", "orders.scheduler");
    assert_metric_has_label("dbgate_connection_attempts_total", "connection", "orders.connection");
    assert_metric_has_label("dbgate_health_ticks_total", "monitor", "orders.health");
}

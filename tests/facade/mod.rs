//! End-to-end behavior of the `Database` facade.

use crate::support::{database, default_database, quota_error, MockDriver};
use dbgate::{Database, DatabaseConfig, DbError, DriverError, HealthStatus, QueryRequest};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tower::buffer::Buffer;
use tower::{Service, ServiceExt};

#[tokio::test(start_paused = true)]
async fn concurrent_ensure_connected_share_one_outcome() {
    let driver = MockDriver::new().with_connect_delay(Duration::from_millis(300));
    let db = default_database(&driver);

    let results = futures::future::join_all((0..20).map(|_| db.ensure_connected())).await;
    assert!(results.iter().all(Result::is_ok));
    assert_eq!(driver.connects(), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_ensure_connected_share_one_failure() {
    let driver = MockDriver::new().failing_connects(usize::MAX);
    let db = database(&driver, DatabaseConfig::builder().connect_attempts(3));

    let results = futures::future::join_all((0..20).map(|_| db.ensure_connected())).await;
    for result in &results {
        assert!(matches!(result, Err(DbError::Connect { attempts: 3, .. })));
    }
    assert_eq!(driver.connects(), 3);
}

#[tokio::test(start_paused = true)]
async fn shutdown_lets_fast_work_finish() {
    let driver = MockDriver::new();
    let db = default_database(&driver);
    db.ensure_connected().await.unwrap();

    let pending: Vec<_> = (0..3)
        .map(|i| {
            let db = db.clone();
            tokio::spawn(async move {
                db.execute(move |_| async move {
                    tokio::time::sleep(Duration::from_micros(500)).await;
                    Ok::<_, DriverError>(i)
                })
                .await
            })
        })
        .collect();
    while db.scheduler().stats().submitted < 3 {
        tokio::task::yield_now().await;
    }

    let report = db.shutdown(Duration::from_millis(1000)).await;
    assert!(!report.timed_out);
    assert_eq!(report.abandoned(), 0);

    for handle in pending {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(driver.disconnects(), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_reports_slow_work_as_abandoned() {
    let driver = MockDriver::new();
    let db = database(&driver, DatabaseConfig::builder().max_concurrent(2));
    db.ensure_connected().await.unwrap();

    let pending: Vec<_> = (0..5)
        .map(|_| {
            let db = db.clone();
            tokio::spawn(async move {
                db.execute(|_| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok::<_, DriverError>(())
                })
                .await
            })
        })
        .collect();
    tokio::time::sleep(Duration::from_millis(1)).await;

    let started = Instant::now();
    let report = db.shutdown(Duration::from_millis(1000)).await;
    let elapsed = started.elapsed();
    assert!(
        elapsed >= Duration::from_millis(1000) && elapsed < Duration::from_millis(1100),
        "{elapsed:?}"
    );

    assert!(report.timed_out);
    assert_eq!(report.pending, 5);
    assert_eq!(report.abandoned_running, 2);
    assert_eq!(report.abandoned_queued, 3);
    assert_eq!(report.drained, 0);

    for handle in pending {
        assert!(handle.await.unwrap().unwrap_err().is_shutdown());
    }
    assert!(db
        .execute(|_| async { Ok::<_, DriverError>(()) })
        .await
        .unwrap_err()
        .is_shutdown());
}

#[tokio::test(start_paused = true)]
async fn health_report_tracks_the_lifecycle() {
    let driver = MockDriver::new();
    let db = default_database(&driver);

    let report = db.health_check().await;
    assert_eq!(report.status, HealthStatus::Disconnected);
    assert_eq!(report.connection_state, "uninitialized");
    assert_eq!(report.max_concurrent, 25);
    assert_eq!(driver.connects(), 0, "health checks never connect");

    db.ensure_connected().await.unwrap();
    let report = db.health_check().await;
    assert_eq!(report.status, HealthStatus::Healthy);
    assert!(report.is_healthy());
    assert_eq!(report.queue_length, 0);
    assert_eq!(report.active_queries, 0);
    assert!(report.remaining_cooldown_minutes.is_none());

    // the idle probe notices a dead connection
    driver.set_probes_fail(true);
    let report = db.health_check().await;
    assert_eq!(report.status, HealthStatus::Disconnected);
    assert_eq!(report.connection_state, "invalid");
    driver.set_probes_fail(false);

    let _ = db.execute(|_| async { Err::<(), _>(quota_error()) }).await;
    let report = db.health_check().await;
    assert_eq!(report.status, HealthStatus::Cooldown);
    assert_eq!(report.remaining_cooldown_minutes, Some(60));
}

#[tokio::test(start_paused = true)]
async fn background_monitor_catches_an_idle_failure() {
    let driver = MockDriver::new();
    let db = Database::builder(driver.clone())
        .config(
            DatabaseConfig::builder()
                .health_check_interval(Duration::from_secs(30))
                .build(),
        )
        .build();

    db.execute(|_| async { Ok::<_, DriverError>(()) })
        .await
        .unwrap();
    assert!(db.monitor().is_running());

    driver.set_probes_fail(true);
    tokio::time::sleep(Duration::from_secs(65)).await;
    assert_eq!(db.health_check().await.status, HealthStatus::Disconnected);

    db.shutdown(Duration::from_secs(1)).await;
    assert!(!db.monitor().is_running());
}

#[tokio::test(start_paused = true)]
async fn tower_service_runs_statements() {
    let driver = MockDriver::new();
    let mut db = default_database(&driver);

    ServiceExt::<QueryRequest>::ready(&mut db)
        .await
        .unwrap()
        .call(QueryRequest::new("UPDATE jobs SET state = 'done'").priority(3))
        .await
        .unwrap();
    db.clone()
        .oneshot(QueryRequest::new("DELETE FROM jobs").with_retry())
        .await
        .unwrap();

    let sql = driver.executed_sql();
    assert!(sql.contains(&"UPDATE jobs SET state = 'done'".to_string()));
    assert!(sql.contains(&"DELETE FROM jobs".to_string()));

    db.shutdown(Duration::from_millis(10)).await;
    let refused = ServiceExt::<QueryRequest>::ready(&mut db)
        .await
        .unwrap()
        .call(QueryRequest::new("SELECT 1"))
        .await
        .unwrap_err();
    assert!(refused.is_shutdown());
}

#[tokio::test(start_paused = true)]
async fn buffered_service_recovers_after_cooldown() {
    let driver = MockDriver::new();
    let db = database(
        &driver,
        DatabaseConfig::builder().cooldown_duration(Duration::from_secs(60)),
    );
    let mut service = Buffer::new(db.clone(), 8);

    db.circuit_breaker().trip();
    let refused = service
        .ready()
        .await
        .unwrap()
        .call(QueryRequest::new("UPDATE jobs SET state = 'done'"))
        .await
        .unwrap_err();
    let refused = refused.downcast::<DbError>().unwrap();
    assert!(refused.is_cooldown());

    tokio::time::advance(Duration::from_secs(120)).await;
    assert!(!db.circuit_breaker().is_open());

    service
        .ready()
        .await
        .unwrap()
        .call(QueryRequest::new("UPDATE jobs SET state = 'done'"))
        .await
        .unwrap();
    assert!(driver
        .executed_sql()
        .contains(&"UPDATE jobs SET state = 'done'".to_string()));
}

#[test]
fn config_reads_prefixed_environment() {
    let env: HashMap<&str, &str> = HashMap::from([
        ("APP_DB_MAX_CONCURRENT", "10"),
        ("APP_DB_QUERY_TIMEOUT_MS", "2500"),
        ("APP_DB_COOLDOWN_DURATION_MS", "900000"),
        ("APP_DB_HEALTH_CHECK_INTERVAL_MS", "0"),
    ]);
    let config = DatabaseConfig::from_lookup("APP_DB_", |key| env.get(key).map(|v| v.to_string()))
        .unwrap();

    assert_eq!(config.max_concurrent(), 10);
    assert_eq!(config.query_timeout(), Duration::from_millis(2500));
    assert_eq!(config.cooldown_duration(), Duration::from_secs(900));
    assert!(config.health_check_interval().is_zero());
    assert_eq!(config.connect_timeout(), Duration::from_secs(15));
}

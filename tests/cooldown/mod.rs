//! Quota cooldown: idempotent trips, expiry, and refusal before the driver.

use crate::support::{database, default_database, quota_error, MockDriver};
use dbgate::{DatabaseConfig, DbError, DriverError};
use dbgate_cooldown::{CooldownConfig, CooldownEvent};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn repeated_trips_do_not_extend_the_window() {
    let tripped = Arc::new(AtomicUsize::new(0));
    let ignored = Arc::new(AtomicUsize::new(0));
    let t = Arc::clone(&tripped);
    let i = Arc::clone(&ignored);

    let breaker = CooldownConfig::builder()
        .duration(Duration::from_secs(3600))
        .on_event(move |event| match event {
            CooldownEvent::Tripped { .. } => {
                t.fetch_add(1, Ordering::SeqCst);
            }
            CooldownEvent::TripIgnored { .. } => {
                i.fetch_add(1, Ordering::SeqCst);
            }
            _ => {}
        })
        .build();

    assert!(breaker.trip());
    tokio::time::advance(Duration::from_secs(1800)).await;
    for _ in 0..5 {
        assert!(!breaker.trip());
    }

    assert_eq!(breaker.remaining(), Duration::from_secs(1800));
    assert_eq!(tripped.load(Ordering::SeqCst), 1);
    assert_eq!(ignored.load(Ordering::SeqCst), 5);
}

#[tokio::test(start_paused = true)]
async fn window_expires_on_its_own() {
    let breaker = CooldownConfig::builder()
        .duration(Duration::from_secs(60))
        .build();
    breaker.trip();

    tokio::time::advance(Duration::from_secs(59)).await;
    let refused = breaker.check().unwrap_err();
    assert_eq!(refused.remaining_minutes(), 1);

    tokio::time::advance(Duration::from_secs(1)).await;
    assert!(breaker.check().is_ok());
    assert!(!breaker.is_open());

    // a fresh trip after expiry opens a new full window
    assert!(breaker.trip());
    assert_eq!(breaker.remaining(), Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn concurrent_quota_errors_open_one_window() {
    let driver = MockDriver::new();
    let trips = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&trips);
    let db = dbgate::Database::builder(driver.clone())
        .config(
            DatabaseConfig::builder()
                .health_check_interval(Duration::ZERO)
                .build(),
        )
        .on_cooldown_event(move |event| {
            if matches!(event, CooldownEvent::Tripped { .. }) {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })
        .build();

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let db = db.clone();
            tokio::spawn(async move { db.execute(|_| async { Err::<(), _>(quota_error()) }).await })
        })
        .collect();

    for handle in handles {
        let err = handle.await.unwrap().unwrap_err();
        assert!(err.is_quota_exhausted() || err.is_cooldown(), "{err}");
    }
    assert_eq!(trips.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn refused_calls_never_reach_the_driver() {
    let driver = MockDriver::new();
    let db = default_database(&driver);

    let _ = db.execute(|_| async { Err::<(), _>(quota_error()) }).await;
    let statements = driver.statements();
    let connects = driver.connects();

    for _ in 0..3 {
        assert!(db.ensure_connected().await.unwrap_err().is_cooldown());
        assert!(db
            .execute(|_| async { Ok::<_, DriverError>(()) })
            .await
            .unwrap_err()
            .is_cooldown());
        assert!(db
            .execute_with_retry(|_| async { Ok::<_, DriverError>(()) })
            .await
            .unwrap_err()
            .is_cooldown());
    }

    assert_eq!(driver.statements(), statements);
    assert_eq!(driver.connects(), connects);
}

#[tokio::test(start_paused = true)]
async fn refusal_message_counts_whole_minutes_rounding_up() {
    let driver = MockDriver::new();
    let db = database(
        &driver,
        DatabaseConfig::builder().cooldown_duration(Duration::from_secs(3600)),
    );
    let _ = db.execute(|_| async { Err::<(), _>(quota_error()) }).await;

    tokio::time::advance(Duration::from_secs(3600 - 90)).await;
    let err = db
        .execute(|_| async { Ok::<_, DriverError>(()) })
        .await
        .unwrap_err();

    assert!(matches!(err, DbError::CooldownActive { .. }));
    assert_eq!(err.to_string(), "service degraded, retry after 2 minute(s)");
    assert_eq!(db.health_check().await.remaining_cooldown_minutes, Some(2));
}

//! Retry loop: backoff shape, jitter bounds and interaction with the cooldown gate.

use crate::support::{database, MockDriver};
use dbgate::{DatabaseConfig, DbError, DriverError, RetryOptions};
use dbgate_cooldown::CooldownConfig;
use dbgate_retry::{IntervalFunction, JitteredBackoff, RetryConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

fn transient() -> DbError {
    DbError::Retryable {
        source: DriverError::connection("connection reset").with_code("ECONNRESET"),
    }
}

#[tokio::test(start_paused = true)]
async fn delays_double_until_the_cap() {
    let delays = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&delays);

    let retry = RetryConfig::builder()
        .max_attempts(6)
        .initial_delay(Duration::from_millis(100))
        .max_delay(Duration::from_millis(500))
        .max_jitter(Duration::ZERO)
        .on_retry(move |_, delay| recorded.lock().unwrap().push(delay))
        .build();

    let started = Instant::now();
    let result: Result<(), DbError> = retry.execute(|_| async { Err(transient()) }).await;
    assert!(result.unwrap_err().is_retryable());

    let ms: Vec<u128> = delays.lock().unwrap().iter().map(|d| d.as_millis()).collect();
    assert_eq!(ms, vec![100, 200, 400, 500, 500]);
    assert_eq!(started.elapsed().as_millis(), 1700);
}

#[test]
fn jitter_stays_within_its_bound() {
    let backoff = JitteredBackoff::new(Duration::from_secs(2))
        .max_interval(Duration::from_secs(30))
        .max_jitter(Duration::from_secs(1));

    for retry in 0..8 {
        let base = backoff.base_interval(retry);
        for _ in 0..50 {
            let delay = backoff.next_interval(retry);
            assert!(delay >= base, "retry {retry}: {delay:?} < {base:?}");
            assert!(delay < base + Duration::from_secs(1), "retry {retry}: {delay:?}");
        }
    }
    assert_eq!(backoff.base_interval(0), Duration::from_secs(2));
    assert_eq!(backoff.base_interval(3), Duration::from_secs(16));
    assert_eq!(backoff.base_interval(7), Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn gate_opened_elsewhere_stops_the_loop() {
    let breaker = CooldownConfig::builder().build();
    let retry = RetryConfig::builder()
        .max_attempts(5)
        .initial_delay(Duration::from_millis(100))
        .max_jitter(Duration::ZERO)
        .circuit_breaker(breaker.clone())
        .build();
    let calls = Arc::new(AtomicUsize::new(0));

    let c = Arc::clone(&calls);
    let other = breaker.clone();
    let result: Result<(), DbError> = retry
        .execute(move |attempt| {
            c.fetch_add(1, Ordering::SeqCst);
            if attempt == 1 {
                // another caller hits the quota while we back off
                other.trip();
            }
            async { Err(transient()) }
        })
        .await;

    assert!(result.unwrap_err().is_cooldown());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn exhausted_connect_is_not_retried_again() {
    let driver = MockDriver::new().failing_connects(usize::MAX);
    let db = database(
        &driver,
        DatabaseConfig::builder()
            .connect_attempts(3)
            .max_retry_attempts(5),
    );
    let calls = Arc::new(AtomicUsize::new(0));

    let c = Arc::clone(&calls);
    let err = db
        .execute_with_retry(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, DriverError>(()) }
        })
        .await
        .unwrap_err();

    assert!(matches!(err, DbError::Connect { attempts: 3, .. }), "{err}");
    assert_eq!(driver.connects(), 3);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn per_call_overrides_replace_the_configured_policy() {
    let driver = MockDriver::new();
    let db = database(&driver, DatabaseConfig::builder().max_retry_attempts(5));
    let calls = Arc::new(AtomicUsize::new(0));

    let c = Arc::clone(&calls);
    let started = Instant::now();
    let err = db
        .execute_with_retry_opts(
            RetryOptions::new()
                .max_attempts(2)
                .initial_delay(Duration::from_secs(3)),
            move |_| {
                c.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(DriverError::query("deadlock detected").with_code("40P01")) }
            },
        )
        .await
        .unwrap_err();

    assert!(err.is_retryable());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    let waited = started.elapsed();
    assert!(waited >= Duration::from_secs(3) && waited <= Duration::from_secs(4), "{waited:?}");
}

//! Admission control under load, through both the scheduler and the facade.

use crate::support::{database, ConcurrencyTracker, MockDriver};
use dbgate::{DatabaseConfig, DbError, DriverError};
use dbgate_scheduler::{QueryScheduler, SchedulerConfig, SchedulerError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn hundred_queries_never_exceed_twenty_five_slots() {
    let driver = MockDriver::new();
    let db = database(&driver, DatabaseConfig::builder().max_concurrent(25));
    let tracker = ConcurrencyTracker::default();

    let handles: Vec<_> = (0..100)
        .map(|i| {
            let db = db.clone();
            let tracker = tracker.clone();
            tokio::spawn(async move {
                db.execute(move |_| async move {
                    tracker.enter();
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    tracker.exit();
                    Ok::<_, DriverError>(i)
                })
                .await
            })
        })
        .collect();

    let mut done = 0;
    for handle in handles {
        handle.await.unwrap().unwrap();
        done += 1;
    }

    assert_eq!(done, 100);
    assert_eq!(tracker.max_seen(), 25);
    let stats = db.scheduler().stats();
    assert_eq!(stats.active, 0);
    assert_eq!(stats.queued, 0);
    assert_eq!(stats.completed, 100);
    assert_eq!(driver.connects(), 1);
}

#[tokio::test(start_paused = true)]
async fn higher_priority_runs_first_and_fifo_among_equals() {
    let scheduler = QueryScheduler::new(SchedulerConfig::builder().max_concurrent(1).into_config());
    let order = Arc::new(Mutex::new(Vec::new()));

    // occupy the only slot so everything else queues
    let blocker = scheduler.acquire(0).await.unwrap();

    let submissions = [("low-1", 0), ("high-1", 10), ("mid", 5), ("low-2", 0), ("high-2", 10)];
    let mut handles = Vec::new();
    for (label, priority) in submissions {
        let scheduler = scheduler.clone();
        let order = Arc::clone(&order);
        handles.push(tokio::spawn(async move {
            scheduler
                .submit(priority, || async move {
                    order.lock().unwrap().push(label);
                    Ok::<_, SchedulerError>(())
                })
                .await
        }));
        // distinct enqueue times keep submission order well defined
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    assert_eq!(scheduler.stats().queued, 5);
    drop(blocker);
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(
        *order.lock().unwrap(),
        vec!["high-1", "high-2", "mid", "low-1", "low-2"]
    );
}

#[tokio::test(start_paused = true)]
async fn cancelled_callers_give_back_their_place() {
    let driver = MockDriver::new();
    let db = database(&driver, DatabaseConfig::builder().max_concurrent(2));
    let blockers: Vec<_> = (0..2)
        .map(|_| {
            let db = db.clone();
            tokio::spawn(async move {
                db.execute(|_| async {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    Ok::<_, DriverError>(())
                })
                .await
            })
        })
        .collect();
    tokio::time::sleep(Duration::from_millis(10)).await;

    for _ in 0..5 {
        let waited = tokio::time::timeout(
            Duration::from_millis(100),
            db.execute(|_| async { Ok::<_, DriverError>(()) }),
        )
        .await;
        assert!(waited.is_err());
    }

    for blocker in blockers {
        blocker.await.unwrap().unwrap();
    }

    let stats = db.scheduler().stats();
    assert_eq!(stats.active, 0);
    assert_eq!(stats.queued, 0);
    db.execute(|_| async { Ok::<_, DriverError>(()) })
        .await
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn deadline_gives_up_without_running_the_operation() {
    let driver = MockDriver::new();
    let db = database(&driver, DatabaseConfig::builder().max_concurrent(1));

    let slow = {
        let db = db.clone();
        tokio::spawn(async move {
            db.execute(|_| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Ok::<_, DriverError>(())
            })
            .await
        })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    let ran = Arc::new(AtomicBool::new(false));
    let ran_clone = Arc::clone(&ran);
    let err = db
        .submit_with_deadline(5, Duration::from_millis(500), move |_| async move {
            ran_clone.store(true, Ordering::SeqCst);
            Ok::<(), DriverError>(())
        })
        .await
        .unwrap_err();

    match err {
        DbError::DeadlineExceeded { waited } => assert!(waited >= Duration::from_millis(500)),
        other => panic!("expected deadline error, got {other:?}"),
    }
    assert!(!ran.load(Ordering::SeqCst));
    assert_eq!(db.scheduler().stats().deadline_exceeded, 1);
    slow.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn deadline_also_bounds_a_slow_connect() {
    let driver = MockDriver::new().with_connect_delay(Duration::from_secs(2));
    let db = database(&driver, DatabaseConfig::builder().max_concurrent(4));

    let ran = Arc::new(AtomicBool::new(false));
    let ran_clone = Arc::clone(&ran);
    let err = db
        .submit_with_deadline(0, Duration::from_millis(500), move |_| async move {
            ran_clone.store(true, Ordering::SeqCst);
            Ok::<(), DriverError>(())
        })
        .await
        .unwrap_err();

    match err {
        DbError::DeadlineExceeded { waited } => {
            assert!(waited >= Duration::from_millis(500) && waited < Duration::from_secs(2));
        }
        other => panic!("expected deadline error, got {other:?}"),
    }
    assert!(!ran.load(Ordering::SeqCst));
    let stats = db.scheduler().stats();
    assert_eq!(stats.active, 0);
    assert_eq!(stats.deadline_exceeded, 1);

    // the shared connect keeps going for the next caller
    db.execute(|_| async { Ok::<_, DriverError>(()) })
        .await
        .unwrap();
    assert_eq!(driver.connects(), 1);
}

#[tokio::test(start_paused = true)]
async fn deadline_also_bounds_the_operation() {
    let driver = MockDriver::new();
    let db = database(&driver, DatabaseConfig::builder().max_concurrent(1));
    db.ensure_connected().await.unwrap();

    let err = db
        .submit_with_deadline(0, Duration::from_millis(300), |_| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<(), DriverError>(())
        })
        .await
        .unwrap_err();

    assert!(matches!(err, DbError::DeadlineExceeded { .. }), "{err}");
    assert_eq!(db.scheduler().stats().active, 0);
    db.execute(|_| async { Ok::<_, DriverError>(()) })
        .await
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn a_failing_operation_releases_its_slot() {
    let driver = MockDriver::new();
    let db = database(&driver, DatabaseConfig::builder().max_concurrent(1));

    for _ in 0..3 {
        let err = db
            .execute(|_| async {
                Err::<(), _>(DriverError::query("duplicate key").with_code("23505"))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Fatal { .. }));
    }

    let err = db
        .execute(|_| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, DriverError>(())
        })
        .await
        .unwrap_err();
    assert!(err.is_retryable(), "query timeout should be retryable: {err}");

    assert_eq!(db.scheduler().stats().active, 0);
    db.execute(|_| async { Ok::<_, DriverError>(()) })
        .await
        .unwrap();
}

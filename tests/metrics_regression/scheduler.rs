//! Scheduler metrics regression tests

use super::helpers::*;
use dbgate_scheduler::{SchedulerConfig, SchedulerError};
use serial_test::serial;
use std::time::Duration;

#[tokio::test]
#[serial]
async fn scheduler_metrics_exist() {
    init_recorder();

    let scheduler = SchedulerConfig::builder()
        .name("test_scheduler")
        .max_concurrent(2)
        .build();

    for _ in 0..3 {
        scheduler
            .submit(0, || async { Ok::<_, SchedulerError>(()) })
            .await
            .unwrap();
    }

    assert_counter_exists("dbgate_scheduler_submitted_total");
    assert_metric_has_label("dbgate_scheduler_submitted_total", "scheduler", "test_scheduler");

    assert_gauge_exists("dbgate_scheduler_active");
    assert_gauge_exists("dbgate_scheduler_queue_depth");
    assert_metric_has_label("dbgate_scheduler_queue_depth", "scheduler", "test_scheduler");

    assert_histogram_exists("dbgate_scheduler_wait_seconds");
}

#[tokio::test(start_paused = true)]
#[serial]
async fn scheduler_overload_metrics() {
    init_recorder();

    let scheduler = SchedulerConfig::builder()
        .name("overloaded_scheduler")
        .max_concurrent(1)
        .queue_warn_depth(1)
        .stall_threshold(Duration::from_millis(100))
        .build();

    let blocker = scheduler.acquire(0).await.unwrap();
    let waiting: Vec<_> = (0..3)
        .map(|_| {
            let scheduler = scheduler.clone();
            tokio::spawn(async move {
                scheduler
                    .submit_with_deadline(0, Duration::from_millis(500), || async {
                        Ok::<_, SchedulerError>(())
                    })
                    .await
            })
        })
        .collect();

    for handle in waiting {
        assert!(matches!(
            handle.await.unwrap(),
            Err(SchedulerError::DeadlineExceeded { .. })
        ));
    }
    drop(blocker);
    scheduler.shutdown(Duration::from_millis(10)).await;

    assert_counter_exists("dbgate_scheduler_backpressure_warnings_total");
    assert_metric_has_label(
        "dbgate_scheduler_backpressure_warnings_total",
        "scheduler",
        "overloaded_scheduler",
    );
    assert_counter_exists("dbgate_scheduler_stall_alerts_total");
    assert_counter_exists("dbgate_scheduler_deadline_exceeded_total");
    assert_counter_exists("dbgate_scheduler_abandoned_total");
}

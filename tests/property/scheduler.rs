//! Property tests for the query scheduler.
//!
//! Invariants tested:
//! - Running tasks never exceed max_concurrent
//! - Every submitted task completes and no slot is leaked
//! - Queued tasks start in priority order, FIFO among equals

use super::paused_runtime;
use dbgate_scheduler::{QueryScheduler, SchedulerConfig, SchedulerError};
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Property: the scheduler never runs more tasks than it has slots
    #[test]
    fn scheduler_respects_max_concurrent(
        max_concurrent in 1usize..=20,
        work_ms in prop::collection::vec(0u64..=20, 1..=100),
    ) {
        let rt = paused_runtime();
        rt.block_on(async {
            let scheduler = QueryScheduler::new(
                SchedulerConfig::builder().max_concurrent(max_concurrent).into_config(),
            );
            let current = Arc::new(AtomicUsize::new(0));
            let max_seen = Arc::new(AtomicUsize::new(0));

            let handles: Vec<_> = work_ms
                .iter()
                .enumerate()
                .map(|(i, ms)| {
                    let scheduler = scheduler.clone();
                    let current = Arc::clone(&current);
                    let max_seen = Arc::clone(&max_seen);
                    let ms = *ms;
                    tokio::spawn(async move {
                        scheduler
                            .submit((i % 3) as i32, || async move {
                                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                                max_seen.fetch_max(now, Ordering::SeqCst);
                                tokio::time::sleep(Duration::from_millis(ms)).await;
                                current.fetch_sub(1, Ordering::SeqCst);
                                Ok::<_, SchedulerError>(())
                            })
                            .await
                    })
                })
                .collect();

            for handle in handles {
                handle.await.unwrap().unwrap();
            }

            let observed = max_seen.load(Ordering::SeqCst);
            prop_assert!(
                observed <= max_concurrent,
                "observed {} concurrent tasks but limit was {}",
                observed,
                max_concurrent
            );

            let stats = scheduler.stats();
            prop_assert_eq!(stats.active, 0);
            prop_assert_eq!(stats.queued, 0);
            prop_assert_eq!(stats.completed, work_ms.len() as u64);
            Ok(())
        })?;
    }

    /// Property: with one slot, queued work starts by priority then arrival
    #[test]
    fn scheduler_orders_by_priority_then_arrival(
        priorities in prop::collection::vec(-3i32..=3, 1..=30),
    ) {
        let rt = paused_runtime();
        rt.block_on(async {
            let scheduler = QueryScheduler::new(
                SchedulerConfig::builder().max_concurrent(1).into_config(),
            );
            let order = Arc::new(Mutex::new(Vec::new()));
            let blocker = scheduler.acquire(i32::MAX).await.unwrap();

            let mut handles = Vec::new();
            for (seq, priority) in priorities.iter().copied().enumerate() {
                let scheduler = scheduler.clone();
                let order = Arc::clone(&order);
                handles.push(tokio::spawn(async move {
                    scheduler
                        .submit(priority, || async move {
                            order.lock().unwrap().push((priority, seq));
                            Ok::<_, SchedulerError>(())
                        })
                        .await
                }));
                tokio::time::sleep(Duration::from_millis(1)).await;
            }

            drop(blocker);
            for handle in handles {
                handle.await.unwrap().unwrap();
            }

            let mut expected: Vec<(i32, usize)> =
                priorities.iter().copied().enumerate().map(|(s, p)| (p, s)).collect();
            expected.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
            prop_assert_eq!(order.lock().unwrap().clone(), expected);
            Ok(())
        })?;
    }
}

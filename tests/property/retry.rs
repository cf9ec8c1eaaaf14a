//! Property tests for the retry loop.
//!
//! Invariants tested:
//! - Never exceeds max_attempts
//! - Stops at the first success
//! - Fatal errors are never retried
//! - Delays are non-decreasing up to the cap, jitter on top

use super::paused_runtime;
use dbgate_core::{DbError, DriverError};
use dbgate_retry::{IntervalFunction, JitteredBackoff, RetryConfig};
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn retryable() -> DbError {
    DbError::Retryable {
        source: DriverError::connection("connection reset").with_code("ECONNRESET"),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Property: the operation runs at most max_attempts times
    #[test]
    fn retry_respects_max_attempts(max_attempts in 1usize..=10) {
        let rt = paused_runtime();
        rt.block_on(async {
            let calls = Arc::new(AtomicUsize::new(0));
            let retry = RetryConfig::builder()
                .max_attempts(max_attempts)
                .initial_delay(Duration::from_millis(10))
                .build();

            let c = Arc::clone(&calls);
            let result: Result<(), DbError> = retry
                .execute(move |_| {
                    c.fetch_add(1, Ordering::SeqCst);
                    async { Err(retryable()) }
                })
                .await;

            prop_assert!(result.is_err());
            prop_assert_eq!(calls.load(Ordering::SeqCst), max_attempts);
            Ok(())
        })?;
    }

    /// Property: the loop stops as soon as an attempt succeeds
    #[test]
    fn retry_stops_on_first_success(
        max_attempts in 1usize..=10,
        succeed_on in 0usize..10,
    ) {
        let rt = paused_runtime();
        rt.block_on(async {
            let retry = RetryConfig::builder()
                .max_attempts(max_attempts)
                .initial_delay(Duration::from_millis(10))
                .build();

            let result = retry
                .execute(|attempt| async move {
                    if attempt == succeed_on {
                        Ok(attempt)
                    } else {
                        Err(retryable())
                    }
                })
                .await;

            if succeed_on < max_attempts {
                prop_assert_eq!(result.unwrap(), succeed_on);
            } else {
                prop_assert!(result.unwrap_err().is_retryable());
            }
            Ok(())
        })?;
    }

    /// Property: fatal errors end the loop after one attempt
    #[test]
    fn retry_never_repeats_fatal_errors(max_attempts in 1usize..=10) {
        let rt = paused_runtime();
        rt.block_on(async {
            let calls = Arc::new(AtomicUsize::new(0));
            let retry = RetryConfig::builder().max_attempts(max_attempts).build();

            let c = Arc::clone(&calls);
            let result: Result<(), DbError> = retry
                .execute(move |_| {
                    c.fetch_add(1, Ordering::SeqCst);
                    async {
                        Err(DbError::Fatal {
                            source: DriverError::query("syntax error").with_code("42601"),
                        })
                    }
                })
                .await;

            let is_fatal = matches!(result, Err(DbError::Fatal { .. }));
            prop_assert!(is_fatal);
            prop_assert_eq!(calls.load(Ordering::SeqCst), 1);
            Ok(())
        })?;
    }

    /// Property: base delays never shrink and never pass the cap; jitter stays bounded
    #[test]
    fn backoff_is_monotonic_up_to_the_cap(
        initial_ms in 1u64..=5_000,
        cap_ms in 1u64..=60_000,
        jitter_ms in 0u64..=2_000,
    ) {
        let cap = Duration::from_millis(cap_ms);
        let jitter = Duration::from_millis(jitter_ms);
        let backoff = JitteredBackoff::new(Duration::from_millis(initial_ms))
            .max_interval(cap)
            .max_jitter(jitter);

        let mut previous = Duration::ZERO;
        for retry in 0..16 {
            let base = backoff.base_interval(retry);
            prop_assert!(base >= previous, "retry {}: {:?} < {:?}", retry, base, previous);
            prop_assert!(base <= cap);

            let delay = backoff.next_interval(retry);
            prop_assert!(delay >= base);
            prop_assert!(delay <= base + jitter);
            previous = base;
        }
    }
}

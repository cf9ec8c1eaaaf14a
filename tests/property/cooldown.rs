//! Property tests for the cooldown gate.
//!
//! Invariants tested:
//! - Trips inside an open window never move its end
//! - The gate admits again once the window has passed, without a reset

use super::paused_runtime;
use dbgate_cooldown::CooldownConfig;
use proptest::prelude::*;
use std::time::Duration;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Property: re-tripping never extends the window
    #[test]
    fn cooldown_trips_are_idempotent(
        window_secs in 1u64..=7_200,
        offsets in prop::collection::vec(0u64..1_000, 1..=10),
    ) {
        let rt = paused_runtime();
        rt.block_on(async {
            let window = Duration::from_secs(window_secs);
            let breaker = CooldownConfig::builder().duration(window).build();
            prop_assert!(breaker.trip());
            let opened = tokio::time::Instant::now();

            for offset in offsets {
                let step = Duration::from_millis(offset);
                if opened.elapsed() + step >= window {
                    break;
                }
                tokio::time::advance(step).await;
                prop_assert!(!breaker.trip());
                prop_assert_eq!(breaker.remaining(), window - opened.elapsed());
            }

            tokio::time::advance(window.saturating_sub(opened.elapsed())).await;
            prop_assert!(breaker.check().is_ok());
            prop_assert!(!breaker.is_open());
            Ok(())
        })?;
    }
}

//! Priority query scheduling with bounded concurrency.
//!
//! [`QueryScheduler`] admits at most `max_concurrent` tasks at a time (25 by
//! default). Anything beyond that waits in a priority queue: higher priority
//! first, submission order among equals. When a task finishes its slot passes
//! directly to the best waiter, so a slot is never idle while work is queued.
//!
//! The scheduler also watches its own queue:
//!
//! - **Backpressure**: a warning fires once when depth exceeds
//!   `queue_warn_depth` (50) and re-arms after the queue drains below it.
//! - **Stalls**: an alert fires when the oldest queued task has waited longer
//!   than `stall_threshold` (5s), which usually means every slot is stuck.
//!
//! # Example
//!
//! ```rust
//! use dbgate_scheduler::{SchedulerConfig, SchedulerError};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let scheduler = SchedulerConfig::builder()
//!     .max_concurrent(25)
//!     .queue_warn_depth(50)
//!     .stall_threshold(Duration::from_secs(5))
//!     .name("primary")
//!     .build();
//!
//! // priority 10 jumps ahead of anything queued at 0
//! let count = scheduler
//!     .submit(10, || async { Ok::<_, SchedulerError>(3) })
//!     .await
//!     .unwrap();
//! assert_eq!(count, 3);
//!
//! let report = scheduler.shutdown(Duration::from_secs(10)).await;
//! assert!(!report.timed_out);
//! # }
//! ```
//!
//! # Shutdown
//!
//! [`QueryScheduler::shutdown`] stops admissions and gives pending work a
//! drain window. Whatever is still queued or running when it closes fails
//! with [`SchedulerError::Abandoned`].
//!
//! ## Feature Flags
//! - `metrics`: queue depth and active gauges, wait-time histogram, alert counters
//! - `tracing`: backpressure, stall and shutdown logging

mod config;
mod error;
mod events;
mod queue;
mod scheduler;

pub use config::{
    SchedulerConfig, SchedulerConfigBuilder, DEFAULT_MAX_CONCURRENT, DEFAULT_QUEUE_WARN_DEPTH,
    DEFAULT_STALL_THRESHOLD,
};
pub use error::SchedulerError;
pub use events::SchedulerEvent;
pub use scheduler::{QueryScheduler, SchedulerStats, ShutdownReport, SlotPermit};

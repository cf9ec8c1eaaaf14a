//! Background liveness monitoring for a database connection.
//!
//! [`HealthMonitor`] wakes up on a fixed interval (default 30 seconds) and
//! probes a [`LivenessTarget`]. It stays quiet under load: if a real operation
//! succeeded within the last interval, the tick is skipped.
//!
//! When a probe fails the target invalidates its connection, so the next
//! caller pays the reconnection cost up front instead of discovering a dead
//! session mid-query. The monitor itself never reconnects.
//!
//! ## Example
//!
//! ```rust
//! use dbgate_healthcheck::{HealthMonitor, HealthMonitorConfig, LivenessTarget, ProbeOutcome};
//! use std::time::Duration;
//! use tokio::time::Instant;
//!
//! struct Session;
//!
//! impl LivenessTarget for Session {
//!     fn last_activity(&self) -> Option<Instant> {
//!         None
//!     }
//!
//!     async fn probe(&self) -> ProbeOutcome {
//!         ProbeOutcome::Alive
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let monitor = HealthMonitor::new(
//!     Session,
//!     HealthMonitorConfig::builder()
//!         .interval(Duration::from_secs(30))
//!         .build(),
//! );
//! monitor.start();
//! // ...
//! monitor.stop();
//! # }
//! ```

mod config;
mod events;
mod monitor;
mod target;

pub use config::{HealthMonitorConfig, HealthMonitorConfigBuilder, DEFAULT_INTERVAL};
pub use events::HealthEvent;
pub use monitor::{HealthMonitor, MonitorStatus, TickOutcome};
pub use target::{LivenessTarget, ProbeOutcome};

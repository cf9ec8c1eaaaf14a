//! Resilient access to a relational database.
//!
//! `dbgate` sits between application code and an opaque database driver and
//! decides when to (re)connect, how many operations may run at once, what to
//! do when one fails, and when to stop trying altogether.
//!
//! # Components
//!
//! - **Connection** ([`dbgate_connection`]): one verified handle, at most one
//!   connect attempt in flight, bounded attempts with backoff.
//! - **Scheduler** ([`dbgate_scheduler`]): bounded concurrency with a
//!   priority queue; higher priority first, FIFO among equals.
//! - **Cooldown** ([`dbgate_cooldown`]): when the provider reports quota
//!   exhaustion, every call is refused for a fixed window (1 hour by default)
//!   instead of burning more of the quota.
//! - **Retry** ([`dbgate_retry`]): jittered exponential backoff for transient
//!   failures, run inside the operation's slot.
//! - **Health** ([`dbgate_healthcheck`]): a background probe that catches a
//!   connection dying while the application is idle.
//!
//! [`Database`] wires them together.
//!
//! # Example
//!
//! ```rust
//! use dbgate::{Database, DatabaseConfig, DriverError, RetryOptions};
//! use dbgate_connection::{ConnectOptions, Driver};
//! use std::time::Duration;
//!
//! #[derive(Clone)]
//! struct Session;
//!
//! struct Postgres;
//!
//! impl Driver for Postgres {
//!     type Handle = Session;
//!
//!     async fn connect(&self, _options: &ConnectOptions) -> Result<Session, DriverError> {
//!         Ok(Session)
//!     }
//!
//!     async fn disconnect(&self, _handle: Session) {}
//!
//!     async fn run_query(&self, _handle: &Session, _sql: &str) -> Result<(), DriverError> {
//!         Ok(())
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), dbgate::DbError> {
//! let db = Database::builder(Postgres)
//!     .config(
//!         DatabaseConfig::builder()
//!             .max_concurrent(25)
//!             .query_timeout(Duration::from_secs(10))
//!             .build(),
//!     )
//!     .build();
//!
//! // one attempt, high priority
//! let rows = db.submit(10, |_session| async { Ok::<_, DriverError>(3) }).await?;
//! assert_eq!(rows, 3);
//!
//! // transient failures retried with backoff
//! db.execute_with_retry_opts(RetryOptions::new().max_attempts(3), |_session| async {
//!     Ok::<_, DriverError>(())
//! })
//! .await?;
//!
//! let health = db.health_check().await;
//! assert!(health.is_healthy());
//!
//! db.shutdown(Duration::from_secs(10)).await;
//! # Ok(())
//! # }
//! ```
//!
//! # Errors
//!
//! Every call returns [`DbError`]. The driver's own error is carried
//! unchanged inside it, classified as retryable, fatal or quota-exhausted by
//! the configured [`ErrorClassifier`]. While the cooldown is open calls fail
//! with [`DbError::CooldownActive`] ("service degraded, retry after N
//! minutes") without touching the driver.
//!
//! # Configuration
//!
//! [`DatabaseConfig`] is built in code or read from the environment with
//! [`DatabaseConfig::from_env`] / [`DatabaseConfig::from_env_with_prefix`].
//!
//! ## Feature Flags
//! - `metrics`: enables the `metrics` feature of every component, plus query
//!   duration and outcome metrics
//! - `serde`: `Serialize`/`Deserialize` for [`DatabaseConfig`] and [`HealthReport`]
//!
//! Logging through `tracing` is always on.

mod attempt;
mod config;
mod database;
mod health;
mod service;

pub use config::{
    ConfigError, DatabaseConfig, DatabaseConfigBuilder, DEFAULT_DRAIN_TIMEOUT,
    DEFAULT_HEALTH_CHECK_INTERVAL, DEFAULT_MAX_CONCURRENT, DEFAULT_QUERY_TIMEOUT,
};
pub use database::{Database, DatabaseBuilder, RetryOptions};
pub use health::{HealthReport, HealthStatus};
pub use service::QueryRequest;

pub use dbgate_core::classifier::{
    ErrorClass, ErrorClassifier, FnClassifier, SignatureClassifier, SignatureClassifierBuilder,
};
pub use dbgate_core::{DbError, DriverError, DriverErrorKind};
pub use dbgate_scheduler::ShutdownReport;

pub use dbgate_connection as connection;
pub use dbgate_cooldown as cooldown;
pub use dbgate_core as core;
pub use dbgate_healthcheck as healthcheck;
pub use dbgate_retry as retry;
pub use dbgate_scheduler as scheduler;

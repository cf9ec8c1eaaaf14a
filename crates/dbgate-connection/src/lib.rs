//! Connection lifecycle for dbgate.
//!
//! [`ConnectionManager`] owns the single driver handle. It connects lazily,
//! verifies every new handle with a probe query, and coalesces concurrent
//! reconnects into one attempt (single-flight):
//!
//! - **Ready**: a liveness probe (default `SELECT 1`, 5s timeout) runs first;
//!   if it passes the caller proceeds.
//! - **Connecting**: the caller waits on the attempt already in flight.
//! - **Uninitialized / Invalid**: the caller starts an attempt. Any previous
//!   handle is disconnected, a new one is built with explicit
//!   [`ConnectOptions`], the transport connect runs under a timeout (15s), and
//!   one verification query runs under the probe timeout.
//!
//! A failed attempt is retried up to 3 times in total with exponential backoff
//! (1s, 2s, 4s... capped at 10s). A quota-exhaustion error stops at once. When
//! all attempts fail the state stays Invalid, so the next caller starts over.
//!
//! Handles carry a generation number. A caller that sees a connection-class
//! error invalidates only the generation it used, so a late report can never
//! tear down a newer handle.
//!
//! ## Example
//!
//! ```rust
//! use dbgate_connection::{ConnectOptions, ConnectionConfig, ConnectionManager, Driver};
//! use dbgate_core::DriverError;
//! use std::time::Duration;
//!
//! #[derive(Clone)]
//! struct Pool;
//!
//! struct InMemory;
//!
//! impl Driver for InMemory {
//!     type Handle = Pool;
//!
//!     async fn connect(&self, _options: &ConnectOptions) -> Result<Pool, DriverError> {
//!         Ok(Pool)
//!     }
//!
//!     async fn disconnect(&self, _handle: Pool) {}
//!
//!     async fn run_query(&self, _handle: &Pool, _sql: &str) -> Result<(), DriverError> {
//!         Ok(())
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let manager = ConnectionManager::new(
//!     InMemory,
//!     ConnectionConfig::builder()
//!         .connect_timeout(Duration::from_secs(15))
//!         .pool_size(25)
//!         .build(),
//! );
//!
//! manager.ensure_connected().await.unwrap();
//! assert!(manager.state().is_ready());
//! # }
//! ```
//!
//! ## Feature Flags
//! - `metrics`: connect attempts, failures, invalidations and a readiness gauge
//! - `tracing`: lifecycle logging via the tracing crate

mod config;
mod driver;
mod error;
mod events;
mod manager;
mod state;

pub use config::{
    ConnectionConfig, ConnectionConfigBuilder, DEFAULT_CONNECT_ATTEMPTS, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_PROBE_TIMEOUT,
};
pub use driver::{ConnectOptions, Driver};
pub use error::ConnectError;
pub use events::ConnectionEvent;
pub use manager::{Connected, ConnectionManager};
pub use state::{ConnectionState, ConnectionStatus};

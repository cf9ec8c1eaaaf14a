//! The boundary between dbgate and a concrete database client.

use dbgate_core::DriverError;
use std::future::Future;
use std::time::Duration;

/// Timeouts and sizing passed to the driver when a handle is constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Transport-level connect timeout.
    pub connect_timeout: Duration,
    /// How long the driver's pool may block waiting for a free session.
    pub pool_timeout: Duration,
    /// Server-side statement timeout.
    pub statement_timeout: Duration,
    /// Size of the driver's own pool; matches the scheduler's concurrency budget.
    pub pool_size: usize,
}

/// A database client that dbgate can drive.
///
/// `Handle` is whatever the driver hands out for issuing queries: a pool, a
/// client, a session. It is cloned into every operation, so it should be a
/// cheap, shareable reference.
///
/// # Examples
///
/// ```rust
/// use dbgate_connection::{ConnectOptions, Driver};
/// use dbgate_core::DriverError;
///
/// #[derive(Clone)]
/// struct Pool;
///
/// struct InMemory;
///
/// impl Driver for InMemory {
///     type Handle = Pool;
///
///     async fn connect(&self, _options: &ConnectOptions) -> Result<Pool, DriverError> {
///         Ok(Pool)
///     }
///
///     async fn disconnect(&self, _handle: Pool) {}
///
///     async fn run_query(&self, _handle: &Pool, _sql: &str) -> Result<(), DriverError> {
///         Ok(())
///     }
/// }
/// ```
pub trait Driver: Send + Sync + 'static {
    /// The connected resource.
    type Handle: Clone + Send + Sync + 'static;

    /// Establishes a new handle.
    fn connect(
        &self,
        options: &ConnectOptions,
    ) -> impl Future<Output = Result<Self::Handle, DriverError>> + Send;

    /// Releases a handle. Errors are the driver's to log; the handle is gone either way.
    fn disconnect(&self, handle: Self::Handle) -> impl Future<Output = ()> + Send;

    /// Runs a statement whose result is ignored. Used for liveness probes.
    fn run_query(
        &self,
        handle: &Self::Handle,
        sql: &str,
    ) -> impl Future<Output = Result<(), DriverError>> + Send;
}

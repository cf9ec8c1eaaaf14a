//! tower adapter: plain SQL statements as a `Service`.

use crate::database::{Database, RetryOptions};
use dbgate_connection::Driver;
use dbgate_core::DbError;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;

/// A statement to run through [`Database`] as a tower service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    sql: Arc<str>,
    priority: i32,
    retry: bool,
}

impl QueryRequest {
    /// A single-attempt statement at priority 0.
    pub fn new(sql: impl Into<Arc<str>>) -> Self {
        Self {
            sql: sql.into(),
            priority: 0,
            retry: false,
        }
    }

    /// Sets the scheduling priority.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Runs the statement with the configured retry policy.
    pub fn with_retry(mut self) -> Self {
        self.retry = true;
        self
    }

    /// The statement text.
    pub fn sql(&self) -> &str {
        &self.sql
    }
}

/// Runs [`QueryRequest`]s through the scheduler.
///
/// The service is always ready. A refusal (open cooldown gate, shutdown) is
/// returned from the call itself, so middleware that treats a `poll_ready`
/// error as terminal keeps working once the window closes.
///
/// ```rust,no_run
/// # use dbgate::{Database, QueryRequest};
/// # use dbgate_connection::Driver;
/// # async fn example<D: Driver>(db: Database<D>) -> Result<(), dbgate::DbError> {
/// use tower::ServiceExt;
///
/// db.clone()
///     .oneshot(QueryRequest::new("UPDATE jobs SET state = 'done'").with_retry())
///     .await?;
/// # Ok(())
/// # }
/// ```
impl<D: Driver> Service<QueryRequest> for Database<D> {
    type Response = ();
    type Error = DbError;
    type Future = BoxFuture<'static, Result<(), DbError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: QueryRequest) -> Self::Future {
        let db = self.clone();
        Box::pin(async move {
            let driver = db.inner.connection.driver();
            let sql: &str = &request.sql;
            let run = move |handle: D::Handle| async move { driver.run_query(&handle, sql).await };

            if request.retry {
                db.execute_with_retry_opts(RetryOptions::new().priority(request.priority), run)
                    .await
            } else {
                db.submit(request.priority, run).await
            }
        })
    }
}

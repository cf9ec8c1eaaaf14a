//! Runs a handful of queries against an in-memory driver that drops its
//! connection every few statements and fails the occasional one with a
//! deadlock.
//!
//! ```bash
//! RUST_LOG=dbgate=debug cargo run -p dbgate --example basic_usage
//! ```

use dbgate::connection::{ConnectOptions, Driver};
use dbgate::{Database, DatabaseConfig, DriverError, QueryRequest, RetryOptions};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug)]
struct Session {
    id: usize,
}

#[derive(Default)]
struct Counters {
    sessions: AtomicUsize,
    statements: AtomicUsize,
}

#[derive(Clone, Default)]
struct Flaky(Arc<Counters>);

impl Driver for Flaky {
    type Handle = Session;

    async fn connect(&self, options: &ConnectOptions) -> Result<Session, DriverError> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let id = self.0.sessions.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(id, pool_size = options.pool_size, "session opened");
        Ok(Session { id })
    }

    async fn disconnect(&self, handle: Session) {
        tracing::info!(id = handle.id, "session closed");
    }

    async fn run_query(&self, handle: &Session, sql: &str) -> Result<(), DriverError> {
        let n = self.0.statements.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(Duration::from_millis(5)).await;
        if n % 11 == 0 {
            return Err(DriverError::connection("server closed the connection").with_code("57P01"));
        }
        if n % 7 == 0 {
            return Err(DriverError::query("deadlock detected").with_code("40P01"));
        }
        tracing::debug!(session = handle.id, sql, "ok");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = DatabaseConfig::from_env_with_prefix("DBGATE_")?;
    let driver = Flaky::default();

    let db = Database::builder(driver.clone())
        .config(config)
        .on_connection_event(|event| tracing::debug!(?event, "connection"))
        .on_retry_event(|event| tracing::debug!(?event, "retry"))
        .build();

    db.ensure_connected().await?;

    let mut tasks = Vec::new();
    for i in 0..20 {
        let db = db.clone();
        let driver = driver.clone();
        tasks.push(tokio::spawn(async move {
            let sql = format!("UPDATE jobs SET state = 'done' WHERE id = {i}");
            let priority = if i % 5 == 0 { 10 } else { 0 };
            db.execute_with_retry_opts(
                RetryOptions::new()
                    .priority(priority)
                    .initial_delay(Duration::from_millis(10)),
                |session| {
                    let driver = driver.clone();
                    let sql = sql.clone();
                    async move { driver.run_query(&session, &sql).await }
                },
            )
            .await
        }));
    }

    let mut failed = 0;
    for task in tasks {
        if let Err(err) = task.await? {
            tracing::warn!(%err, "query failed");
            failed += 1;
        }
    }
    tracing::info!(failed, "batch finished");

    db.clone()
        .oneshot(QueryRequest::new("DELETE FROM jobs WHERE state = 'done'").with_retry())
        .await?;

    let health = db.health_check().await;
    tracing::info!(
        status = %health.status,
        connection = %health.connection_state,
        queued = health.queue_length,
        active = health.active_queries,
        "health"
    );

    let report = db.close().await;
    tracing::info!(?report, "closed");
    Ok(())
}

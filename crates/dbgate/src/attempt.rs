//! One execution attempt: gate, connect, run under a timeout, classify.

use crate::database::Inner;
use dbgate_connection::{ConnectError, Connected, Driver};
use dbgate_core::classifier::ErrorClass;
use dbgate_core::{DbError, DriverError};
#[cfg(feature = "metrics")]
use metrics::{counter, histogram};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

impl<D: Driver> Inner<D> {
    /// Fails fast while the cooldown gate is open.
    pub(crate) fn admit(&self) -> Result<(), DbError> {
        self.breaker.check().map_err(DbError::from)
    }

    /// Runs `operation` once against a verified handle.
    ///
    /// Driver errors come back classified. A connection-class failure
    /// invalidates the handle it ran on; a quota failure opens the cooldown
    /// gate.
    pub(crate) async fn attempt<T, F, Fut>(&self, operation: F) -> Result<T, DbError>
    where
        F: FnOnce(D::Handle) -> Fut,
        Fut: Future<Output = Result<T, DriverError>>,
    {
        self.admit()?;
        self.start_monitor();

        let Connected { handle, generation } = self
            .connection
            .acquire()
            .await
            .map_err(|err| self.connect_failed(err))?;

        let limit = self.config.query_timeout;
        let started = Instant::now();
        let result = match tokio::time::timeout(limit, operation(handle)).await {
            Ok(result) => result,
            Err(_) => Err(DriverError::timeout("query", limit)),
        };

        #[cfg(feature = "metrics")]
        histogram!("dbgate_query_duration_seconds", "db" => self.config.name.clone())
            .record(started.elapsed().as_secs_f64());

        match result {
            Ok(value) => {
                self.connection.record_success();
                #[cfg(feature = "metrics")]
                counter!("dbgate_queries_total", "db" => self.config.name.clone(), "outcome" => "success")
                    .increment(1);
                Ok(value)
            }
            Err(source) => {
                tracing::debug!(
                    db = %self.config.name,
                    generation,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    error = %source,
                    "query attempt failed"
                );
                Err(self.failed(source, generation))
            }
        }
    }

    /// Maps a connection-manager failure into the caller's error.
    pub(crate) fn connect_failed(&self, err: ConnectError) -> DbError {
        if matches!(err, ConnectError::QuotaExhausted { .. }) {
            self.trip_cooldown(err.driver_error());
        }
        DbError::from(err).with_retry_after(self.breaker.remaining())
    }

    fn failed(&self, source: DriverError, generation: u64) -> DbError {
        let class = self.classifier.classify(&source);

        if source.is_connection_class() {
            self.connection.invalidate(generation, source.to_string());
        }

        #[cfg(feature = "metrics")]
        counter!(
            "dbgate_queries_total",
            "db" => self.config.name.clone(),
            "outcome" => match class {
                ErrorClass::Retryable => "retryable",
                ErrorClass::Fatal => "fatal",
                ErrorClass::QuotaExhausted => "quota_exhausted",
            }
        )
        .increment(1);

        let retry_after = match class {
            ErrorClass::QuotaExhausted => {
                self.trip_cooldown(Some(&source));
                self.breaker.remaining()
            }
            ErrorClass::Retryable | ErrorClass::Fatal => Duration::ZERO,
        };
        DbError::classified(source, class, retry_after)
    }

    fn trip_cooldown(&self, source: Option<&DriverError>) {
        if self.breaker.trip() {
            tracing::error!(
                db = %self.config.name,
                cooldown_secs = self.breaker.remaining().as_secs(),
                error = source.map(tracing::field::display),
                "database quota exhausted, refusing calls until the cooldown ends"
            );
        }
    }
}

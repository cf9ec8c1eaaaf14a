//! Single-flight connection management.

use crate::config::ConnectionConfig;
use crate::driver::Driver;
use crate::error::ConnectError;
use crate::events::ConnectionEvent;
use crate::state::{ConnectionState, ConnectionStatus};
use dbgate_core::classifier::ErrorClass;
use dbgate_core::DriverError;
use dbgate_healthcheck::{LivenessTarget, ProbeOutcome};
use futures::future::{BoxFuture, FutureExt, Shared};
#[cfg(feature = "metrics")]
use metrics::{counter, gauge, histogram};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::time::Instant;

type ConnectAttempt = Shared<BoxFuture<'static, Result<u64, ConnectError>>>;

/// A verified handle together with the generation it belongs to.
///
/// Pass the generation back to [`ConnectionManager::invalidate`] so a failure
/// seen on an old handle cannot tear down a newer one.
#[derive(Debug, Clone)]
pub struct Connected<H> {
    /// The driver handle.
    pub handle: H,
    /// Generation of `handle`.
    pub generation: u64,
}

struct Slot<H> {
    state: ConnectionState,
    handle: Option<H>,
    generation: u64,
    inflight: Option<ConnectAttempt>,
    closed: bool,
    connected_at: Option<Instant>,
    connect_attempts: u64,
    last_error: Option<String>,
}

struct Inner<D: Driver> {
    driver: D,
    config: ConnectionConfig,
    slot: Mutex<Slot<D::Handle>>,
    last_activity: Mutex<Option<Instant>>,
}

enum Step<H> {
    Probe(H, u64),
    Join(ConnectAttempt, bool),
}

/// Owns the single database handle and its lifecycle.
///
/// Any number of tasks may call [`ensure_connected`](Self::ensure_connected)
/// or [`acquire`](Self::acquire) concurrently. At most one connect attempt is
/// in flight at a time; everyone else waits for it and shares its result. The
/// attempt runs on its own task, so cancelling the caller that started it does
/// not strand the others.
pub struct ConnectionManager<D: Driver> {
    inner: Arc<Inner<D>>,
}

impl<D: Driver> Clone for ConnectionManager<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: Driver> ConnectionManager<D> {
    /// Creates a manager. No connection is made until the first caller asks.
    pub fn new(driver: D, config: ConnectionConfig) -> Self {
        #[cfg(feature = "metrics")]
        gauge!("dbgate_connection_ready", "connection" => config.name.clone()).set(0.0);

        Self {
            inner: Arc::new(Inner {
                driver,
                config,
                slot: Mutex::new(Slot {
                    state: ConnectionState::Uninitialized,
                    handle: None,
                    generation: 0,
                    inflight: None,
                    closed: false,
                    connected_at: None,
                    connect_attempts: 0,
                    last_error: None,
                }),
                last_activity: Mutex::new(None),
            }),
        }
    }

    /// Guarantees a live, verified connection.
    ///
    /// When Ready, a liveness probe is sent first; if it fails the handle is
    /// invalidated and a reconnect follows.
    pub async fn ensure_connected(&self) -> Result<(), ConnectError> {
        self.acquire().await.map(|_| ())
    }

    /// Like [`ensure_connected`](Self::ensure_connected), returning the handle.
    pub async fn acquire(&self) -> Result<Connected<D::Handle>, ConnectError> {
        loop {
            let step = {
                let mut slot = self.inner.slot.lock();
                if slot.closed {
                    return Err(ConnectError::Closed);
                }
                match (slot.state, slot.handle.clone(), slot.inflight.clone()) {
                    (ConnectionState::Ready, Some(handle), _) => Step::Probe(handle, slot.generation),
                    (ConnectionState::Connecting, _, Some(attempt)) => Step::Join(attempt, true),
                    _ => Step::Join(self.start_connect(&mut slot), false),
                }
            };

            match step {
                Step::Probe(handle, generation) => match self.inner.probe_handle(&handle).await {
                    Ok(()) => return Ok(Connected { handle, generation }),
                    Err(err) => {
                        self.inner.invalidate(generation, err.to_string());
                    }
                },
                Step::Join(attempt, joined) => {
                    if joined {
                        self.inner.emit(ConnectionEvent::Joined {
                            component_name: self.inner.config.name.clone(),
                            timestamp: std::time::Instant::now(),
                        });
                    }
                    let generation = attempt.await?;
                    let slot = self.inner.slot.lock();
                    if slot.state.is_ready() && slot.generation == generation {
                        if let Some(handle) = slot.handle.clone() {
                            return Ok(Connected { handle, generation });
                        }
                    }
                    // Invalidated between connecting and now; go around again.
                }
            }
        }
    }

    fn start_connect(&self, slot: &mut Slot<D::Handle>) -> ConnectAttempt {
        slot.state = ConnectionState::Connecting;

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move { inner.connect_loop().await });
        let weak = Arc::downgrade(&self.inner);
        let attempt = async move {
            match task.await {
                Ok(result) => result,
                Err(_) => {
                    if let Some(inner) = weak.upgrade() {
                        inner.abandon_connect();
                    }
                    Err(ConnectError::Aborted)
                }
            }
        }
        .boxed()
        .shared();

        slot.inflight = Some(attempt.clone());
        attempt
    }

    /// Marks the handle of `generation` invalid so the next caller reconnects.
    ///
    /// Returns false (and does nothing) if that generation is no longer current.
    pub fn invalidate(&self, generation: u64, reason: impl Into<String>) -> bool {
        self.inner.invalidate(generation, reason.into())
    }

    /// Records that a real operation just succeeded.
    pub fn record_success(&self) {
        *self.inner.last_activity.lock() = Some(Instant::now());
    }

    /// When a real operation last succeeded.
    pub fn last_activity(&self) -> Option<Instant> {
        *self.inner.last_activity.lock()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.inner.slot.lock().state
    }

    /// Snapshot for health reporting.
    pub fn status(&self) -> ConnectionStatus {
        let last_activity = self.last_activity();
        let slot = self.inner.slot.lock();
        ConnectionStatus {
            state: slot.state,
            generation: slot.generation,
            connected_at: slot.connected_at,
            last_activity,
            connect_attempts: slot.connect_attempts,
            last_error: slot.last_error.clone(),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    /// Returns the driver.
    pub fn driver(&self) -> &D {
        &self.inner.driver
    }

    /// Returns true once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.slot.lock().closed
    }

    /// Releases the handle and refuses all further callers.
    ///
    /// A connect attempt in flight is abandoned once it next checks in.
    pub async fn close(&self) {
        let (handle, was_open) = {
            let mut slot = self.inner.slot.lock();
            let was_open = !slot.closed;
            slot.closed = true;
            if slot.state == ConnectionState::Ready {
                slot.state = ConnectionState::Invalid;
            }
            (slot.handle.take(), was_open)
        };

        if let Some(handle) = handle {
            self.inner.driver.disconnect(handle).await;
        }

        if was_open {
            #[cfg(feature = "tracing")]
            tracing::info!(connection = %self.inner.config.name, "connection closed");
            #[cfg(feature = "metrics")]
            gauge!("dbgate_connection_ready", "connection" => self.inner.config.name.clone())
                .set(0.0);
            self.inner.emit(ConnectionEvent::Closed {
                component_name: self.inner.config.name.clone(),
                timestamp: std::time::Instant::now(),
            });
        }
    }
}

impl<D: Driver> Inner<D> {
    fn emit(&self, event: ConnectionEvent) {
        self.config.event_listeners.emit(&event);
    }

    async fn connect_loop(self: Arc<Self>) -> Result<u64, ConnectError> {
        let started = Instant::now();
        let name = &self.config.name;

        let stale = self.slot.lock().handle.take();
        if let Some(handle) = stale {
            self.driver.disconnect(handle).await;
        }

        let options = self.config.connect_options();
        let max_attempts = self.config.max_attempts;
        let mut attempt = 0u32;

        let last_error = loop {
            attempt += 1;
            {
                let mut slot = self.slot.lock();
                if slot.closed {
                    slot.state = ConnectionState::Invalid;
                    slot.inflight = None;
                    return Err(ConnectError::Closed);
                }
                slot.connect_attempts += 1;
            }

            self.emit(ConnectionEvent::ConnectAttempt {
                component_name: name.clone(),
                timestamp: std::time::Instant::now(),
                attempt,
            });
            #[cfg(feature = "metrics")]
            counter!("dbgate_connection_attempts_total", "connection" => name.clone()).increment(1);

            let error = match self.try_connect(&options).await {
                Ok(handle) => return self.install(handle, attempt, started).await,
                Err(error) => error,
            };

            #[cfg(feature = "tracing")]
            tracing::warn!(
                connection = %name,
                attempt,
                max_attempts,
                error = %error,
                "connect attempt failed"
            );
            #[cfg(feature = "metrics")]
            counter!("dbgate_connection_failures_total", "connection" => name.clone()).increment(1);
            self.emit(ConnectionEvent::ConnectFailed {
                component_name: name.clone(),
                timestamp: std::time::Instant::now(),
                attempt,
                error: error.to_string(),
            });

            if self.config.classifier.classify(&error) == ErrorClass::QuotaExhausted {
                self.give_up(&error);
                return Err(ConnectError::QuotaExhausted { source: error });
            }
            if attempt >= max_attempts {
                break error;
            }

            let delay = self.config.backoff.next_interval((attempt - 1) as usize);
            tokio::time::sleep(delay).await;
        };

        self.give_up(&last_error);
        #[cfg(feature = "tracing")]
        tracing::error!(connection = %name, attempts = attempt, error = %last_error, "giving up on connect");
        Err(ConnectError::Exhausted {
            attempts: attempt,
            source: last_error,
        })
    }

    async fn try_connect(
        &self,
        options: &crate::driver::ConnectOptions,
    ) -> Result<D::Handle, DriverError> {
        let timeout = self.config.connect_timeout;
        let handle = match tokio::time::timeout(timeout, self.driver.connect(options)).await {
            Ok(result) => result?,
            Err(_) => return Err(DriverError::timeout("connect", timeout)),
        };

        if let Err(err) = self.probe_handle(&handle).await {
            self.driver.disconnect(handle).await;
            return Err(err);
        }
        Ok(handle)
    }

    async fn probe_handle(&self, handle: &D::Handle) -> Result<(), DriverError> {
        let timeout = self.config.probe_timeout;
        match tokio::time::timeout(
            timeout,
            self.driver.run_query(handle, &self.config.probe_query),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(DriverError::timeout("liveness probe", timeout)),
        }
    }

    async fn install(
        &self,
        handle: D::Handle,
        attempts: u32,
        started: Instant,
    ) -> Result<u64, ConnectError> {
        let installed = {
            let mut slot = self.slot.lock();
            slot.inflight = None;
            if slot.closed {
                slot.state = ConnectionState::Invalid;
                Err(handle)
            } else {
                slot.generation += 1;
                slot.handle = Some(handle);
                slot.state = ConnectionState::Ready;
                slot.connected_at = Some(Instant::now());
                slot.last_error = None;
                Ok(slot.generation)
            }
        };

        let generation = match installed {
            Ok(generation) => generation,
            Err(handle) => {
                self.driver.disconnect(handle).await;
                return Err(ConnectError::Closed);
            }
        };

        let duration = started.elapsed();
        #[cfg(feature = "tracing")]
        tracing::info!(
            connection = %self.config.name,
            generation,
            attempts,
            duration_ms = duration.as_millis() as u64,
            "connected"
        );
        #[cfg(feature = "metrics")]
        {
            gauge!("dbgate_connection_ready", "connection" => self.config.name.clone()).set(1.0);
            histogram!("dbgate_connection_connect_duration_seconds", "connection" => self.config.name.clone())
                .record(duration.as_secs_f64());
        }
        self.emit(ConnectionEvent::Connected {
            component_name: self.config.name.clone(),
            timestamp: std::time::Instant::now(),
            generation,
            attempts,
            duration,
        });
        Ok(generation)
    }

    fn give_up(&self, error: &DriverError) {
        let mut slot = self.slot.lock();
        slot.state = ConnectionState::Invalid;
        slot.inflight = None;
        slot.last_error = Some(error.to_string());
    }

    fn abandon_connect(&self) {
        let mut slot = self.slot.lock();
        if slot.state == ConnectionState::Connecting {
            slot.state = ConnectionState::Invalid;
            slot.inflight = None;
        }
    }

    fn invalidate(&self, generation: u64, reason: String) -> bool {
        let invalidated = {
            let mut slot = self.slot.lock();
            if slot.state.is_ready() && slot.generation == generation {
                slot.state = ConnectionState::Invalid;
                slot.last_error = Some(reason.clone());
                true
            } else {
                false
            }
        };

        if invalidated {
            #[cfg(feature = "tracing")]
            tracing::warn!(connection = %self.config.name, generation, reason = %reason, "connection invalidated");
            #[cfg(feature = "metrics")]
            {
                counter!("dbgate_connection_invalidations_total", "connection" => self.config.name.clone())
                    .increment(1);
                gauge!("dbgate_connection_ready", "connection" => self.config.name.clone()).set(0.0);
            }
            self.emit(ConnectionEvent::Invalidated {
                component_name: self.config.name.clone(),
                timestamp: std::time::Instant::now(),
                generation,
                reason,
            });
        }
        invalidated
    }
}

impl<D: Driver> LivenessTarget for ConnectionManager<D> {
    fn last_activity(&self) -> Option<Instant> {
        ConnectionManager::last_activity(self)
    }

    async fn probe(&self) -> ProbeOutcome {
        let current = {
            let slot = self.inner.slot.lock();
            match (&slot.handle, slot.state) {
                (Some(handle), ConnectionState::Ready) if !slot.closed => {
                    Some((handle.clone(), slot.generation))
                }
                _ => None,
            }
        };
        let Some((handle, generation)) = current else {
            return ProbeOutcome::NotConnected;
        };

        match self.inner.probe_handle(&handle).await {
            Ok(()) => ProbeOutcome::Alive,
            Err(err) => {
                let reason = err.to_string();
                self.inner.invalidate(generation, reason.clone());
                ProbeOutcome::Dead(reason)
            }
        }
    }
}

impl<D: Driver> std::fmt::Debug for ConnectionManager<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("config", &self.inner.config)
            .field("state", &self.state())
            .finish()
    }
}

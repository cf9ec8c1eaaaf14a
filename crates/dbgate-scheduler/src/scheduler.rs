//! The scheduler itself: admission, slot hand-off and shutdown.

use crate::config::SchedulerConfig;
use crate::error::SchedulerError;
use crate::events::SchedulerEvent;
use crate::queue::{Admission, Waiter};
#[cfg(feature = "metrics")]
use metrics::{counter, gauge, histogram};
use parking_lot::Mutex;
use std::collections::BinaryHeap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch, Notify};
use tokio::time::Instant;

/// Point-in-time view of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Tasks currently holding a slot.
    pub active: usize,
    /// Tasks waiting for a slot.
    pub queued: usize,
    /// Slot count.
    pub max_concurrent: usize,
    /// How long the oldest queued task has been waiting.
    pub oldest_wait: Option<Duration>,
    /// Tasks accepted since creation.
    pub submitted: u64,
    /// Tasks that ran to completion, successfully or not.
    pub completed: u64,
    /// Tasks that gave up waiting for a slot.
    pub deadline_exceeded: u64,
    /// Tasks abandoned by shutdown.
    pub abandoned: u64,
    /// Whether shutdown has begun.
    pub closed: bool,
}

/// What [`QueryScheduler::shutdown`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Queued plus running tasks when shutdown began.
    pub pending: usize,
    /// Tasks that finished within the drain window.
    pub drained: usize,
    /// Queued tasks rejected when the window closed.
    pub abandoned_queued: usize,
    /// Running tasks signalled to stop when the window closed.
    pub abandoned_running: usize,
    /// Time spent in shutdown.
    pub elapsed: Duration,
    /// Whether the drain window closed before the scheduler went idle.
    pub timed_out: bool,
}

impl ShutdownReport {
    /// Total tasks that did not finish.
    pub fn abandoned(&self) -> usize {
        self.abandoned_queued + self.abandoned_running
    }
}

/// An execution slot. Dropping it hands the slot to the next queued task.
///
/// The permit is released on every exit path, including cancellation and
/// panics in the task that holds it.
#[must_use = "the slot is released as soon as the permit is dropped"]
pub struct SlotPermit {
    shared: Option<Arc<Shared>>,
}

impl SlotPermit {
    fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared: Some(shared),
        }
    }

    fn disarm(mut self) {
        self.shared = None;
    }
}

impl Drop for SlotPermit {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            shared.release();
        }
    }
}

impl std::fmt::Debug for SlotPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotPermit")
            .field("armed", &self.shared.is_some())
            .finish()
    }
}

struct State {
    queue: BinaryHeap<Waiter>,
    active: usize,
    next_seq: u64,
    closed: bool,
    depth_warned: bool,
    stall_alerted: bool,
    submitted: u64,
    completed: u64,
    deadline_exceeded: u64,
    abandoned: u64,
}

impl State {
    /// Drops entries whose caller stopped waiting.
    fn prune(&mut self) {
        if self.queue.iter().any(Waiter::is_gone) {
            self.queue.retain(|w| !w.is_gone());
        }
    }

    fn oldest_enqueued(&self) -> Option<Instant> {
        self.queue.iter().map(|w| w.enqueued_at).min()
    }
}

struct Shared {
    config: SchedulerConfig,
    state: Mutex<State>,
    idle: Notify,
    abandon: watch::Sender<bool>,
}

impl Shared {
    /// Gives a freed slot to the best live waiter, or returns it to the pool.
    ///
    /// Invariant: a live waiter exists only while every slot is taken, so a
    /// slot is never idle while work is queued.
    fn release(self: Arc<Self>) {
        loop {
            let waiter = {
                let mut state = self.state.lock();
                let next = loop {
                    match state.queue.pop() {
                        Some(w) if w.is_gone() => continue,
                        other => break other,
                    }
                };
                match next {
                    Some(waiter) => {
                        self.rearm(&mut state);
                        self.record_gauges(&state);
                        waiter
                    }
                    None => {
                        state.active = state.active.saturating_sub(1);
                        state.depth_warned = false;
                        state.stall_alerted = false;
                        let idle = state.closed && state.active == 0;
                        self.record_gauges(&state);
                        drop(state);
                        if idle {
                            self.idle.notify_waiters();
                        }
                        return;
                    }
                }
            };

            match waiter.tx.send(Ok(SlotPermit::new(Arc::clone(&self)))) {
                Ok(()) => return,
                Err(returned) => {
                    // the waiter left between pop and send; try the next one
                    if let Ok(permit) = returned {
                        permit.disarm();
                    }
                }
            }
        }
    }

    fn rearm(&self, state: &mut State) {
        if state.queue.len() <= self.config.queue_warn_depth {
            state.depth_warned = false;
        }
        let fresh = state
            .oldest_enqueued()
            .map_or(true, |at| at.elapsed() < self.config.stall_threshold);
        if fresh {
            state.stall_alerted = false;
        }
    }

    fn check_stall(&self) {
        let event = {
            let mut state = self.state.lock();
            state.prune();
            let Some(oldest) = state.oldest_enqueued() else {
                return;
            };
            let oldest_wait = oldest.elapsed();
            if state.stall_alerted || oldest_wait < self.config.stall_threshold {
                return;
            }
            state.stall_alerted = true;
            SchedulerEvent::Stalled {
                component_name: self.config.name.clone(),
                timestamp: std::time::Instant::now(),
                oldest_wait,
                depth: state.queue.len(),
                active: state.active,
            }
        };

        #[cfg(feature = "metrics")]
        counter!("dbgate_scheduler_stall_alerts_total", "scheduler" => self.config.name.clone())
            .increment(1);

        self.publish(event);
    }

    #[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
    fn record_gauges(&self, state: &State) {
        #[cfg(feature = "metrics")]
        {
            gauge!("dbgate_scheduler_active", "scheduler" => self.config.name.clone())
                .set(state.active as f64);
            gauge!("dbgate_scheduler_queue_depth", "scheduler" => self.config.name.clone())
                .set(state.queue.len() as f64);
        }
    }

    fn publish(&self, event: SchedulerEvent) {
        #[cfg(feature = "tracing")]
        match &event {
            SchedulerEvent::Backpressure {
                depth, threshold, ..
            } => {
                tracing::warn!(
                    scheduler = %self.config.name,
                    depth,
                    threshold,
                    "query queue is backing up"
                );
            }
            SchedulerEvent::Stalled {
                oldest_wait,
                depth,
                active,
                ..
            } => {
                tracing::warn!(
                    scheduler = %self.config.name,
                    oldest_wait_ms = oldest_wait.as_millis() as u64,
                    depth,
                    active,
                    "queued queries are not making progress"
                );
            }
            _ => {}
        }

        self.config.event_listeners.emit(&event);
    }
}

/// Runs async tasks with at most `max_concurrent` in flight.
///
/// Tasks that cannot start immediately wait in a priority queue: a higher
/// priority is served first, equal priorities in submission order. A task
/// runs exactly once; its result or error goes straight back to its caller.
///
/// # Examples
///
/// ```rust
/// use dbgate_scheduler::{QueryScheduler, SchedulerConfig, SchedulerError};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let scheduler = SchedulerConfig::builder().max_concurrent(4).build();
///
/// let rows = scheduler
///     .submit(0, || async { Ok::<_, SchedulerError>(42) })
///     .await
///     .unwrap();
/// assert_eq!(rows, 42);
/// # }
/// ```
#[derive(Clone)]
pub struct QueryScheduler {
    shared: Arc<Shared>,
}

impl QueryScheduler {
    /// Creates a scheduler from a configuration.
    pub fn new(config: SchedulerConfig) -> Self {
        let (abandon, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(State {
                    queue: BinaryHeap::new(),
                    active: 0,
                    next_seq: 0,
                    closed: false,
                    depth_warned: false,
                    stall_alerted: false,
                    submitted: 0,
                    completed: 0,
                    deadline_exceeded: 0,
                    abandoned: 0,
                }),
                idle: Notify::new(),
                abandon,
            }),
        }
    }

    /// Creates a scheduler with default settings (25 slots).
    pub fn with_defaults() -> Self {
        SchedulerConfig::builder().build()
    }

    /// Returns the scheduler's configuration.
    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }

    /// Queues `task` at `priority` and runs it once a slot is free.
    ///
    /// The task's own error is returned unchanged. Scheduler failures
    /// (shutdown, abandonment) are converted through `E: From<SchedulerError>`.
    pub async fn submit<T, E, F, Fut>(&self, priority: i32, task: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<SchedulerError>,
    {
        let permit = self.admit(priority, None).await?;
        self.run(permit, task).await
    }

    /// Like [`submit`](Self::submit), but the whole call (waiting for a slot
    /// and running the task) must finish within `deadline`.
    ///
    /// A task that gave up while queued is removed from the queue and never
    /// runs. A task still running at the deadline is dropped and its slot
    /// released.
    pub async fn submit_with_deadline<T, E, F, Fut>(
        &self,
        priority: i32,
        deadline: Duration,
        task: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<SchedulerError>,
    {
        let started = Instant::now();
        let permit = self.admit(priority, Some(deadline)).await?;
        let left = deadline.saturating_sub(started.elapsed());
        match tokio::time::timeout(left, self.run(permit, task)).await {
            Ok(result) => result,
            Err(_) => Err(self
                .deadline_exceeded(priority, started.elapsed(), true)
                .into()),
        }
    }

    /// Waits for a slot without attaching a task.
    ///
    /// The slot is held until the permit is dropped. Work done under a
    /// bare permit is not interrupted by shutdown.
    pub async fn acquire(&self, priority: i32) -> Result<SlotPermit, SchedulerError> {
        self.admit(priority, None).await
    }

    /// Current counters.
    pub fn stats(&self) -> SchedulerStats {
        let mut state = self.shared.state.lock();
        state.prune();
        SchedulerStats {
            active: state.active,
            queued: state.queue.len(),
            max_concurrent: self.shared.config.max_concurrent,
            oldest_wait: state.oldest_enqueued().map(|at| at.elapsed()),
            submitted: state.submitted,
            completed: state.completed,
            deadline_exceeded: state.deadline_exceeded,
            abandoned: state.abandoned,
            closed: state.closed,
        }
    }

    /// Whether shutdown has begun.
    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Stops accepting work and drains what is pending.
    ///
    /// Queued and running tasks get up to `drain_timeout` to finish. When the
    /// window closes, queued tasks are rejected with
    /// [`SchedulerError::Abandoned`] and running tasks are signalled to stop
    /// with the same error. Calling it again is harmless.
    pub async fn shutdown(&self, drain_timeout: Duration) -> ShutdownReport {
        let started = Instant::now();
        let pending = {
            let mut state = self.shared.state.lock();
            state.closed = true;
            state.prune();
            state.active + state.queue.len()
        };

        #[cfg(feature = "tracing")]
        tracing::info!(
            scheduler = %self.shared.config.name,
            pending,
            drain_timeout_ms = drain_timeout.as_millis() as u64,
            "scheduler shutting down"
        );

        let drained_in_time = tokio::time::timeout(drain_timeout, self.wait_idle())
            .await
            .is_ok();

        let (waiters, running) = if drained_in_time {
            (Vec::new(), 0)
        } else {
            let mut state = self.shared.state.lock();
            let waiters: Vec<Waiter> = state.queue.drain().collect();
            (waiters, state.active)
        };

        let mut abandoned_queued = 0;
        for waiter in waiters {
            if waiter.tx.send(Err(SchedulerError::Abandoned)).is_ok() {
                abandoned_queued += 1;
            }
        }
        if running > 0 {
            self.shared.abandon.send_replace(true);
        }

        {
            let mut state = self.shared.state.lock();
            state.abandoned += (abandoned_queued + running) as u64;
            self.shared.record_gauges(&state);
        }

        let report = ShutdownReport {
            pending,
            drained: pending.saturating_sub(abandoned_queued + running),
            abandoned_queued,
            abandoned_running: running,
            elapsed: started.elapsed(),
            timed_out: !drained_in_time,
        };

        #[cfg(feature = "metrics")]
        counter!("dbgate_scheduler_abandoned_total", "scheduler" => self.shared.config.name.clone())
            .increment(report.abandoned() as u64);

        #[cfg(feature = "tracing")]
        if report.timed_out {
            tracing::warn!(
                scheduler = %self.shared.config.name,
                drained = report.drained,
                abandoned_queued,
                abandoned_running = running,
                "drain window closed with work outstanding"
            );
        } else {
            tracing::info!(
                scheduler = %self.shared.config.name,
                drained = report.drained,
                "scheduler drained"
            );
        }

        self.shared.publish(SchedulerEvent::ShutdownCompleted {
            component_name: self.shared.config.name.clone(),
            timestamp: std::time::Instant::now(),
            report,
        });

        report
    }

    async fn admit(
        &self,
        priority: i32,
        deadline: Option<Duration>,
    ) -> Result<SlotPermit, SchedulerError> {
        let shared = &self.shared;
        let config = &shared.config;
        let started = Instant::now();
        let mut alerts = Vec::new();

        let rx = {
            let mut state = shared.state.lock();
            if state.closed {
                return Err(SchedulerError::Shutdown);
            }
            state.submitted += 1;

            #[cfg(feature = "metrics")]
            counter!("dbgate_scheduler_submitted_total", "scheduler" => config.name.clone())
                .increment(1);

            if state.active < config.max_concurrent {
                state.active += 1;
                let active = state.active;
                shared.record_gauges(&state);
                drop(state);
                self.admitted(priority, Duration::ZERO, active);
                return Ok(SlotPermit::new(Arc::clone(shared)));
            }

            let (tx, rx) = oneshot::channel();
            let seq = state.next_seq;
            state.next_seq += 1;
            state.queue.push(Waiter {
                priority,
                seq,
                enqueued_at: started,
                tx,
            });

            if state.queue.len() > config.queue_warn_depth && !state.depth_warned {
                state.prune();
                if state.queue.len() > config.queue_warn_depth {
                    state.depth_warned = true;
                    alerts.push(SchedulerEvent::Backpressure {
                        component_name: config.name.clone(),
                        timestamp: std::time::Instant::now(),
                        depth: state.queue.len(),
                        threshold: config.queue_warn_depth,
                    });
                }
            }

            alerts.insert(
                0,
                SchedulerEvent::Queued {
                    component_name: config.name.clone(),
                    timestamp: std::time::Instant::now(),
                    priority,
                    depth: state.queue.len(),
                },
            );
            shared.record_gauges(&state);
            rx
        };

        for alert in alerts {
            #[cfg(feature = "metrics")]
            if matches!(alert, SchedulerEvent::Backpressure { .. }) {
                counter!("dbgate_scheduler_backpressure_warnings_total", "scheduler" => config.name.clone())
                    .increment(1);
            }
            shared.publish(alert);
        }

        let admission = match deadline {
            Some(limit) => match tokio::time::timeout(limit, self.wait_for_slot(rx)).await {
                Ok(admission) => admission,
                Err(_) => return Err(self.deadline_exceeded(priority, started.elapsed(), false)),
            },
            None => self.wait_for_slot(rx).await,
        };

        let permit = admission?;
        let active = shared.state.lock().active;
        self.admitted(priority, started.elapsed(), active);
        Ok(permit)
    }

    async fn wait_for_slot(&self, mut rx: oneshot::Receiver<Admission>) -> Admission {
        let threshold = self.shared.config.stall_threshold;
        if threshold.is_zero() {
            return rx.await.unwrap_or(Err(SchedulerError::Shutdown));
        }
        loop {
            match tokio::time::timeout(threshold, &mut rx).await {
                Ok(Ok(admission)) => return admission,
                Ok(Err(_)) => return Err(SchedulerError::Shutdown),
                Err(_) => self.shared.check_stall(),
            }
        }
    }

    fn admitted(&self, priority: i32, waited: Duration, active: usize) {
        #[cfg(feature = "metrics")]
        histogram!("dbgate_scheduler_wait_seconds", "scheduler" => self.shared.config.name.clone())
            .record(waited.as_secs_f64());

        self.shared.publish(SchedulerEvent::Admitted {
            component_name: self.shared.config.name.clone(),
            timestamp: std::time::Instant::now(),
            priority,
            waited,
            active,
        });
    }

    fn deadline_exceeded(&self, priority: i32, waited: Duration, running: bool) -> SchedulerError {
        let shared = &self.shared;
        {
            let mut state = shared.state.lock();
            state.deadline_exceeded += 1;
            state.prune();
            shared.record_gauges(&state);
        }

        #[cfg(feature = "metrics")]
        counter!("dbgate_scheduler_deadline_exceeded_total", "scheduler" => shared.config.name.clone())
            .increment(1);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            scheduler = %shared.config.name,
            priority,
            running,
            waited_ms = waited.as_millis() as u64,
            "call deadline expired"
        );
        #[cfg(not(feature = "tracing"))]
        let _ = running;

        shared.publish(SchedulerEvent::DeadlineExceeded {
            component_name: shared.config.name.clone(),
            timestamp: std::time::Instant::now(),
            priority,
            waited,
        });
        SchedulerError::DeadlineExceeded { waited }
    }

    async fn run<T, E, F, Fut>(&self, permit: SlotPermit, task: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<SchedulerError>,
    {
        let mut abandon = self.shared.abandon.subscribe();
        let outcome = tokio::select! {
            biased;
            result = task() => Some(result),
            _ = abandoned(&mut abandon) => None,
        };

        match outcome {
            Some(result) => {
                self.shared.state.lock().completed += 1;
                drop(permit);
                result
            }
            None => {
                drop(permit);
                Err(SchedulerError::Abandoned.into())
            }
        }
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.shared.state.lock().active == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Default for QueryScheduler {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for QueryScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryScheduler")
            .field("config", &self.shared.config)
            .field("stats", &self.stats())
            .finish()
    }
}

async fn abandoned(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|flag| *flag).await.is_err() {
        std::future::pending::<()>().await;
    }
}

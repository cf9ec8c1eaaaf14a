use crate::ShutdownReport;
use dbgate_core::events::GateEvent;
use std::time::{Duration, Instant};

/// Events emitted by the query scheduler.
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    /// No slot was free; the task joined the queue.
    Queued {
        component_name: String,
        timestamp: Instant,
        priority: i32,
        depth: usize,
    },
    /// The task was granted a slot.
    Admitted {
        component_name: String,
        timestamp: Instant,
        priority: i32,
        waited: Duration,
        active: usize,
    },
    /// Queue depth crossed the warning threshold.
    Backpressure {
        component_name: String,
        timestamp: Instant,
        depth: usize,
        threshold: usize,
    },
    /// The oldest queued task has waited longer than the stall threshold.
    Stalled {
        component_name: String,
        timestamp: Instant,
        oldest_wait: Duration,
        depth: usize,
        active: usize,
    },
    /// A call hit its deadline, queued or running.
    DeadlineExceeded {
        component_name: String,
        timestamp: Instant,
        priority: i32,
        waited: Duration,
    },
    /// Shutdown finished.
    ShutdownCompleted {
        component_name: String,
        timestamp: Instant,
        report: ShutdownReport,
    },
}

impl GateEvent for SchedulerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SchedulerEvent::Queued { .. } => "queued",
            SchedulerEvent::Admitted { .. } => "admitted",
            SchedulerEvent::Backpressure { .. } => "backpressure",
            SchedulerEvent::Stalled { .. } => "stalled",
            SchedulerEvent::DeadlineExceeded { .. } => "deadline_exceeded",
            SchedulerEvent::ShutdownCompleted { .. } => "shutdown_completed",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            SchedulerEvent::Queued { timestamp, .. }
            | SchedulerEvent::Admitted { timestamp, .. }
            | SchedulerEvent::Backpressure { timestamp, .. }
            | SchedulerEvent::Stalled { timestamp, .. }
            | SchedulerEvent::DeadlineExceeded { timestamp, .. }
            | SchedulerEvent::ShutdownCompleted { timestamp, .. } => *timestamp,
        }
    }

    fn component_name(&self) -> &str {
        match self {
            SchedulerEvent::Queued { component_name, .. }
            | SchedulerEvent::Admitted { component_name, .. }
            | SchedulerEvent::Backpressure { component_name, .. }
            | SchedulerEvent::Stalled { component_name, .. }
            | SchedulerEvent::DeadlineExceeded { component_name, .. }
            | SchedulerEvent::ShutdownCompleted { component_name, .. } => component_name,
        }
    }
}

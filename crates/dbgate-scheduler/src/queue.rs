//! Priority queue entries.

use crate::error::SchedulerError;
use crate::scheduler::SlotPermit;
use std::cmp::Ordering;
use tokio::sync::oneshot;
use tokio::time::Instant;

pub(crate) type Admission = Result<SlotPermit, SchedulerError>;

/// A task waiting for a slot.
///
/// Ordered so that `BinaryHeap::pop` yields the highest priority first and,
/// among equal priorities, the earliest submission.
pub(crate) struct Waiter {
    pub(crate) priority: i32,
    pub(crate) seq: u64,
    pub(crate) enqueued_at: Instant,
    pub(crate) tx: oneshot::Sender<Admission>,
}

impl Waiter {
    /// The waiting side went away (cancelled or deadline expired).
    pub(crate) fn is_gone(&self) -> bool {
        self.tx.is_closed()
    }
}

impl PartialEq for Waiter {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for Waiter {}

impl PartialOrd for Waiter {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Waiter {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

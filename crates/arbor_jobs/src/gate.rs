//! Priority eligibility.

use crate::{JobRecord, WorkerSpec};
use std::sync::atomic::{AtomicBool, Ordering};

/// Decides whether a worker may run a job right now
pub trait PriorityGate: Send + Sync {
    /// True while the worker holds a working priority for the job
    fn has_working_priority(&self, worker: &WorkerSpec, job: &JobRecord) -> bool;
}

/// Eligible while the job is live and the worker's priority is at or
/// below the job's threshold
#[derive(Debug, Clone, Copy, Default)]
pub struct ThresholdGate;

impl PriorityGate for ThresholdGate {
    fn has_working_priority(&self, worker: &WorkerSpec, job: &JobRecord) -> bool {
        !job.status.is_terminal() && worker.priority <= job.priority
    }
}

/// Gate with an externally set answer
#[derive(Debug, Default)]
pub struct FixedGate {
    open: AtomicBool,
}

impl FixedGate {
    /// Create a gate that starts open or closed
    #[must_use]
    pub fn new(open: bool) -> Self {
        Self {
            open: AtomicBool::new(open),
        }
    }

    /// Open or close the gate
    pub fn set(&self, open: bool) {
        self.open.store(open, Ordering::SeqCst);
    }
}

impl PriorityGate for FixedGate {
    fn has_working_priority(&self, _worker: &WorkerSpec, _job: &JobRecord) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

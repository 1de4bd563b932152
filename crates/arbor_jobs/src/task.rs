//! What a worker runs.

use crate::{JobRecord, WorkerSpec};
use arbor_core::{CoreResult, join_path, parent_path};
use arbor_store::LocalStore;

/// Result of one work iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkOutcome {
    /// Keep the job running; work again next tick
    Continue,
    /// The job is complete
    Done,
    /// The job cannot complete
    Failed(String),
}

/// Everything a task sees during one iteration
#[derive(Clone, Copy)]
pub struct WorkContext<'a> {
    /// The component's store
    pub store: &'a LocalStore,
    /// The worker running the task
    pub worker: &'a WorkerSpec,
    /// Path of the job record
    pub job_path: &'a str,
    /// The job as read at the start of this iteration
    pub job: &'a JobRecord,
}

impl WorkContext<'_> {
    /// Output location of the job
    #[must_use]
    pub fn output_path(&self) -> &str {
        &self.job.output_path
    }

    /// Path of a named entry below the output location
    #[must_use]
    pub fn output(&self, name: &str) -> String {
        join_path(&self.job.output_path, name)
    }
}

/// Work bound to a job
pub trait WorkerTask: Send + Sync {
    /// Can the job run right now? The default requires an output path
    /// whose parent already exists in the store.
    fn check_job(&self, ctx: &WorkContext<'_>) -> bool {
        output_parent_exists(ctx)
    }

    /// One iteration: read inputs, compute, write results
    ///
    /// # Errors
    ///
    /// `NotFound` and `PreconditionNotMet` are retried next tick; any other
    /// error fails the job
    fn work(&self, ctx: &WorkContext<'_>) -> CoreResult<WorkOutcome>;
}

/// The job names an absolute output path whose parent is in the store
#[must_use]
pub fn output_parent_exists(ctx: &WorkContext<'_>) -> bool {
    let output = ctx.output_path();
    if !output.starts_with('/') {
        return false;
    }
    parent_path(output).is_some_and(|parent| ctx.store.has(&parent))
}

type WorkFn = dyn Fn(&WorkContext<'_>) -> CoreResult<WorkOutcome> + Send + Sync;
type CheckFn = dyn Fn(&WorkContext<'_>) -> bool + Send + Sync;

/// Task built from closures
pub struct FnTask {
    work: Box<WorkFn>,
    check: Option<Box<CheckFn>>,
}

impl FnTask {
    /// Wrap a work closure, keeping the default precondition
    pub fn new<F>(work: F) -> Self
    where
        F: Fn(&WorkContext<'_>) -> CoreResult<WorkOutcome> + Send + Sync + 'static,
    {
        Self {
            work: Box::new(work),
            check: None,
        }
    }

    /// Replace the precondition
    #[must_use]
    pub fn with_check<C>(mut self, check: C) -> Self
    where
        C: Fn(&WorkContext<'_>) -> bool + Send + Sync + 'static,
    {
        self.check = Some(Box::new(check));
        self
    }
}

impl WorkerTask for FnTask {
    fn check_job(&self, ctx: &WorkContext<'_>) -> bool {
        match &self.check {
            Some(check) => check(ctx),
            None => output_parent_exists(ctx),
        }
    }

    fn work(&self, ctx: &WorkContext<'_>) -> CoreResult<WorkOutcome> {
        (self.work)(ctx)
    }
}

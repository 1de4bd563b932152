//! Priority-gated job execution.
//!
//! A worker owns one job path. Every poll interval it reads the job,
//! checks the task's precondition and the priority gate, and runs one
//! work iteration when both allow. The first eligible worker to run an
//! ISSUED job promotes it to RUNNING; `Done` and `Failed` outcomes write
//! the terminal status. Changes to the job record wake the worker early
//! to re-check, but work only ever runs on a tick.

use crate::record::field;
use crate::{
    JobRecord, JobStatus, PriorityGate, Request, ThresholdGate, WorkContext, WorkOutcome,
    WorkerTask,
};
use arbor_core::{CoreError, MIN_PERIOD, Node, Pattern, join_path};
use arbor_store::LocalStore;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Default poll interval
pub const DEFAULT_POLL: Duration = Duration::from_secs(1);

/// Worker errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkerError {
    /// The job status could not be written
    #[error("Cannot update job {path}: {reason}")]
    StatusWrite {
        /// Job path
        path: String,
        /// Store error
        reason: String,
    },

    /// The worker task panicked or was aborted
    #[error("Worker task ended abnormally: {0}")]
    Aborted(String),
}

impl From<WorkerError> for CoreError {
    fn from(err: WorkerError) -> Self {
        CoreError::Internal {
            message: err.to_string(),
        }
    }
}

/// Identity and scheduling parameters of a worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSpec {
    /// Worker name
    pub name: String,
    /// Service type the worker provides
    pub service_type: String,
    /// Component hosting the worker
    pub component: String,
    /// Assigned priority; lower values win
    pub priority: i32,
    /// Job record this worker is bound to
    pub job_path: String,
    /// Time between polls
    pub poll_interval: Duration,
}

impl WorkerSpec {
    /// Create a spec with priority 0 and the default poll interval
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        service_type: impl Into<String>,
        job_path: impl Into<String>,
    ) -> Self {
        let name = name.into();
        Self {
            component: name.clone(),
            name,
            service_type: service_type.into(),
            priority: 0,
            job_path: job_path.into(),
            poll_interval: DEFAULT_POLL,
        }
    }

    /// Set the hosting component
    #[must_use]
    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = component.into();
        self
    }

    /// Set the priority
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the poll interval, at least [`MIN_PERIOD`]
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(MIN_PERIOD);
        self
    }
}

/// Observable worker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// No runnable job: absent, malformed, stopped or precondition unmet
    Idle,
    /// Job runnable but the priority gate is closed
    Waiting,
    /// Working on the job
    Running,
    /// The job reached a terminal status
    Finished,
}

/// What one poll did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick {
    /// Nothing to run, with the reason
    Idle(String),
    /// Runnable but not eligible
    Waiting,
    /// One work iteration ran
    Worked(WorkOutcome),
    /// The job is already Done or Failed
    Finished(JobStatus),
}

impl Tick {
    /// Worker state after this poll
    #[must_use]
    pub fn state(&self) -> WorkerState {
        match self {
            Tick::Idle(_) => WorkerState::Idle,
            Tick::Waiting => WorkerState::Waiting,
            Tick::Worked(WorkOutcome::Continue) => WorkerState::Running,
            Tick::Worked(_) | Tick::Finished(_) => WorkerState::Finished,
        }
    }
}

/// A task bound to a job
pub struct Worker {
    spec: WorkerSpec,
    store: Arc<LocalStore>,
    task: Arc<dyn WorkerTask>,
    gate: Arc<dyn PriorityGate>,
    state: watch::Sender<WorkerState>,
    iterations: Arc<AtomicU64>,
    wake: Arc<Notify>,
}

impl Worker {
    /// Bind `task` to the job named in `spec`, gated by [`ThresholdGate`]
    pub fn new(spec: WorkerSpec, store: Arc<LocalStore>, task: impl WorkerTask + 'static) -> Self {
        Self::from_parts(spec, store, Arc::new(task))
    }

    /// Bind a shared task
    #[must_use]
    pub fn from_parts(spec: WorkerSpec, store: Arc<LocalStore>, task: Arc<dyn WorkerTask>) -> Self {
        let (state, _) = watch::channel(WorkerState::Idle);
        Self {
            spec,
            store,
            task,
            gate: Arc::new(ThresholdGate),
            state,
            iterations: Arc::new(AtomicU64::new(0)),
            wake: Arc::new(Notify::new()),
        }
    }

    /// Replace the priority gate
    #[must_use]
    pub fn with_gate(mut self, gate: Arc<dyn PriorityGate>) -> Self {
        self.gate = gate;
        self
    }

    /// Worker parameters
    #[must_use]
    pub fn spec(&self) -> &WorkerSpec {
        &self.spec
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Work iterations run so far
    #[must_use]
    pub fn iterations(&self) -> u64 {
        self.iterations.load(Ordering::Relaxed)
    }

    /// One poll: read the job, check it, and run one iteration if eligible
    ///
    /// # Errors
    ///
    /// Returns `StatusWrite` if a status transition cannot be stored
    pub fn tick(&self) -> Result<Tick, WorkerError> {
        let mut job = match self.assess() {
            Ok(job) => job,
            Err(idle) => {
                self.set_state(idle.state());
                return Ok(idle);
            }
        };

        if job.status == JobStatus::Issued {
            self.write_status(JobStatus::Running)?;
            job.status = JobStatus::Running;
            info!(worker = %self.spec.name, job = %self.spec.job_path, "job promoted to RUNNING");
        }

        let ctx = WorkContext {
            store: &self.store,
            worker: &self.spec,
            job_path: &self.spec.job_path,
            job: &job,
        };
        let outcome = match self.task.work(&ctx) {
            Ok(outcome) => outcome,
            Err(e) if e.is_recoverable() => {
                debug!(worker = %self.spec.name, error = %e, "work input not ready");
                WorkOutcome::Continue
            }
            Err(e) => WorkOutcome::Failed(e.to_string()),
        };
        self.iterations.fetch_add(1, Ordering::Relaxed);

        match &outcome {
            WorkOutcome::Continue => {}
            WorkOutcome::Done => {
                self.write_status(JobStatus::Done)?;
                info!(worker = %self.spec.name, job = %self.spec.job_path, "job done");
            }
            WorkOutcome::Failed(reason) => {
                self.write_status(JobStatus::Failed)?;
                warn!(worker = %self.spec.name, job = %self.spec.job_path, %reason, "job failed");
            }
        }

        let tick = Tick::Worked(outcome);
        self.set_state(tick.state());
        Ok(tick)
    }

    /// Run ticks on the poll interval until cancelled
    pub fn spawn(self, cancel: CancellationToken) -> WorkerHandle {
        let worker = Arc::new(self);
        let state = worker.state.subscribe();
        let iterations = Arc::clone(&worker.iterations);

        let wake = Arc::clone(&worker.wake);
        match Pattern::parse(&join_path(&worker.spec.job_path, "*")) {
            Ok(pattern) => worker.store.register_callback(pattern, move |_| wake.notify_one()),
            Err(e) => warn!(worker = %worker.spec.name, error = %e, "job path cannot be watched"),
        }

        let task = tokio::spawn(async move {
            info!(
                worker = %worker.spec.name,
                job = %worker.spec.job_path,
                priority = worker.spec.priority,
                "worker started"
            );
            let mut ticker = tokio::time::interval(worker.spec.poll_interval.max(MIN_PERIOD));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = worker.tick() {
                            error!(worker = %worker.spec.name, error = %e, "worker tick failed");
                        }
                    }
                    () = worker.wake.notified() => {
                        if let Err(idle) = worker.assess() {
                            worker.set_state(idle.state());
                        }
                    }
                }
            }
            debug!(worker = %worker.spec.name, "worker stopped");
        });

        WorkerHandle {
            state,
            iterations,
            task,
        }
    }

    fn assess(&self) -> Result<JobRecord, Tick> {
        let node = self
            .store
            .get_copy(&self.spec.job_path)
            .map_err(|_| Tick::Idle("no job record".to_string()))?;
        let job = JobRecord::from_node(&node).map_err(|e| Tick::Idle(e.to_string()))?;

        if job.status.is_terminal() {
            return Err(Tick::Finished(job.status));
        }
        if job.request == Request::Stop {
            return Err(Tick::Idle("stop requested".to_string()));
        }

        let ctx = WorkContext {
            store: &self.store,
            worker: &self.spec,
            job_path: &self.spec.job_path,
            job: &job,
        };
        if !self.task.check_job(&ctx) {
            return Err(Tick::Idle("precondition not met".to_string()));
        }
        if !self.gate.has_working_priority(&self.spec, &job) {
            return Err(Tick::Waiting);
        }
        Ok(job)
    }

    fn write_status(&self, status: JobStatus) -> Result<(), WorkerError> {
        let path = join_path(&self.spec.job_path, field::STATUS);
        self.store
            .put(Node::str(field::STATUS, status.as_str()), &path)
            .map_err(|e| WorkerError::StatusWrite {
                path: self.spec.job_path.clone(),
                reason: e.to_string(),
            })
    }

    fn set_state(&self, next: WorkerState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        if changed {
            debug!(worker = %self.spec.name, state = ?next, "worker state changed");
        }
    }
}

/// Handle to a spawned worker
pub struct WorkerHandle {
    state: watch::Receiver<WorkerState>,
    iterations: Arc<AtomicU64>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Current state
    #[must_use]
    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Wait until the worker reaches `state`
    ///
    /// # Errors
    ///
    /// Returns `Aborted` if the worker stopped first
    pub async fn wait_for(&mut self, state: WorkerState) -> Result<(), WorkerError> {
        self.state
            .wait_for(|s| *s == state)
            .await
            .map(|_| ())
            .map_err(|e| WorkerError::Aborted(e.to_string()))
    }

    /// Work iterations run so far
    #[must_use]
    pub fn iterations(&self) -> u64 {
        self.iterations.load(Ordering::Relaxed)
    }

    /// Wait for the worker task to finish after cancellation
    ///
    /// # Errors
    ///
    /// Returns `Aborted` if the task panicked
    pub async fn join(self) -> Result<(), WorkerError> {
        self.task.await.map_err(|e| WorkerError::Aborted(e.to_string()))
    }
}

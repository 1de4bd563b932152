//! ARBOR Jobs
//!
//! Jobs are dictionaries under `/jobs/<name>` describing requested work:
//! who asked, which service type should do it, its status and priority,
//! and where results go. A [`Worker`] binds one task to one job and runs
//! it on a fixed poll interval while its [`PriorityGate`] allows. The
//! [`JobDispatcher`] of the requesting component keeps each job's
//! priority threshold in line with the live candidates.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod counter;
pub mod dispatcher;
pub mod gate;
pub mod record;
pub mod task;
pub mod worker;

pub use counter::CounterTask;
pub use dispatcher::JobDispatcher;
pub use gate::{FixedGate, PriorityGate, ThresholdGate};
pub use record::{JOBS_ROOT, JobRecord, JobStatus, Request, ensure_job};
pub use task::{FnTask, WorkContext, WorkOutcome, WorkerTask};
pub use worker::{Tick, Worker, WorkerError, WorkerHandle, WorkerSpec, WorkerState};

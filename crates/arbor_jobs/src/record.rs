//! Job records and their tree form.

use arbor_core::{CoreError, CoreResult, Node};
use arbor_store::LocalStore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::info;

/// Subtree holding every job
pub const JOBS_ROOT: &str = "/jobs";

/// Lifecycle of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    /// Created, no worker has picked it up
    Issued,
    /// A worker is executing it
    Running,
    /// Completed
    Done,
    /// Abandoned by its worker
    Failed,
}

impl JobStatus {
    /// Stored spelling
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Issued => "ISSUED",
            JobStatus::Running => "RUNNING",
            JobStatus::Done => "DONE",
            JobStatus::Failed => "FAILED",
        }
    }

    /// Done or Failed
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ISSUED" => Ok(JobStatus::Issued),
            "RUNNING" => Ok(JobStatus::Running),
            "DONE" => Ok(JobStatus::Done),
            "FAILED" => Ok(JobStatus::Failed),
            other => Err(CoreError::malformed("job status", format!("'{}'", other))),
        }
    }
}

/// What the requester wants done with a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Request {
    /// Run it
    Start,
    /// Stop running it
    Stop,
}

impl Request {
    /// Stored spelling
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Request::Start => "START",
            Request::Stop => "STOP",
        }
    }
}

impl FromStr for Request {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "START" => Ok(Request::Start),
            "STOP" => Ok(Request::Stop),
            other => Err(CoreError::malformed("job request", format!("'{}'", other))),
        }
    }
}

/// Field names of the tree form
pub mod field {
    /// Component that created the job
    pub const REQUESTING_SERVICE_NAME: &str = "requesting_service_name";
    /// Service type expected to run it
    pub const REQUESTED_SERVICE_TYPE: &str = "requested_service_type";
    /// START or STOP
    pub const REQUEST: &str = "request";
    /// ISSUED, RUNNING, DONE or FAILED
    pub const STATUS: &str = "status";
    /// Priority threshold
    pub const PRIORITY: &str = "priority";
    /// 1 when all candidates run it at once
    pub const IS_PARALLEL: &str = "is_parallel";
    /// Components currently allowed to run it
    pub const RESPONSIBLE_SERVICES: &str = "responsible_services";
    /// Where results are written
    pub const OUTPUT_PATH: &str = "output_path";
}

/// A job description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Component that created the job
    pub requesting_service_name: String,
    /// Service type expected to run it
    pub requested_service_type: String,
    /// Start or stop
    pub request: Request,
    /// Lifecycle state
    pub status: JobStatus,
    /// Priority threshold; workers at or below it may run
    pub priority: i32,
    /// Run on every candidate instead of the best one
    pub is_parallel: bool,
    /// Components currently allowed to run it
    pub responsible_services: Vec<String>,
    /// Where results are written
    pub output_path: String,
}

impl JobRecord {
    /// A freshly issued START job
    #[must_use]
    pub fn issue(
        requesting_service_name: impl Into<String>,
        requested_service_type: impl Into<String>,
        output_path: impl Into<String>,
    ) -> Self {
        Self {
            requesting_service_name: requesting_service_name.into(),
            requested_service_type: requested_service_type.into(),
            request: Request::Start,
            status: JobStatus::Issued,
            priority: 0,
            is_parallel: false,
            responsible_services: Vec::new(),
            output_path: output_path.into(),
        }
    }

    /// Set the priority threshold
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Mark as parallel
    #[must_use]
    pub fn parallel(mut self) -> Self {
        self.is_parallel = true;
        self
    }

    /// Tree form named `name`
    #[must_use]
    pub fn to_node(&self, name: &str) -> Node {
        Node::dict(name)
            .with_child(Node::str(
                field::REQUESTING_SERVICE_NAME,
                self.requesting_service_name.clone(),
            ))
            .with_child(Node::str(
                field::REQUESTED_SERVICE_TYPE,
                self.requested_service_type.clone(),
            ))
            .with_child(Node::str(field::REQUEST, self.request.as_str()))
            .with_child(Node::str(field::STATUS, self.status.as_str()))
            .with_child(Node::int(field::PRIORITY, self.priority))
            .with_child(Node::int(field::IS_PARALLEL, i32::from(self.is_parallel)))
            .with_child(responsible_node(&self.responsible_services))
            .with_child(Node::reference(field::OUTPUT_PATH, self.output_path.clone()))
    }

    /// Parse the tree form
    ///
    /// # Errors
    ///
    /// Returns `Malformed` naming the first missing or mistyped field
    pub fn from_node(node: &Node) -> CoreResult<Self> {
        let missing = |f: &str| CoreError::malformed("job", format!("'{}' missing or mistyped", f));
        let text = |f: &str| node.child(f).and_then(Node::as_str).ok_or_else(|| missing(f));
        let int = |f: &str| node.child(f).and_then(Node::as_int).ok_or_else(|| missing(f));

        let output_path = node
            .child(field::OUTPUT_PATH)
            .and_then(|n| n.as_ref_path().or_else(|| n.as_str()))
            .ok_or_else(|| missing(field::OUTPUT_PATH))?;

        let responsible_services = node
            .child(field::RESPONSIBLE_SERVICES)
            .and_then(Node::children)
            .map(|c| c.keys().cloned().collect())
            .unwrap_or_default();

        Ok(Self {
            requesting_service_name: text(field::REQUESTING_SERVICE_NAME)?.to_string(),
            requested_service_type: text(field::REQUESTED_SERVICE_TYPE)?.to_string(),
            request: text(field::REQUEST)?.parse()?,
            status: text(field::STATUS)?.parse()?,
            priority: int(field::PRIORITY)?,
            is_parallel: int(field::IS_PARALLEL).unwrap_or(0) != 0,
            responsible_services,
            output_path: output_path.to_string(),
        })
    }
}

/// Tree form of a responsible-services list
#[must_use]
pub fn responsible_node(services: &[String]) -> Node {
    services
        .iter()
        .fold(Node::dict(field::RESPONSIBLE_SERVICES), |dict, s| {
            dict.with_child(Node::str(s.clone(), s.clone()))
        })
}

/// Create the job at `path` unless something is already there. Returns
/// true when the job was written.
///
/// # Errors
///
/// Returns the store error if the write fails
pub fn ensure_job(store: &LocalStore, path: &str, record: &JobRecord) -> CoreResult<bool> {
    let name = arbor_core::split_path(path)
        .last()
        .map(|s| (*s).to_string())
        .ok_or_else(|| CoreError::InvalidPath {
            path: path.to_string(),
            reason: "a job cannot live at the root".to_string(),
        })?;
    if store.has(path) {
        return Ok(false);
    }
    info!(job = %path, service_type = %record.requested_service_type, "issuing job");
    store.put(record.to_node(&name), path)?;
    Ok(true)
}

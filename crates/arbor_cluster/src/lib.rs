//! ARBOR Cluster
//!
//! Components announce themselves under `/components/<name>` and keep
//! the record fresh with a heartbeat. Every component tracks its peers'
//! records to know who is alive and what service type they offer.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod heartbeat;
pub mod membership;
pub mod record;

pub use heartbeat::{HeartbeatConfig, HeartbeatMonitor, HeartbeatTasks};
pub use membership::{Member, MemberState, Membership, Transition};
pub use record::{COMPONENTS_ROOT, ComponentRecord};

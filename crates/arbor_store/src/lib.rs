//! ARBOR Local Store
//!
//! Each component holds a private replica of a path-addressed [`Node`]
//! tree. Local writes to publishable paths are queued for broadcast;
//! remote writes to subscribed paths are applied without re-broadcast.
//! Observers registered on path patterns see every applied write.
//!
//! [`Node`]: arbor_core::Node

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod policy;
pub mod replicator;
pub mod store;
pub mod update;

pub use policy::ReplicationPolicy;
pub use replicator::Replicator;
pub use store::{Applied, LocalStore, Origin, StoreEvent, StoreStats};
pub use update::{Command, Update};

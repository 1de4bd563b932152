//! ARBOR Runtime
//!
//! Turns a [`Configuration`](arbor_core::Configuration) into a running
//! component: its store and replication policy, transport, heartbeat,
//! job dispatcher, workers and optional persistence, started and
//! stopped in a fixed order.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod component;
pub mod roles;
pub mod settings;

pub use component::Component;
pub use roles::{COUNTER_JOB, COUNTER_OUTPUT, Role, assemble};
pub use settings::{ComponentSettings, TransportKind, open_transport};

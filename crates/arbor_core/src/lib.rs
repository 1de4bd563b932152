//! ARBOR Core Types
//!
//! Pure types shared by every component: the `Node` tree value, path
//! patterns, service addresses and the key/value configuration.
//! This crate performs no network I/O.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod address;
pub mod config;
pub mod error;
pub mod node;
pub mod path;

// Re-exports
pub use address::ServiceAddress;
pub use config::{ConfigView, Configuration, MIN_PERIOD};
pub use error::{CoreError, CoreResult};
pub use node::{MAX_DEPTH, Node, Value};
pub use path::{Pattern, PathFilter, join_path, normalize_path, parent_path, split_path};

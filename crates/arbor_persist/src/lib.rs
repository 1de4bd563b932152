//! ARBOR Persistence
//!
//! Durability for a component's store, made of two parts:
//! - a message log that records every applied write,
//! - periodic whole-tree snapshots, each starting a new log.
//!
//! A snapshot and the log that follows it share a generation number.
//! Recovery loads the newest readable snapshot and replays the logs of
//! that generation and every later one.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod directory;
pub mod error;
pub mod log;
pub mod naming;
pub mod service;
pub mod snapshot;

pub use directory::{DataDirectory, Generation, Recovered};
pub use error::{PersistError, PersistResult};
pub use log::{LogRecord, LogReplay, MessageLog, read_log};
pub use naming::{FileKind, file_name, parse_file_name};
pub use service::{PersistConfig, Persistence, PersistenceTask};
pub use snapshot::{read_snapshot, write_snapshot};

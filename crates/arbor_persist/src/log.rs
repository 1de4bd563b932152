//! Append-only message log.
//!
//! Every applied store write becomes one [`LogRecord`], encoded with the
//! binary codec and written as a length-prefixed frame. Each append is
//! flushed before the next record is accepted. A crash can only tear the
//! final frame, which [`read_log`] drops.

use crate::{PersistError, PersistResult};
use arbor_codec::{CodecError, CodecResult, FrameReader, FrameWriter, Wire};
use arbor_core::{CoreError, CoreResult, Node, normalize_path, split_path};
use arbor_store::Command;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::warn;

/// One logged store write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Concrete path written
    pub path: String,
    /// Command that produced the write
    pub command: Command,
    /// Stored value
    pub node: Option<Node>,
}

impl LogRecord {
    /// Record of a Put
    #[must_use]
    pub fn put(path: &str, node: Node) -> Self {
        Self {
            path: normalize_path(path),
            command: Command::Put,
            node: Some(node),
        }
    }

    /// Replay this record onto `root`. Gets carry no state and are skipped.
    ///
    /// # Errors
    ///
    /// Returns `Malformed` for a Put without a node and `PathConflict` if
    /// the path cannot be created in `root`
    pub fn apply(self, root: &mut Node) -> CoreResult<()> {
        if self.command == Command::Get {
            return Ok(());
        }
        let node = self
            .node
            .ok_or_else(|| {
                CoreError::malformed("log record", format!("PUT {} without a node", self.path))
            })?;

        if split_path(&self.path).is_empty() {
            if !node.is_dict() {
                return Err(CoreError::PathConflict { path: "/".to_string() });
            }
            *root = node.renamed("");
            return Ok(());
        }
        root.insert_at(&self.path, node)
    }
}

impl Wire for LogRecord {
    fn from_wire(bytes: &[u8]) -> CodecResult<Self> {
        let record: LogRecord = arbor_codec::from_bytes(bytes)?;
        if let Some(node) = &record.node {
            node.validate().map_err(|e| CodecError::Malformed {
                format: "binary",
                reason: e.to_string(),
            })?;
        }
        Ok(record)
    }
}

/// Open log file for one generation
pub struct MessageLog {
    path: PathBuf,
    writer: FrameWriter<BufWriter<File>>,
    appended: u64,
}

impl MessageLog {
    /// Open `path` for appending, creating it if needed
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be opened
    pub fn create(path: impl Into<PathBuf>) -> PersistResult<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| PersistError::io(&path, e))?;
        Ok(Self {
            path,
            writer: FrameWriter::new(BufWriter::new(file)),
            appended: 0,
        })
    }

    /// Append and flush one record
    ///
    /// # Errors
    ///
    /// Returns `Codec` if the record cannot be encoded or `Io` if the
    /// write fails
    pub fn append(&mut self, record: &LogRecord) -> PersistResult<()> {
        let bytes = record.to_wire()?;
        self.writer.write_frame(&bytes)?;
        self.writer.flush().map_err(|e| PersistError::io(&self.path, e))?;
        self.appended += 1;
        Ok(())
    }

    /// Flush and ask the OS to persist the file
    ///
    /// # Errors
    ///
    /// Returns `Io` on failure
    pub fn sync(&mut self) -> PersistResult<()> {
        self.writer.flush().map_err(|e| PersistError::io(&self.path, e))?;
        self.writer
            .get_ref()
            .get_ref()
            .sync_data()
            .map_err(|e| PersistError::io(&self.path, e))
    }

    /// File being written
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records appended through this handle
    #[must_use]
    pub fn appended(&self) -> u64 {
        self.appended
    }
}

/// Content of a log file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogReplay {
    /// Complete records in append order
    pub records: Vec<LogRecord>,
    /// A damaged tail was dropped
    pub torn: bool,
}

/// Read every complete record of a log file
///
/// # Errors
///
/// Returns `Io` if the file cannot be read. Damage is not an error: the
/// records before it are returned with `torn` set.
pub fn read_log(path: &Path) -> PersistResult<LogReplay> {
    let file = File::open(path).map_err(|e| PersistError::io(path, e))?;
    let mut reader = FrameReader::new(BufReader::new(file));
    let mut replay = LogReplay::default();

    loop {
        let frame = match reader.read_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(CodecError::Io(reason)) => {
                return Err(PersistError::Io {
                    path: path.display().to_string(),
                    reason,
                });
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    kept = replay.records.len(),
                    "dropping torn log tail"
                );
                replay.torn = true;
                break;
            }
        };

        match LogRecord::from_wire(&frame) {
            Ok(record) => replay.records.push(record),
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    kept = replay.records.len(),
                    "undecodable log record"
                );
                replay.torn = true;
                break;
            }
        }
    }
    Ok(replay)
}

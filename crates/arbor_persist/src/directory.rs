//! Data directory layout and recovery.

use crate::naming::{FileKind, file_name, parse_file_name};
use crate::{PersistError, PersistResult, read_log, read_snapshot};
use arbor_codec::Format;
use arbor_core::Node;
use chrono::Utc;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Files sharing one sequence number
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Generation {
    /// Sequence number
    pub seq: u64,
    /// Snapshot that opened the generation
    pub snapshot: Option<PathBuf>,
    /// Writes logged after that snapshot
    pub log: Option<PathBuf>,
}

/// State rebuilt from disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recovered {
    /// Reconstructed tree
    pub root: Node,
    /// Generation of the snapshot used, if any was readable
    pub snapshot_seq: Option<u64>,
    /// Log records replayed on top of it
    pub replayed: usize,
    /// Some log had a damaged tail
    pub torn: bool,
}

/// A directory of snapshots and logs sharing a file prefix
#[derive(Debug, Clone)]
pub struct DataDirectory {
    dir: PathBuf,
    prefix: String,
}

impl DataDirectory {
    /// Describe a directory; nothing is touched on disk
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    /// Directory path
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File prefix
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Create the directory and its parents
    ///
    /// # Errors
    ///
    /// Returns `Io` on failure
    pub fn create(&self) -> PersistResult<()> {
        fs::create_dir_all(&self.dir).map_err(|e| PersistError::io(&self.dir, e))
    }

    /// Path for a new file of generation `seq`, stamped with the current time
    #[must_use]
    pub fn path_for(&self, seq: u64, kind: FileKind) -> PathBuf {
        self.dir.join(file_name(&self.prefix, seq, Utc::now(), kind))
    }

    /// Snapshot and log paths of a new generation, sharing one stem
    #[must_use]
    pub fn generation_paths(&self, seq: u64, format: Format) -> (PathBuf, PathBuf) {
        let now = Utc::now();
        (
            self.dir.join(file_name(&self.prefix, seq, now, FileKind::Snapshot(format))),
            self.dir.join(file_name(&self.prefix, seq, now, FileKind::Log)),
        )
    }

    /// Generations present on disk, oldest first. Files of other
    /// prefixes and temp files are ignored.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the directory cannot be listed
    pub fn scan(&self) -> PersistResult<Vec<Generation>> {
        let entries = fs::read_dir(&self.dir).map_err(|e| PersistError::io(&self.dir, e))?;
        let mut generations: BTreeMap<u64, Generation> = BTreeMap::new();

        for entry in entries {
            let entry = entry.map_err(|e| PersistError::io(&self.dir, e))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some((seq, kind)) = parse_file_name(&self.prefix, name) else {
                continue;
            };

            let generation = generations.entry(seq).or_insert_with(|| Generation {
                seq,
                ..Generation::default()
            });
            let slot = match kind {
                FileKind::Snapshot(_) => &mut generation.snapshot,
                FileKind::Log => &mut generation.log,
            };
            if let Some(existing) = slot.as_ref() {
                warn!(seq, kept = %existing.display(), ignored = name, "duplicate data file");
            } else {
                *slot = Some(entry.path());
            }
        }

        Ok(generations.into_values().collect())
    }

    /// Sequence number for the next generation
    ///
    /// # Errors
    ///
    /// Returns `Io` if the directory cannot be listed
    pub fn next_seq(&self) -> PersistResult<u64> {
        Ok(self.scan()?.last().map_or(1, |g| g.seq + 1))
    }

    /// Rebuild the newest durable state: the newest readable snapshot plus
    /// every log of that generation and later ones, in order. Unreadable
    /// snapshots fall back to older ones. `None` when the directory holds
    /// no data files.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the directory or a log cannot be read
    pub fn get_latest(&self) -> PersistResult<Option<Recovered>> {
        let generations = self.scan()?;
        if generations.is_empty() {
            return Ok(None);
        }

        let mut base = None;
        for generation in generations.iter().rev() {
            let Some(path) = &generation.snapshot else { continue };
            match read_snapshot(path) {
                Ok(root) => {
                    base = Some((generation.seq, root));
                    break;
                }
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable snapshot"),
            }
        }

        let (snapshot_seq, mut root) = match base {
            Some((seq, root)) => (Some(seq), root),
            None => {
                warn!(dir = %self.dir.display(), "no readable snapshot, replaying logs from empty");
                (None, Node::root())
            }
        };

        let mut replayed = 0;
        let mut torn = false;
        let first = snapshot_seq.unwrap_or(0);
        for generation in generations.iter().filter(|g| g.seq >= first) {
            let Some(path) = &generation.log else { continue };
            let replay = read_log(path)?;
            torn |= replay.torn;
            for record in replay.records {
                let at = record.path.clone();
                match record.apply(&mut root) {
                    Ok(()) => replayed += 1,
                    Err(e) => warn!(path = %at, error = %e, "skipping log record"),
                }
            }
            debug!(seq = generation.seq, log = %path.display(), "log replayed");
        }

        info!(
            dir = %self.dir.display(),
            snapshot = ?snapshot_seq,
            replayed,
            torn,
            "recovered state"
        );
        Ok(Some(Recovered {
            root,
            snapshot_seq,
            replayed,
            torn,
        }))
    }
}

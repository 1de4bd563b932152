//! The persistence component's writer.
//!
//! A `/*` callback turns every applied write into a log record on an
//! unbounded queue. A single writer task owns the files: it appends
//! records in queue order and, when the timer signals, asks the store
//! for a checkpoint. The checkpoint runs between two writes and pushes a
//! rotation marker carrying a copy of the tree, so every record queued
//! before the marker is covered by the new snapshot and every record
//! after it lands in the new log.

use crate::{DataDirectory, LogRecord, MessageLog, PersistError, PersistResult, write_snapshot};
use arbor_codec::Format;
use arbor_core::{ConfigView, CoreResult, MIN_PERIOD, Node, Pattern};
use arbor_store::LocalStore;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Persistence settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistConfig {
    /// Directory holding snapshots and logs
    pub data_dir: PathBuf,
    /// File name prefix
    pub prefix: String,
    /// Snapshot encoding
    pub format: Format,
    /// Time between snapshots
    pub period: Duration,
    /// Rebuild the store from disk at start
    pub restore: bool,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("arbor_data"),
            prefix: "arbor".to_string(),
            format: Format::Xml,
            period: Duration::from_secs(10),
            restore: true,
        }
    }
}

impl PersistConfig {
    /// Read the `persist.*` keys, falling back to defaults
    ///
    /// # Errors
    ///
    /// Returns `Malformed` for unparsable values
    pub fn from_view(view: &ConfigView<'_>) -> CoreResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            data_dir: view
                .get("persist.data_dir")
                .map_or(defaults.data_dir, PathBuf::from),
            prefix: view.string_or("persist.prefix", &defaults.prefix),
            format: view.parsed_or("persist.format", defaults.format)?,
            period: view.millis_or("persist.period_ms", defaults.period)?,
            restore: view.flag_or("persist.restore", defaults.restore)?,
        })
    }
}

enum Entry {
    Record(LogRecord),
    Rotate(Node),
}

/// Durable journal of one store
pub struct Persistence {
    config: PersistConfig,
    dir: DataDirectory,
    store: Arc<LocalStore>,
    queue: mpsc::UnboundedSender<Entry>,
    entries: mpsc::UnboundedReceiver<Entry>,
    seq: u64,
    log: Option<MessageLog>,
    unlogged: u64,
}

impl Persistence {
    /// Prepare the data directory, rebuild the store from it when
    /// `restore` is set, start journaling writes and open a new
    /// generation holding the current tree.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the directory, the first snapshot or the first log
    /// cannot be written, and `Corrupt` if recovered state does not fit
    /// the store
    pub fn init(config: PersistConfig, store: Arc<LocalStore>) -> PersistResult<Self> {
        let dir = DataDirectory::new(&config.data_dir, &config.prefix);
        dir.create()?;

        if config.restore {
            match dir.get_latest()? {
                Some(recovered) => {
                    let entries = recovered.root.entry_count();
                    store
                        .load_root(recovered.root)
                        .map_err(|e| PersistError::corrupt(dir.dir(), e))?;
                    info!(store = %store.name(), entries, "store restored");
                }
                None => info!(dir = %dir.dir().display(), "nothing to restore"),
            }
        }

        let (queue, entries) = mpsc::unbounded_channel();
        let sender = queue.clone();
        store.register_callback(Pattern::everything(), move |event| {
            let record = LogRecord {
                path: event.path.to_string(),
                command: event.command,
                node: Some(event.node.clone()),
            };
            let _ = sender.send(Entry::Record(record));
        });

        // Records queued before this checkpoint are also in the snapshot;
        // replaying them is harmless since later records follow them.
        let root = store.checkpoint(Node::clone);
        let seq = dir.next_seq()?;

        let mut persistence = Self {
            config,
            dir,
            store,
            queue,
            entries,
            seq: 0,
            log: None,
            unlogged: 0,
        };
        persistence.open_generation(seq, &root)?;
        Ok(persistence)
    }

    /// Current generation number
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.seq
    }

    /// Settings in use
    #[must_use]
    pub fn config(&self) -> &PersistConfig {
        &self.config
    }

    /// Spawn the snapshot timer and the writer
    pub fn start(mut self, cancel: CancellationToken) -> PersistenceTask {
        let signal = Arc::new(Notify::new());

        let timer = {
            let signal = Arc::clone(&signal);
            let cancel = cancel.clone();
            let period = self.config.period.max(MIN_PERIOD);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        _ = ticker.tick() => signal.notify_one(),
                    }
                }
                debug!("snapshot timer stopped");
            })
        };

        let writer = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = signal.notified() => self.request_rotation(),
                    entry = self.entries.recv() => match entry {
                        Some(entry) => self.handle(entry),
                        None => break,
                    },
                }
            }
            self.finish();
        });

        PersistenceTask { timer, writer }
    }

    fn request_rotation(&self) {
        self.store.checkpoint(|root| {
            let _ = self.queue.send(Entry::Rotate(root.clone()));
        });
    }

    fn handle(&mut self, entry: Entry) {
        match entry {
            Entry::Record(record) => self.append(&record),
            Entry::Rotate(root) => {
                let seq = self.seq + 1;
                if let Err(e) = self.open_generation(seq, &root) {
                    error!(seq, error = %e, "snapshot failed, retrying next period");
                }
            }
        }
    }

    fn append(&mut self, record: &LogRecord) {
        let Some(log) = self.log.as_mut() else {
            self.unlogged += 1;
            return;
        };
        if let Err(e) = log.append(record) {
            error!(
                path = %record.path,
                error = %e,
                "log append failed, journaling paused until next snapshot"
            );
            self.log = None;
            self.unlogged += 1;
        }
    }

    /// Write the snapshot for `seq`, then switch to its log. A failed
    /// snapshot leaves the previous log in use.
    fn open_generation(&mut self, seq: u64, root: &Node) -> PersistResult<()> {
        let (snapshot, log_path) = self.dir.generation_paths(seq, self.config.format);
        write_snapshot(&snapshot, root, self.config.format)?;

        if let Some(mut previous) = self.log.take() {
            if let Err(e) = previous.sync() {
                warn!(path = %previous.path().display(), error = %e, "closing log failed");
            }
        }
        self.seq = seq;
        if self.unlogged > 0 {
            info!(seq, unlogged = self.unlogged, "snapshot covers writes missing from the log");
            self.unlogged = 0;
        }
        info!(
            seq,
            path = %snapshot.display(),
            entries = root.entry_count(),
            "snapshot written"
        );

        self.log = Some(MessageLog::create(log_path)?);
        Ok(())
    }

    fn finish(&mut self) {
        let mut drained = 0usize;
        while let Ok(entry) = self.entries.try_recv() {
            if let Entry::Record(record) = entry {
                self.append(&record);
                drained += 1;
            }
        }
        if let Some(log) = self.log.as_mut() {
            if let Err(e) = log.sync() {
                error!(path = %log.path().display(), error = %e, "final log flush failed");
            }
        }
        info!(seq = self.seq, drained, "persistence stopped");
    }
}

/// Running persistence tasks
pub struct PersistenceTask {
    timer: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl PersistenceTask {
    /// Wait for the timer and the writer after cancellation
    pub async fn join(self) {
        for (task, handle) in [("timer", self.timer), ("writer", self.writer)] {
            if let Err(e) = handle.await {
                warn!(task, error = %e, "persistence task panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read_log;
    use arbor_core::Configuration;
    use arbor_store::ReplicationPolicy;

    fn store() -> Arc<LocalStore> {
        Arc::new(LocalStore::new("persist", ReplicationPolicy::local_only()))
    }

    fn config(dir: &std::path::Path) -> PersistConfig {
        PersistConfig {
            data_dir: dir.to_path_buf(),
            period: Duration::from_secs(1),
            ..PersistConfig::default()
        }
    }

    #[test]
    fn test_config_from_view() {
        let mut raw = Configuration::new();
        raw.set("persist.data_dir", "/var/lib/arbor");
        raw.set("persist.format", "binary");
        raw.set("persist.period_ms", "2500");
        raw.set("persist.restore", "no");
        let config = PersistConfig::from_view(&raw.view()).unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/var/lib/arbor"));
        assert_eq!(config.prefix, "arbor");
        assert_eq!(config.format, Format::Binary);
        assert_eq!(config.period, Duration::from_millis(2500));
        assert!(!config.restore);

        raw.set("persist.format", "yaml");
        assert!(PersistConfig::from_view(&raw.view()).is_err());

        raw.set("persist.format", "xml");
        raw.set("persist.period_ms", "0");
        assert!(PersistConfig::from_view(&raw.view()).is_err());
    }

    #[tokio::test]
    async fn test_init_opens_first_generation() {
        let tmp = tempfile::tempdir().unwrap();
        let persistence = Persistence::init(config(tmp.path()), store()).unwrap();
        assert_eq!(persistence.generation(), 1);

        let generations = DataDirectory::new(tmp.path(), "arbor").scan().unwrap();
        assert_eq!(generations.len(), 1);
        assert!(generations[0].snapshot.is_some());
        assert!(generations[0].log.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_writes_are_logged() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store();
        let cancel = CancellationToken::new();
        let task = Persistence::init(config(tmp.path()), Arc::clone(&store))
            .unwrap()
            .start(cancel.clone());

        store.put(Node::str("x", "1"), "/products/last_string").unwrap();
        store.put(Node::str("x", "2"), "/products/last_string").unwrap();
        cancel.cancel();
        task.join().await;

        let generations = DataDirectory::new(tmp.path(), "arbor").scan().unwrap();
        let replay = read_log(generations[0].log.as_deref().unwrap()).unwrap();
        assert_eq!(replay.records.len(), 2);
        assert_eq!(replay.records[1].node.as_ref().and_then(Node::as_str), Some("2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_rotates_generation() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store();
        let cancel = CancellationToken::new();
        let task = Persistence::init(config(tmp.path()), Arc::clone(&store))
            .unwrap()
            .start(cancel.clone());

        store.put(Node::str("x", "1"), "/products/last_string").unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        store.put(Node::str("x", "2"), "/products/last_string").unwrap();
        cancel.cancel();
        task.join().await;

        let dir = DataDirectory::new(tmp.path(), "arbor");
        let generations = dir.scan().unwrap();
        assert_eq!(generations.len(), 2);

        let first = read_log(generations[0].log.as_deref().unwrap()).unwrap();
        let second = read_log(generations[1].log.as_deref().unwrap()).unwrap();
        assert_eq!(first.records.len(), 1);
        assert_eq!(second.records.len(), 1);

        let recovered = dir.get_latest().unwrap().unwrap();
        assert_eq!(recovered.snapshot_seq, Some(2));
        assert_eq!(recovered.replayed, 1);
        assert_eq!(
            recovered.root.lookup_path("/products/last_string").and_then(Node::as_str),
            Some("2")
        );
    }

    #[tokio::test]
    async fn test_restore_disabled_starts_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let first = store();
        first.put(Node::int("n", 1), "/a/n").unwrap();
        Persistence::init(config(tmp.path()), first).unwrap();

        let second = store();
        let persistence = Persistence::init(
            PersistConfig {
                restore: false,
                ..config(tmp.path())
            },
            Arc::clone(&second),
        )
        .unwrap();
        assert!(!second.has("/a/n"));
        assert_eq!(persistence.generation(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_period_still_rotates() {
        let tmp = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let task = Persistence::init(
            PersistConfig {
                period: Duration::ZERO,
                ..config(tmp.path())
            },
            store(),
        )
        .unwrap()
        .start(cancel.clone());

        tokio::time::sleep(Duration::from_millis(3)).await;
        cancel.cancel();
        task.join().await;

        let generations = DataDirectory::new(tmp.path(), "arbor").scan().unwrap();
        assert!(generations.len() >= 2, "{} generations", generations.len());
    }
}

//! Path-addressed replica of the shared tree.
//!
//! All writes go through one write-order lock: the tree change, the
//! outbound enqueue and the callback fan-out of a write complete before
//! the next write starts. Readers only take the tree lock, so a reader
//! never observes half of a write.
//!
//! Callbacks run on the writing thread while the write-order lock is
//! held. They may read the store but must not write to it.

use crate::{Command, ReplicationPolicy, Update};
use arbor_core::{CoreError, CoreResult, Node, Pattern, join_path, normalize_path, split_path};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Where an applied write came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// `put` on this store
    Local,
    /// Update received from a peer
    Remote,
}

/// What a callback is told about a write
#[derive(Debug, Clone, Copy)]
pub struct StoreEvent<'a> {
    /// Always `Put` for applied writes
    pub command: Command,
    /// Concrete path written
    pub path: &'a str,
    /// The node now stored at `path`
    pub node: &'a Node,
    /// Local or remote write
    pub origin: Origin,
}

type Callback = Arc<dyn Fn(&StoreEvent<'_>) + Send + Sync>;

struct Registration {
    pattern: Pattern,
    callback: Callback,
}

/// Counters kept by a store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Successful local writes
    pub local_puts: u64,
    /// Updates handed to the outbound queue
    pub published: u64,
    /// Remote writes applied
    pub remote_applied: u64,
    /// Remote writes outside the subscribe set
    pub remote_rejected: u64,
    /// Entries sent in answer to Get requests
    pub republished: u64,
    /// Undecodable messages dropped by the receive loop
    pub malformed: u64,
}

/// Result of applying a remote update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The write was stored and callbacks ran
    Stored,
    /// The path is not subscribed
    Rejected,
    /// A Get was answered with this many entries
    Answered(usize),
}

/// A component's replica of the tree
pub struct LocalStore {
    name: String,
    policy: ReplicationPolicy,
    root: RwLock<Node>,
    write_order: Mutex<()>,
    callbacks: RwLock<Vec<Registration>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Update>>>,
    stats: Mutex<StoreStats>,
}

impl LocalStore {
    /// Create an empty store for the named component
    #[must_use]
    pub fn new(name: impl Into<String>, policy: ReplicationPolicy) -> Self {
        Self {
            name: name.into(),
            policy,
            root: RwLock::new(Node::root()),
            write_order: Mutex::new(()),
            callbacks: RwLock::new(Vec::new()),
            outbound: Mutex::new(None),
            stats: Mutex::new(StoreStats::default()),
        }
    }

    /// Owning component name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replication policy
    #[must_use]
    pub fn policy(&self) -> &ReplicationPolicy {
        &self.policy
    }

    /// Open the outbound queue. Updates produced before this call are not
    /// kept; a second call replaces the first queue.
    pub fn attach_outbound(&self) -> mpsc::UnboundedReceiver<Update> {
        let (tx, rx) = mpsc::unbounded_channel();
        *lock(&self.outbound) = Some(tx);
        rx
    }

    /// Is there an entry at exactly this path?
    #[must_use]
    pub fn has(&self, path: &str) -> bool {
        read(&self.root).lookup_path(path).is_some()
    }

    /// Run `f` on the live node at `path`. The tree is read-locked for the
    /// duration of `f`, which must not write to this store.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the path is absent
    pub fn get_with<R>(&self, path: &str, f: impl FnOnce(&Node) -> R) -> CoreResult<R> {
        let root = read(&self.root);
        root.lookup_path(path)
            .map(f)
            .ok_or_else(|| CoreError::path_not_found(&normalize_path(path)))
    }

    /// Independent copy of the node at `path`
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the path is absent
    pub fn get_copy(&self, path: &str) -> CoreResult<Node> {
        self.get_with(path, Node::clone)
    }

    /// Copy of the whole tree
    #[must_use]
    pub fn snapshot(&self) -> Node {
        read(&self.root).clone()
    }

    /// Every path held, parents before children, root excluded
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        read(&self.root).walk("/", &mut |path, _| {
            if path != "/" {
                paths.push(path.to_string());
            }
        });
        paths
    }

    /// Number of entries, root excluded
    #[must_use]
    pub fn entry_count(&self) -> usize {
        read(&self.root).entry_count() - 1
    }

    /// Store `node` at `path`, broadcast it if the path is published and
    /// run matching callbacks in registration order
    ///
    /// # Errors
    ///
    /// Returns `PathConflict` if the path runs through a leaf or replaces
    /// the root with a leaf, and `Malformed` if the node breaks the naming
    /// invariant
    pub fn put(&self, node: Node, path: &str) -> CoreResult<()> {
        let path = normalize_path(path);
        let _order = lock(&self.write_order);

        let stored = self.write_tree(&path, node)?;
        self.bump(|s| s.local_puts += 1);

        if let Some(outgoing) = self.policy.outgoing(&path, &stored) {
            self.enqueue(Update::put(&path, outgoing, self.name.as_str()));
        }
        self.notify(&path, &stored, Origin::Local);
        Ok(())
    }

    /// Observe writes on or above paths matching `pattern`
    pub fn register_callback<F>(&self, pattern: Pattern, callback: F)
    where
        F: Fn(&StoreEvent<'_>) + Send + Sync + 'static,
    {
        debug!(store = %self.name, %pattern, "callback registered");
        write(&self.callbacks).push(Registration {
            pattern,
            callback: Arc::new(callback),
        });
    }

    /// Apply an update received from a peer.
    ///
    /// A Put on a subscribed path is stored without re-broadcast and
    /// callbacks run. A Get is answered by queueing a Put for every
    /// published entry beneath the pattern.
    ///
    /// # Errors
    ///
    /// Returns `Malformed` for a Put without a node, `InvalidPath` for a
    /// Get without a valid pattern, or the write error of the Put
    pub fn apply_remote(&self, mut update: Update) -> CoreResult<Applied> {
        match update.command {
            Command::Put => {
                let path = normalize_path(&update.path);
                let node = update.take_node()?;
                let Some(node) = self.policy.incoming(&path, node) else {
                    trace!(store = %self.name, %path, from = %update.origin, "not subscribed");
                    self.bump(|s| s.remote_rejected += 1);
                    return Ok(Applied::Rejected);
                };

                let _order = lock(&self.write_order);
                let stored = self.write_tree(&path, node)?;
                self.bump(|s| s.remote_applied += 1);
                self.notify(&path, &stored, Origin::Remote);
                Ok(Applied::Stored)
            }
            Command::Get => {
                let pattern = update.pattern()?;
                let _order = lock(&self.write_order);

                let answers = {
                    let root = read(&self.root);
                    let prefix = pattern.prefix();
                    let mut answers = Vec::new();
                    if let Some(node) = root.lookup_path(&prefix) {
                        self.collect_published(&prefix, node, &mut answers);
                    }
                    answers
                };

                let count = answers.len();
                debug!(store = %self.name, %pattern, from = %update.origin, count, "answering get");
                for (path, node) in answers {
                    self.enqueue(Update::put(&path, node, self.name.as_str()));
                }
                self.bump(|s| s.republished += count as u64);
                Ok(Applied::Answered(count))
            }
        }
    }

    /// Queue a Get for `pattern`. Returns false when no outbound queue is
    /// attached.
    pub fn request(&self, pattern: &Pattern) -> bool {
        if lock(&self.outbound).is_none() {
            return false;
        }
        self.enqueue(Update::get(pattern, self.name.as_str()));
        true
    }

    /// Write without broadcast or callbacks
    ///
    /// # Errors
    ///
    /// Same as [`LocalStore::put`]
    pub fn restore(&self, path: &str, node: Node) -> CoreResult<()> {
        let path = normalize_path(path);
        let _order = lock(&self.write_order);
        self.write_tree(&path, node).map(|_| ())
    }

    /// Replace the whole tree without broadcast or callbacks
    ///
    /// # Errors
    ///
    /// Returns `PathConflict` if `root` is not a dictionary
    pub fn load_root(&self, root: Node) -> CoreResult<()> {
        self.restore("/", root)
    }

    /// Run `f` on the tree between two writes
    pub fn checkpoint<R>(&self, f: impl FnOnce(&Node) -> R) -> R {
        let _order = lock(&self.write_order);
        let root = read(&self.root);
        f(&root)
    }

    /// Counter snapshot
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        lock(&self.stats).clone()
    }

    /// Count a message dropped before it reached the store
    pub fn record_malformed(&self) {
        self.bump(|s| s.malformed += 1);
    }

    fn write_tree(&self, path: &str, node: Node) -> CoreResult<Node> {
        node.validate()?;
        let mut root = write(&self.root);
        match split_path(path).last() {
            None => {
                if !node.is_dict() {
                    return Err(CoreError::PathConflict {
                        path: "/".to_string(),
                    });
                }
                let node = node.renamed("");
                *root = node.clone();
                Ok(node)
            }
            Some(last) => {
                let node = node.renamed(*last);
                root.insert_at(path, node.clone())?;
                Ok(node)
            }
        }
    }

    fn enqueue(&self, update: Update) {
        let mut outbound = lock(&self.outbound);
        let Some(tx) = outbound.as_ref() else {
            return;
        };
        if tx.send(update).is_err() {
            debug!(store = %self.name, "outbound queue closed");
            *outbound = None;
            return;
        }
        drop(outbound);
        self.bump(|s| s.published += 1);
    }

    fn notify(&self, path: &str, node: &Node, origin: Origin) {
        let matching: Vec<Callback> = read(&self.callbacks)
            .iter()
            .filter(|r| touches(&r.pattern, path))
            .map(|r| Arc::clone(&r.callback))
            .collect();

        let event = StoreEvent {
            command: Command::Put,
            path,
            node,
            origin,
        };
        for callback in matching {
            callback(&event);
        }
    }

    fn collect_published(&self, path: &str, node: &Node, out: &mut Vec<(String, Node)>) {
        if path != "/" {
            if let Some(outgoing) = self.policy.outgoing(path, node) {
                out.push((path.to_string(), outgoing));
                return;
            }
        }
        if let Some(children) = node.children() {
            for child in children.values() {
                self.collect_published(&join_path(path, child.name()), child, out);
            }
        }
    }

    fn bump(&self, f: impl FnOnce(&mut StoreStats)) {
        f(&mut lock(&self.stats));
    }
}

/// A write at `path` concerns a watcher if the pattern matches it or the
/// write replaced a subtree containing the watched prefix
fn touches(pattern: &Pattern, path: &str) -> bool {
    if pattern.matches(path) {
        return true;
    }
    let written = split_path(path);
    let watched = pattern.prefix();
    let watched = split_path(&watched);
    written.len() < watched.len() && written.iter().zip(&watched).all(|(a, b)| a == b)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_core::PathFilter;
    use std::sync::Mutex as StdMutex;

    fn pat(s: &str) -> Pattern {
        Pattern::parse(s).unwrap()
    }

    fn publisher() -> LocalStore {
        LocalStore::new(
            "a",
            ReplicationPolicy::local_only().with_publish(PathFilter::new().allow(pat("/jobs/*"))),
        )
    }

    fn subscriber() -> LocalStore {
        LocalStore::new(
            "b",
            ReplicationPolicy::local_only().with_subscribe(PathFilter::new().allow(pat("/jobs/*"))),
        )
    }

    #[test]
    fn test_put_then_get_copy() {
        let store = LocalStore::new("a", ReplicationPolicy::local_only());
        let node = Node::dict("demo").with_child(Node::int("n", 1));
        store.put(node.clone(), "/jobs/demo").unwrap();

        assert!(store.has("/jobs/demo"));
        assert!(store.has("/jobs/demo/n"));
        assert!(!store.has("/jobs/other"));
        assert_eq!(store.get_copy("/jobs/demo").unwrap(), node);
        assert_eq!(store.get_with("/jobs/demo/n", |n| n.as_int()).unwrap(), Some(1));
    }

    #[test]
    fn test_put_replaces_and_renames() {
        let store = LocalStore::new("a", ReplicationPolicy::local_only());
        store.put(Node::str("whatever", "one"), "/x/y").unwrap();
        store.put(Node::int("ignored", 2), "/x/y").unwrap();
        let copy = store.get_copy("/x/y").unwrap();
        assert_eq!(copy, Node::int("y", 2));
    }

    #[test]
    fn test_missing_path_is_not_found() {
        let store = LocalStore::new("a", ReplicationPolicy::local_only());
        let err = store.get_copy("/nothing/here").unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }

    #[test]
    fn test_put_through_leaf_conflicts() {
        let store = LocalStore::new("a", ReplicationPolicy::local_only());
        store.put(Node::int("x", 1), "/x").unwrap();
        let err = store.put(Node::int("y", 2), "/x/y").unwrap_err();
        assert!(matches!(err, CoreError::PathConflict { .. }));
        assert!(store.put(Node::int("root", 1), "/").is_err());
    }

    #[test]
    fn test_get_copy_is_independent() {
        let store = LocalStore::new("a", ReplicationPolicy::local_only());
        store.put(Node::int("n", 1), "/n").unwrap();
        let before = store.get_copy("/n").unwrap();
        store.put(Node::int("n", 2), "/n").unwrap();
        assert_eq!(before.as_int(), Some(1));
    }

    #[test]
    fn test_callbacks_in_registration_order() {
        let store = LocalStore::new("a", ReplicationPolicy::local_only());
        let seen = Arc::new(StdMutex::new(Vec::new()));

        for tag in ["first", "second"] {
            let seen = Arc::clone(&seen);
            store.register_callback(pat("/jobs/*"), move |e| {
                seen.lock().unwrap().push(format!("{} {} {}", tag, e.command, e.path));
            });
        }
        let other = Arc::clone(&seen);
        store.register_callback(pat("/components/*"), move |_| {
            other.lock().unwrap().push("wrong".to_string());
        });

        store.put(Node::int("x", 1), "/jobs/x").unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["first PUT /jobs/x", "second PUT /jobs/x"]
        );
    }

    #[test]
    fn test_callback_fires_for_ancestor_write() {
        let store = LocalStore::new("a", ReplicationPolicy::local_only());
        let hits = Arc::new(StdMutex::new(0));
        let counter = Arc::clone(&hits);
        store.register_callback(pat("/jobs/counter/status"), move |_| {
            *counter.lock().unwrap() += 1;
        });

        store.put(Node::str("status", "RUNNING"), "/jobs/counter/status").unwrap();
        store.put(Node::dict("counter"), "/jobs/counter").unwrap();
        store.put(Node::dict("other"), "/jobs/other").unwrap();
        assert_eq!(*hits.lock().unwrap(), 2);
    }

    #[test]
    fn test_callback_may_read_store() {
        let store = Arc::new(LocalStore::new("a", ReplicationPolicy::local_only()));
        let observed = Arc::new(StdMutex::new(None));
        let (reader, sink) = (Arc::clone(&store), Arc::clone(&observed));
        store.register_callback(pat("/n"), move |_| {
            *sink.lock().unwrap() = reader.get_copy("/n").ok();
        });
        store.put(Node::int("n", 5), "/n").unwrap();
        assert_eq!(*observed.lock().unwrap(), Some(Node::int("n", 5)));
    }

    #[test]
    fn test_publish_filter_controls_outbound() {
        let store = publisher();
        let mut rx = store.attach_outbound();
        store.put(Node::int("demo", 1), "/jobs/demo").unwrap();
        store.put(Node::int("local", 1), "/private/local").unwrap();

        let update = rx.try_recv().unwrap();
        assert_eq!(update.path, "/jobs/demo");
        assert_eq!(update.origin, "a");
        assert!(rx.try_recv().is_err());
        assert_eq!(store.stats().published, 1);
        assert_eq!(store.stats().local_puts, 2);
    }

    #[test]
    fn test_remote_put_applied_without_rebroadcast() {
        let store = subscriber();
        let mut rx = store.attach_outbound();
        let fired = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&fired);
        store.register_callback(pat("/*"), move |e| sink.lock().unwrap().push(e.origin));

        let applied = store
            .apply_remote(Update::put("/jobs/demo", Node::int("demo", 3), "a"))
            .unwrap();
        assert_eq!(applied, Applied::Stored);
        assert_eq!(store.get_copy("/jobs/demo").unwrap(), Node::int("demo", 3));
        assert_eq!(*fired.lock().unwrap(), vec![Origin::Remote]);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_remote_put_outside_subscription_rejected() {
        let store = subscriber();
        let applied = store
            .apply_remote(Update::put("/components/a", Node::dict("a"), "a"))
            .unwrap();
        assert_eq!(applied, Applied::Rejected);
        assert!(!store.has("/components/a"));
        assert_eq!(store.stats().remote_rejected, 1);
    }

    #[test]
    fn test_get_answered_with_published_entries() {
        let store = publisher();
        store.put(Node::int("one", 1), "/jobs/one").unwrap();
        store.put(Node::int("two", 2), "/jobs/two").unwrap();
        store.put(Node::int("hidden", 3), "/private/hidden").unwrap();
        let mut rx = store.attach_outbound();

        let applied = store.apply_remote(Update::get(&pat("/*"), "b")).unwrap();
        assert_eq!(applied, Applied::Answered(1));
        let answer = rx.try_recv().unwrap();
        assert_eq!(answer.path, "/jobs");
        let node = answer.node.unwrap();
        assert_eq!(node.children().map(|c| c.len()), Some(2));
    }

    #[test]
    fn test_request_needs_outbound() {
        let store = subscriber();
        assert!(!store.request(&pat("/jobs/*")));
        let mut rx = store.attach_outbound();
        assert!(store.request(&pat("/jobs/*")));
        assert_eq!(rx.try_recv().unwrap().command, Command::Get);
    }

    #[test]
    fn test_restore_is_silent() {
        let store = publisher();
        let mut rx = store.attach_outbound();
        let fired = Arc::new(StdMutex::new(0));
        let sink = Arc::clone(&fired);
        store.register_callback(pat("/*"), move |_| *sink.lock().unwrap() += 1);

        store.restore("/jobs/demo", Node::int("demo", 1)).unwrap();
        store
            .load_root(Node::root().with_child(Node::dict("jobs").with_child(Node::int("x", 1))))
            .unwrap();

        assert!(rx.try_recv().is_err());
        assert_eq!(*fired.lock().unwrap(), 0);
        assert!(store.has("/jobs/x"));
        assert!(!store.has("/jobs/demo"));
    }

    #[test]
    fn test_paths_and_counts() {
        let store = LocalStore::new("a", ReplicationPolicy::local_only());
        store.put(Node::int("x", 1), "/a/x").unwrap();
        store.put(Node::int("y", 1), "/b/y").unwrap();
        assert_eq!(store.paths(), vec!["/a", "/a/x", "/b", "/b/y"]);
        assert_eq!(store.entry_count(), 4);
    }

    #[test]
    fn test_checkpoint_sees_consistent_tree() {
        let store = LocalStore::new("a", ReplicationPolicy::local_only());
        store.put(Node::int("x", 1), "/x").unwrap();
        let copy = store.checkpoint(Node::clone);
        assert_eq!(copy, store.snapshot());
    }
}

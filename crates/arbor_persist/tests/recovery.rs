//! Restart scenarios: a fresh store rebuilt from the files an earlier
//! run left behind.

use arbor_codec::Format;
use arbor_core::Node;
use arbor_persist::{DataDirectory, PersistConfig, Persistence};
use arbor_store::{LocalStore, ReplicationPolicy};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn store() -> Arc<LocalStore> {
    Arc::new(LocalStore::new("persist", ReplicationPolicy::local_only()))
}

fn config(dir: &Path, format: Format) -> PersistConfig {
    PersistConfig {
        data_dir: dir.to_path_buf(),
        prefix: "arbor".to_string(),
        format,
        period: Duration::from_secs(5),
        restore: true,
    }
}

fn job(status: &str) -> Node {
    Node::dict("counter")
        .with_child(Node::str("requesting_service_name", "counter-1"))
        .with_child(Node::str("status", status))
        .with_child(Node::int("priority", 0))
        .with_child(Node::dict("responsible_services"))
        .with_child(Node::reference("output_path", "/products/counter"))
}

async fn run_once(dir: &Path, format: Format, writes: impl FnOnce(&LocalStore)) -> Arc<LocalStore> {
    let store = store();
    let cancel = CancellationToken::new();
    let task = Persistence::init(config(dir, format), Arc::clone(&store))
        .unwrap()
        .start(cancel.clone());
    writes(&store);
    cancel.cancel();
    task.join().await;
    store
}

#[tokio::test(start_paused = true)]
async fn test_restart_restores_every_entry() {
    let tmp = tempfile::tempdir().unwrap();
    let before = run_once(tmp.path(), Format::Xml, |store| {
        store.put(job("ISSUED"), "/jobs/counter").unwrap();
        store.put(Node::str("status", "RUNNING"), "/jobs/counter/status").unwrap();
        store.put(Node::str("last_string", "5"), "/products/counter/last_string").unwrap();
        store
            .put(Node::dict("components").with_child(Node::dict("counter-1")), "/components")
            .unwrap();
    })
    .await;

    let after = run_once(tmp.path(), Format::Xml, |_| {}).await;
    assert_eq!(after.paths(), before.paths());
    assert_eq!(after.snapshot(), before.snapshot());
    assert_eq!(
        after.get_with("/jobs/counter/status", |n| n.as_str().map(str::to_string)).unwrap(),
        Some("RUNNING".to_string())
    );
}

#[tokio::test(start_paused = true)]
async fn test_binary_snapshots_and_repeated_restarts() {
    let tmp = tempfile::tempdir().unwrap();
    for round in 1..=3 {
        run_once(tmp.path(), Format::Binary, |store| {
            let previous = store
                .get_with("/products/counter/last_string", |n| n.as_str().map(str::to_string))
                .ok()
                .flatten();
            assert_eq!(previous, (round > 1).then(|| (round - 1).to_string()));
            store
                .put(Node::str("last_string", round.to_string()), "/products/counter/last_string")
                .unwrap();
        })
        .await;
    }

    let generations = DataDirectory::new(tmp.path(), "arbor").scan().unwrap();
    assert_eq!(generations.len(), 3);
    assert!(generations.iter().all(|g| {
        g.snapshot
            .as_deref()
            .is_some_and(|p| p.extension().is_some_and(|e| e == "bin"))
    }));
}

#[tokio::test(start_paused = true)]
async fn test_torn_log_tail_keeps_complete_records() {
    let tmp = tempfile::tempdir().unwrap();
    run_once(tmp.path(), Format::Xml, |store| {
        store.put(Node::int("a", 1), "/values/a").unwrap();
        store.put(Node::int("b", 2), "/values/b").unwrap();
    })
    .await;

    let dir = DataDirectory::new(tmp.path(), "arbor");
    let log = dir.scan().unwrap()[0].log.clone().unwrap();
    let mut file = OpenOptions::new().append(true).open(&log).unwrap();
    file.write_all(&[0, 0, 1, 0, 9, 9]).unwrap();
    drop(file);

    let recovered = dir.get_latest().unwrap().unwrap();
    assert!(recovered.torn);
    assert_eq!(recovered.replayed, 2);

    let after = run_once(tmp.path(), Format::Xml, |_| {}).await;
    assert_eq!(after.get_with("/values/b", Node::as_int).unwrap(), Some(2));
}

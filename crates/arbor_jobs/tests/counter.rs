//! The counter scenario end to end on one store.

use arbor_core::Node;
use arbor_jobs::{
    CounterTask, JobRecord, JobStatus, Tick, WorkOutcome, Worker, WorkerSpec, WorkerState,
};
use arbor_store::{LocalStore, ReplicationPolicy};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const JOB: &str = "/jobs/counter";
const VALUE: &str = "/products/counter/last_string";

fn counter_store() -> Arc<LocalStore> {
    let store = Arc::new(LocalStore::new("counter-1", ReplicationPolicy::local_only()));
    let job = JobRecord::issue("counter-1", "counter", "/products/counter").with_priority(1);
    CounterTask::prepare(&store, JOB, &job).unwrap();
    store
}

fn value(store: &LocalStore) -> String {
    store
        .get_with(VALUE, |n| n.as_str().map(str::to_string))
        .unwrap()
        .unwrap()
}

#[test]
fn test_one_iteration_wraps_to_one_and_eight_cycle_back() {
    let store = counter_store();
    assert_eq!(value(&store), "8");

    let worker = Worker::new(
        WorkerSpec::new("counter-1", "counter", JOB).with_priority(1),
        Arc::clone(&store),
        CounterTask,
    );
    assert_eq!(worker.tick().unwrap(), Tick::Worked(WorkOutcome::Continue));
    assert_eq!(value(&store), "1");

    for _ in 1..8 {
        worker.tick().unwrap();
    }
    assert_eq!(value(&store), "8");
    assert_eq!(worker.iterations(), 8);

    let status = store
        .get_with("/jobs/counter/status", |n| n.as_str().map(str::to_string))
        .unwrap();
    assert_eq!(status.as_deref(), Some(JobStatus::Running.as_str()));
}

#[test]
fn test_prepare_keeps_existing_state() {
    let store = counter_store();
    store.put(Node::str("last_string", "5"), VALUE).unwrap();
    let job = JobRecord::issue("counter-1", "counter", "/products/counter");
    CounterTask::prepare(&store, JOB, &job).unwrap();
    assert_eq!(value(&store), "5");
}

#[tokio::test(start_paused = true)]
async fn test_spawned_counter_advances_once_per_poll() {
    let store = counter_store();
    let worker = Worker::new(
        WorkerSpec::new("counter-1", "counter", JOB)
            .with_priority(1)
            .with_poll_interval(Duration::from_millis(100)),
        Arc::clone(&store),
        CounterTask,
    );
    let cancel = CancellationToken::new();
    let mut handle = worker.spawn(cancel.clone());

    handle.wait_for(WorkerState::Running).await.unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;
    // ticks at 0, 100 and 200 ms
    assert_eq!(handle.iterations(), 3);
    assert_eq!(value(&store), "3");

    cancel.cancel();
    handle.join().await.unwrap();
}

//! Replication between stores joined to one memory bus.

use arbor_core::{Node, PathFilter, Pattern, ServiceAddress};
use arbor_store::{LocalStore, ReplicationPolicy, Replicator};
use arbor_transport::{MemoryBus, Transport};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn pat(s: &str) -> Pattern {
    Pattern::parse(s).unwrap()
}

async fn eventually(store: &LocalStore, path: &str) -> Node {
    for _ in 0..200 {
        if let Ok(node) = store.get_copy(path) {
            return node;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("{} never replicated to {}", path, store.name());
}

#[tokio::test]
async fn test_publish_reaches_subscriber() {
    let bus = MemoryBus::new();
    let cancel = CancellationToken::new();

    let a = Arc::new(LocalStore::new(
        "a",
        ReplicationPolicy::local_only().with_publish(PathFilter::new().allow(pat("/jobs/*"))),
    ));
    let b = Arc::new(LocalStore::new(
        "b",
        ReplicationPolicy::local_only().with_subscribe(PathFilter::new().allow(pat("/jobs/*"))),
    ));
    let ra = Replicator::start(
        Arc::clone(&a),
        Arc::new(bus.join(ServiceAddress::new(1, 1, 1))),
        cancel.clone(),
    );
    let rb = Replicator::start(
        Arc::clone(&b),
        Arc::new(bus.join(ServiceAddress::new(1, 1, 2))),
        cancel.clone(),
    );

    let job = Node::dict("demo")
        .with_child(Node::str("status", "ISSUED"))
        .with_child(Node::reference("output_path", "/products/demo"));
    a.put(job.clone(), "/jobs/demo").unwrap();
    a.put(Node::int("hidden", 1), "/private/hidden").unwrap();

    assert_eq!(eventually(&b, "/jobs/demo").await, job);
    assert!(!b.has("/private/hidden"));

    cancel.cancel();
    ra.join().await;
    rb.join().await;
}

#[tokio::test]
async fn test_unsubscribed_paths_are_not_applied() {
    let bus = MemoryBus::new();
    let cancel = CancellationToken::new();

    let a = Arc::new(LocalStore::new("a", ReplicationPolicy::everything()));
    let b = Arc::new(LocalStore::new(
        "b",
        ReplicationPolicy::local_only()
            .with_subscribe(PathFilter::from_lists(["/*"], ["/components/*"]).unwrap()),
    ));
    let _ra = Replicator::start(
        Arc::clone(&a),
        Arc::new(bus.join(ServiceAddress::new(1, 1, 1))),
        cancel.clone(),
    );
    let _rb = Replicator::start(
        Arc::clone(&b),
        Arc::new(bus.join(ServiceAddress::new(1, 1, 2))),
        cancel.clone(),
    );

    a.put(Node::dict("a"), "/components/a").unwrap();
    a.put(Node::int("marker", 1), "/marker").unwrap();

    eventually(&b, "/marker").await;
    assert!(!b.has("/components/a"));
    assert_eq!(b.stats().remote_rejected, 1);
    cancel.cancel();
}

#[tokio::test]
async fn test_late_joiner_fetches_with_pre_get() {
    let bus = MemoryBus::new();
    let cancel = CancellationToken::new();

    let a = Arc::new(LocalStore::new("a", ReplicationPolicy::everything()));
    let _ra = Replicator::start(
        Arc::clone(&a),
        Arc::new(bus.join(ServiceAddress::new(1, 1, 1))),
        cancel.clone(),
    );
    a.put(Node::str("last_string", "8"), "/products/counter/last_string").unwrap();

    let b = Arc::new(LocalStore::new(
        "b",
        ReplicationPolicy::local_only()
            .with_subscribe(PathFilter::new().allow(pat("/products/*")))
            .with_pre_get(pat("/products/*")),
    ));
    let _rb = Replicator::start(
        Arc::clone(&b),
        Arc::new(bus.join(ServiceAddress::new(1, 1, 2))),
        cancel.clone(),
    );

    let node = eventually(&b, "/products/counter/last_string").await;
    assert_eq!(node.as_str(), Some("8"));
    cancel.cancel();
}

#[tokio::test]
async fn test_garbage_on_the_wire_is_dropped() {
    let bus = MemoryBus::new();
    let cancel = CancellationToken::new();

    let b = Arc::new(LocalStore::new("b", ReplicationPolicy::everything()));
    let _rb = Replicator::start(
        Arc::clone(&b),
        Arc::new(bus.join(ServiceAddress::new(1, 1, 2))),
        cancel.clone(),
    );
    let a = Arc::new(LocalStore::new("a", ReplicationPolicy::everything()));
    let raw = bus.join(ServiceAddress::new(1, 1, 3));
    let _ra = Replicator::start(
        Arc::clone(&a),
        Arc::new(bus.join(ServiceAddress::new(1, 1, 1))),
        cancel.clone(),
    );

    raw.send(Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef])).await.unwrap();
    a.put(Node::int("after", 1), "/after").unwrap();

    eventually(&b, "/after").await;
    assert_eq!(b.stats().malformed, 1);
    cancel.cancel();
}

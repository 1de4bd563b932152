//! A counter and a persistence component sharing one memory bus.

use arbor_core::{Configuration, CoreResult, Node};
use arbor_persist::DataDirectory;
use arbor_runtime::{Component, ComponentSettings, Role, assemble, open_transport};
use arbor_transport::MemoryBus;
use std::path::Path;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const COUNTER: &str = "\
component.name=counter-1
component.type=counter
component.priority=1
address.cluster=1
address.instance=0
address.component=1
store.publish=/jobs/*,/products/*,/components/*
store.subscribe=/components/*
worker.poll_ms=100
heartbeat.period_ms=200
";

fn persist_config(data_dir: &Path) -> Configuration {
    let (mut config, _) = Configuration::parse(
        "\
component.name=persist
component.type=persist
address.cluster=1
address.instance=0
address.component=9
store.publish=/components/*
store.subscribe=/*
store.pre_get=/*
heartbeat.period_ms=200
persist.enabled=1
persist.period_ms=1000
",
    );
    config.set("persist.data_dir", data_dir.display().to_string());
    config
}

fn text_at(node: &Node, path: &str) -> Option<String> {
    node.lookup_path(path).and_then(Node::as_str).map(str::to_string)
}

async fn launch(
    bus: &MemoryBus,
    config: &Configuration,
    role: Role,
) -> (Component, CancellationToken) {
    let settings = ComponentSettings::from_config(config).unwrap();
    let transport = open_transport(&settings, bus).await.unwrap();
    (assemble(role, settings, transport), CancellationToken::new())
}

fn spawn(component: Component, cancel: &CancellationToken) -> JoinHandle<CoreResult<()>> {
    tokio::spawn(component.run(cancel.clone()))
}

#[tokio::test(start_paused = true)]
async fn test_counter_progress_is_replicated_and_persisted() {
    let tmp = tempfile::tempdir().unwrap();
    let bus = MemoryBus::new();

    let (persist, persist_cancel) = launch(&bus, &persist_config(tmp.path()), Role::Persist).await;
    let (counter_config, _) = Configuration::parse(COUNTER);
    let (counter, counter_cancel) = launch(&bus, &counter_config, Role::Counter).await;

    let persist_store = persist.store();
    let persist_members = persist.membership();
    let counter_store = counter.store();

    let persist_task = spawn(persist, &persist_cancel);
    let counter_task = spawn(counter, &counter_cancel);

    // Off the 100 ms tick grid so no worker tick races the cancellation
    tokio::time::sleep(Duration::from_millis(2550)).await;

    let replicated = persist_store.snapshot();
    assert_eq!(text_at(&replicated, "/jobs/counter/status").as_deref(), Some("RUNNING"));
    assert!(text_at(&replicated, "/products/counter/last_string").is_some());
    assert!(persist_members.is_alive("counter-1"));

    counter_cancel.cancel();
    counter_task.await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;

    let last = text_at(&counter_store.snapshot(), "/products/counter/last_string");
    assert_eq!(text_at(&persist_store.snapshot(), "/products/counter/last_string"), last);

    persist_cancel.cancel();
    persist_task.await.unwrap().unwrap();

    let recovered = DataDirectory::new(tmp.path(), "arbor").get_latest().unwrap().unwrap();
    assert_eq!(text_at(&recovered.root, "/products/counter/last_string"), last);
    assert_eq!(
        recovered.root.lookup_path("/jobs/counter"),
        persist_store.snapshot().lookup_path("/jobs/counter")
    );
}

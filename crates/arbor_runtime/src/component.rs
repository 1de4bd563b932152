//! Component assembly and lifecycle.
//!
//! Start order:
//! 1. persistence (recovery, first snapshot, writer),
//! 2. component registration under `/components`,
//! 3. pre-start hooks,
//! 4. replication,
//! 5. heartbeat beacon and checker,
//! 6. job dispatcher,
//! 7. workers.
//!
//! Everything then runs until the cancellation token fires and is joined
//! in reverse order.

use crate::ComponentSettings;
use arbor_cluster::{ComponentRecord, HeartbeatMonitor, Membership};
use arbor_core::CoreResult;
use arbor_jobs::{JobDispatcher, Worker, WorkerHandle, WorkerSpec, WorkerTask};
use arbor_persist::{PersistConfig, Persistence};
use arbor_store::{LocalStore, Replicator};
use arbor_transport::Transport;
use futures::future::join_all;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type PreStart = Box<dyn FnOnce(&LocalStore) -> CoreResult<()> + Send>;

/// One service process: a store plus everything attached to it
pub struct Component {
    settings: ComponentSettings,
    store: Arc<LocalStore>,
    transport: Arc<dyn Transport>,
    heartbeat: Arc<HeartbeatMonitor>,
    pre_start: Vec<PreStart>,
    workers: Vec<Worker>,
}

impl Component {
    /// Build the store and heartbeat for `settings` on `transport`
    #[must_use]
    pub fn new(settings: ComponentSettings, transport: Arc<dyn Transport>) -> Self {
        let store = Arc::new(LocalStore::new(settings.name.clone(), settings.policy.clone()));
        let record = ComponentRecord::new(
            settings.name.clone(),
            settings.service_type.clone(),
            settings.priority,
        );
        let heartbeat =
            Arc::new(HeartbeatMonitor::new(Arc::clone(&store), record, settings.heartbeat));
        Self {
            settings,
            store,
            transport,
            heartbeat,
            pre_start: Vec::new(),
            workers: Vec::new(),
        }
    }

    /// Settings in use
    #[must_use]
    pub fn settings(&self) -> &ComponentSettings {
        &self.settings
    }

    /// The component's store
    #[must_use]
    pub fn store(&self) -> Arc<LocalStore> {
        Arc::clone(&self.store)
    }

    /// Peer table fed by the heartbeat
    #[must_use]
    pub fn membership(&self) -> Arc<Membership> {
        self.heartbeat.membership()
    }

    /// Run `hook` once the component is registered and before replication
    /// starts. Typically issues jobs and seeds outputs.
    #[must_use]
    pub fn on_pre_start<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&LocalStore) -> CoreResult<()> + Send + 'static,
    {
        self.pre_start.push(Box::new(hook));
        self
    }

    /// Worker spec for `job_path` carrying this component's identity,
    /// priority and poll interval
    #[must_use]
    pub fn worker_spec(&self, job_path: &str) -> WorkerSpec {
        WorkerSpec::new(self.settings.name.clone(), self.settings.service_type.clone(), job_path)
            .with_priority(self.settings.priority)
            .with_poll_interval(self.settings.poll_interval)
    }

    /// Attach a worker running `task`
    #[must_use]
    pub fn worker(mut self, spec: WorkerSpec, task: impl WorkerTask + 'static) -> Self {
        let spec = spec.with_component(self.settings.name.clone());
        self.workers.push(Worker::new(spec, Arc::clone(&self.store), task));
        self
    }

    /// Journal the store to disk
    #[must_use]
    pub fn with_persistence(mut self, config: PersistConfig) -> Self {
        self.settings.persist = Some(config);
        self
    }

    /// Start everything, wait for `cancel`, then stop everything
    ///
    /// # Errors
    ///
    /// Returns the first startup error: persistence that cannot open its
    /// directory, or a registration or pre-start write that fails
    pub async fn run(self, cancel: CancellationToken) -> CoreResult<()> {
        let Self {
            settings,
            store,
            transport,
            heartbeat,
            pre_start,
            workers,
        } = self;
        info!(
            component = %settings.name,
            service_type = %settings.service_type,
            address = %settings.address,
            workers = workers.len(),
            "component starting"
        );

        let persistence = match settings.persist.clone() {
            Some(config) => {
                Some(Persistence::init(config, Arc::clone(&store))?.start(cancel.clone()))
            }
            None => None,
        };

        heartbeat.register()?;
        for hook in pre_start {
            hook(&store)?;
        }

        let replicator = Replicator::start(Arc::clone(&store), transport, cancel.clone());
        let beacon = heartbeat.start(cancel.clone());
        let dispatcher = JobDispatcher::new(
            settings.name.clone(),
            Arc::clone(&store),
            heartbeat.membership(),
            settings.heartbeat.period,
        )
        .spawn(cancel.clone());
        let handles: Vec<WorkerHandle> =
            workers.into_iter().map(|w| w.spawn(cancel.clone())).collect();

        info!(component = %settings.name, "component running");
        cancel.cancelled().await;
        info!(component = %settings.name, "component stopping");

        for result in join_all(handles.into_iter().map(WorkerHandle::join)).await {
            if let Err(e) = result {
                warn!(component = %settings.name, error = %e, "worker ended with error");
            }
        }
        if let Err(e) = dispatcher.await {
            warn!(component = %settings.name, error = %e, "dispatcher panicked");
        }
        beacon.join().await;
        replicator.join().await;
        if let Some(persistence) = persistence {
            persistence.join().await;
        }

        debug!(component = %settings.name, stats = ?store.stats(), "final store counters");
        info!(component = %settings.name, "component stopped");
        Ok(())
    }
}

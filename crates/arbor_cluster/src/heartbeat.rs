//! Liveness beacon and peer failure detection.
//!
//! The beacon rewrites this component's record with an incremented beat
//! every period. A callback on `/components/*` feeds every record that
//! reaches the store into the [`Membership`] table, and the checker marks
//! peers whose beat has not changed for `period * failure_multiple`.
//! Detection is advisory: nothing here acts on a failure beyond logging.

use crate::{COMPONENTS_ROOT, ComponentRecord, Membership, Transition};
use arbor_core::{CoreResult, MIN_PERIOD, Node, Pattern, join_path, split_path};
use arbor_store::{LocalStore, StoreEvent};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Heartbeat timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Beacon period
    pub period: Duration,
    /// Missed periods before a peer is failed
    pub failure_multiple: u32,
}

impl HeartbeatConfig {
    /// Age at which a peer counts as failed
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.period * self.failure_multiple.max(1)
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(1),
            failure_multiple: 3,
        }
    }
}

/// Publishes this component's record and watches everyone else's
pub struct HeartbeatMonitor {
    store: Arc<LocalStore>,
    record: Mutex<ComponentRecord>,
    membership: Arc<Membership>,
    config: HeartbeatConfig,
}

impl HeartbeatMonitor {
    /// Create a monitor for `record` on `store`. Periods below
    /// [`MIN_PERIOD`] are raised to it.
    #[must_use]
    pub fn new(
        store: Arc<LocalStore>,
        record: ComponentRecord,
        mut config: HeartbeatConfig,
    ) -> Self {
        config.period = config.period.max(MIN_PERIOD);
        let membership = Arc::new(Membership::new(record.service_name.clone(), config.timeout()));
        Self {
            store,
            record: Mutex::new(record),
            membership,
            config,
        }
    }

    /// Peer table
    #[must_use]
    pub fn membership(&self) -> Arc<Membership> {
        Arc::clone(&self.membership)
    }

    /// Current record of this component
    #[must_use]
    pub fn record(&self) -> ComponentRecord {
        self.record.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Start watching `/components` and publish this component's record
    ///
    /// # Errors
    ///
    /// Returns the store error if the record cannot be written
    pub fn register(&self) -> CoreResult<()> {
        let membership = Arc::clone(&self.membership);
        let store = Arc::downgrade(&self.store);
        self.store
            .register_callback(Pattern::parse("/components/*")?, move |event| {
                observe_event(&membership, &store, event);
            });

        let record = self.record();
        info!(
            component = %record.service_name,
            service_type = %record.service_type,
            priority = record.priority,
            "registering component"
        );
        self.store.put(record.to_node(), &record.path())
    }

    /// Publish the record with the next beat
    ///
    /// # Errors
    ///
    /// Returns the store error if the record cannot be written
    pub fn beat(&self) -> CoreResult<()> {
        let record = {
            let mut record = self.record.lock().unwrap_or_else(PoisonError::into_inner);
            record.beat = record.beat.wrapping_add(1);
            record.clone()
        };
        self.store.put(record.to_node(), &record.path())
    }

    /// Spawn the beacon and the checker
    pub fn start(self: &Arc<Self>, cancel: CancellationToken) -> HeartbeatTasks {
        let beacon = {
            let monitor = Arc::clone(self);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let period = monitor.config.period;
                let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        _ = ticker.tick() => {
                            if let Err(e) = monitor.beat() {
                                warn!(error = %e, "heartbeat write failed");
                            }
                        }
                    }
                }
                debug!("heartbeat beacon stopped");
            })
        };

        let checker = {
            let membership = Arc::clone(&self.membership);
            let period = self.config.period;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        _ = ticker.tick() => {
                            for name in membership.check(Instant::now()) {
                                warn!(
                                    peer = %name,
                                    timeout_ms = membership.timeout().as_millis() as u64,
                                    "peer heartbeat overdue, marking failed"
                                );
                            }
                        }
                    }
                }
                debug!("heartbeat checker stopped");
            })
        };

        HeartbeatTasks { beacon, checker }
    }
}

/// Running heartbeat tasks
pub struct HeartbeatTasks {
    beacon: JoinHandle<()>,
    checker: JoinHandle<()>,
}

impl HeartbeatTasks {
    /// Wait for both tasks after cancellation
    pub async fn join(self) {
        for (task, handle) in [("beacon", self.beacon), ("checker", self.checker)] {
            if let Err(e) = handle.await {
                warn!(task, error = %e, "heartbeat task panicked");
            }
        }
    }
}

fn observe_event(membership: &Membership, store: &Weak<LocalStore>, event: &StoreEvent<'_>) {
    let segments = split_path(event.path);
    let now = Instant::now();
    match segments.len() {
        0 => {
            if let Some(all) = event.node.child(&COMPONENTS_ROOT[1..]) {
                observe_all(membership, all, now);
            }
        }
        1 => observe_all(membership, event.node, now),
        2 => observe_one(membership, event.node, now),
        _ => {
            let Some(store) = store.upgrade() else {
                return;
            };
            let path = join_path(COMPONENTS_ROOT, segments[1]);
            if let Ok(node) = store.get_copy(&path) {
                observe_one(membership, &node, now);
            }
        }
    }
}

fn observe_all(membership: &Membership, records: &Node, now: Instant) {
    if let Some(children) = records.children() {
        for node in children.values() {
            observe_one(membership, node, now);
        }
    }
}

fn observe_one(membership: &Membership, node: &Node, now: Instant) {
    let record = match ComponentRecord::from_node(node) {
        Ok(record) => record,
        Err(e) => {
            debug!(entry = %node.name(), error = %e, "ignoring incomplete component record");
            return;
        }
    };
    match membership.observe(&record, now) {
        Some(Transition::Joined(name)) => {
            info!(peer = %name, service_type = %record.service_type, "component joined");
        }
        Some(Transition::Recovered(name)) => info!(peer = %name, "peer heartbeat resumed"),
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_store::ReplicationPolicy;

    fn store() -> Arc<LocalStore> {
        Arc::new(LocalStore::new("me", ReplicationPolicy::local_only()))
    }

    #[test]
    fn test_timeout() {
        let config = HeartbeatConfig {
            period: Duration::from_millis(200),
            failure_multiple: 3,
        };
        assert_eq!(config.timeout(), Duration::from_millis(600));
    }

    #[tokio::test]
    async fn test_register_observes_self() {
        let store = store();
        let monitor = HeartbeatMonitor::new(
            Arc::clone(&store),
            ComponentRecord::new("me", "counter", 1),
            HeartbeatConfig::default(),
        );
        monitor.register().unwrap();

        assert!(store.has("/components/me/beat"));
        assert_eq!(monitor.membership().live_of_type("counter").len(), 1);
    }

    #[tokio::test]
    async fn test_records_seen_through_any_write_shape() {
        let store = store();
        let monitor = HeartbeatMonitor::new(
            Arc::clone(&store),
            ComponentRecord::new("me", "counter", 1),
            HeartbeatConfig::default(),
        );
        monitor.register().unwrap();

        let peer = ComponentRecord::new("peer", "persist", 2);
        store
            .put(Node::dict("components").with_child(peer.to_node()), "/components")
            .unwrap();
        assert!(monitor.membership().get("peer").is_some());

        store.put(Node::int("beat", 7), "/components/peer/beat").unwrap();
        assert_eq!(monitor.membership().get("peer").map(|m| m.beat), Some(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_beat_advances() {
        let store = store();
        let monitor = Arc::new(HeartbeatMonitor::new(
            Arc::clone(&store),
            ComponentRecord::new("me", "counter", 1),
            HeartbeatConfig {
                period: Duration::from_millis(100),
                failure_multiple: 3,
            },
        ));
        monitor.register().unwrap();
        let cancel = CancellationToken::new();
        let tasks = monitor.start(cancel.clone());

        tokio::time::sleep(Duration::from_millis(350)).await;
        let beat = store.get_with("/components/me/beat", Node::as_int).unwrap();
        assert_eq!(beat, Some(3));

        cancel.cancel();
        tasks.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_period_is_raised() {
        let store = store();
        let monitor = Arc::new(HeartbeatMonitor::new(
            Arc::clone(&store),
            ComponentRecord::new("me", "counter", 1),
            HeartbeatConfig {
                period: Duration::ZERO,
                failure_multiple: 3,
            },
        ));
        assert_eq!(monitor.membership().timeout(), MIN_PERIOD * 3);
        monitor.register().unwrap();
        let cancel = CancellationToken::new();
        let tasks = monitor.start(cancel.clone());

        tokio::time::sleep(Duration::from_millis(5)).await;
        let beat = store.get_with("/components/me/beat", Node::as_int).unwrap();
        assert!(beat.is_some_and(|b| b >= 3), "beat {:?}", beat);

        cancel.cancel();
        tasks.join().await;
    }
}

//! Job monitor of the requesting component.
//!
//! For every live job this component requested, the candidates are the
//! live components offering the requested service type. The job's
//! priority becomes the best (lowest) candidate priority, or the worst
//! when the job is parallel so that every candidate qualifies.

use crate::record::{field, responsible_node};
use crate::{JOBS_ROOT, JobRecord};
use arbor_cluster::Membership;
use arbor_core::{CoreError, CoreResult, MIN_PERIOD, Node, join_path};
use arbor_store::LocalStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Keeps job thresholds in line with membership
pub struct JobDispatcher {
    component: String,
    store: Arc<LocalStore>,
    membership: Arc<Membership>,
    period: Duration,
}

impl JobDispatcher {
    /// Create a dispatcher for jobs requested by `component`
    #[must_use]
    pub fn new(
        component: impl Into<String>,
        store: Arc<LocalStore>,
        membership: Arc<Membership>,
        period: Duration,
    ) -> Self {
        Self {
            component: component.into(),
            store,
            membership,
            period: period.max(MIN_PERIOD),
        }
    }

    /// One pass over `/jobs`; returns how many jobs were rewritten
    ///
    /// # Errors
    ///
    /// Returns the store error if a write fails
    pub fn dispatch_once(&self) -> CoreResult<usize> {
        let jobs = match self.store.get_copy(JOBS_ROOT) {
            Ok(jobs) => jobs,
            Err(CoreError::NotFound { .. }) => return Ok(0),
            Err(e) => return Err(e),
        };
        let Some(children) = jobs.children() else {
            return Ok(0);
        };

        let mut updated = 0;
        for (name, node) in children {
            let job = match JobRecord::from_node(node) {
                Ok(job) => job,
                Err(e) => {
                    debug!(job = %name, error = %e, "skipping malformed job");
                    continue;
                }
            };
            if job.requesting_service_name != self.component || job.status.is_terminal() {
                continue;
            }
            if self.rebalance(&join_path(JOBS_ROOT, name), &job)? {
                updated += 1;
            }
        }
        Ok(updated)
    }

    fn rebalance(&self, path: &str, job: &JobRecord) -> CoreResult<bool> {
        let candidates = self.membership.live_of_type(&job.requested_service_type);
        let priorities = candidates.iter().map(|m| m.priority);
        let threshold = if job.is_parallel { priorities.max() } else { priorities.min() };
        let Some(threshold) = threshold else {
            debug!(job = %path, service_type = %job.requested_service_type, "no live candidates");
            return Ok(false);
        };

        let responsible: Vec<String> = candidates
            .iter()
            .filter(|m| m.priority <= threshold)
            .map(|m| m.name.clone())
            .collect();

        if threshold == job.priority && responsible == job.responsible_services {
            return Ok(false);
        }

        info!(job = %path, threshold, responsible = ?responsible, "reassigning job");
        self.store
            .put(Node::int(field::PRIORITY, threshold), &join_path(path, field::PRIORITY))?;
        self.store.put(
            responsible_node(&responsible),
            &join_path(path, field::RESPONSIBLE_SERVICES),
        )?;
        Ok(true)
    }

    /// Dispatch on every period until cancelled
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = self.dispatch_once() {
                            warn!(component = %self.component, error = %e, "job dispatch failed");
                        }
                    }
                }
            }
            debug!(component = %self.component, "dispatcher stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_cluster::ComponentRecord;
    use arbor_store::ReplicationPolicy;
    use tokio::time::Instant;

    fn setup(parallel: bool) -> (Arc<LocalStore>, Arc<Membership>, JobDispatcher) {
        let store = Arc::new(LocalStore::new("boss", ReplicationPolicy::local_only()));
        let membership = Arc::new(Membership::new("boss", Duration::from_secs(3)));
        let now = Instant::now();
        membership.observe(&ComponentRecord::new("c1", "counter", 3), now);
        membership.observe(&ComponentRecord::new("c2", "counter", 1), now);
        membership.observe(&ComponentRecord::new("p1", "persist", 0), now);

        let mut job = JobRecord::issue("boss", "counter", "/products/counter");
        if parallel {
            job = job.parallel();
        }
        store.put(job.to_node("counter"), "/jobs/counter").unwrap();
        let dispatcher = JobDispatcher::new(
            "boss",
            Arc::clone(&store),
            Arc::clone(&membership),
            Duration::from_secs(1),
        );
        (store, membership, dispatcher)
    }

    fn job(store: &LocalStore) -> JobRecord {
        store.get_with("/jobs/counter", JobRecord::from_node).unwrap().unwrap()
    }

    #[test]
    fn test_best_candidate_selected() {
        let (store, _, dispatcher) = setup(false);
        assert_eq!(dispatcher.dispatch_once().unwrap(), 1);
        let job = job(&store);
        assert_eq!(job.priority, 1);
        assert_eq!(job.responsible_services, vec!["c2".to_string()]);

        // stable once assigned
        assert_eq!(dispatcher.dispatch_once().unwrap(), 0);
    }

    #[test]
    fn test_parallel_admits_everyone() {
        let (store, _, dispatcher) = setup(true);
        dispatcher.dispatch_once().unwrap();
        let job = job(&store);
        assert_eq!(job.priority, 3);
        assert_eq!(job.responsible_services, vec!["c1".to_string(), "c2".to_string()]);
    }

    #[test]
    fn test_failover_to_next_candidate() {
        let (store, membership, dispatcher) = setup(false);
        dispatcher.dispatch_once().unwrap();

        let later = Instant::now() + Duration::from_secs(5);
        membership.observe(
            &ComponentRecord {
                beat: 1,
                ..ComponentRecord::new("c1", "counter", 3)
            },
            later,
        );
        membership.check(later);
        assert!(!membership.is_alive("c2"));

        assert_eq!(dispatcher.dispatch_once().unwrap(), 1);
        assert_eq!(job(&store).priority, 3);
    }

    #[test]
    fn test_foreign_and_finished_jobs_untouched() {
        let (store, _, dispatcher) = setup(false);
        store.put(Node::str("status", "DONE"), "/jobs/counter/status").unwrap();
        store
            .put(JobRecord::issue("someone-else", "counter", "/x").to_node("other"), "/jobs/other")
            .unwrap();
        assert_eq!(dispatcher.dispatch_once().unwrap(), 0);
    }
}

//! Peer table fed by registration records.
//!
//! A peer is alive while its heartbeat counter keeps advancing. A record
//! that does not supersede the last one seen (a republished copy, or an
//! older beat arriving late) neither refreshes nor revives it. A restarted
//! peer announces a later incarnation and is accepted from beat zero.

use crate::ComponentRecord;
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;

/// Liveness of a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberState {
    /// Heartbeat seen within the timeout
    Alive,
    /// Heartbeat overdue
    Failed,
}

/// A known component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// Component name
    pub name: String,
    /// Service type
    pub service_type: String,
    /// Scheduling priority
    pub priority: i32,
    /// Liveness
    pub state: MemberState,
    /// When the beat last advanced
    pub last_seen: Instant,
    /// Last beat seen
    pub beat: i32,
    /// Incarnation of that beat
    pub incarnation: i64,
}

impl Member {
    /// Check if member is alive
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.state == MemberState::Alive
    }
}

/// State change reported by [`Membership::observe`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// First record from this peer
    Joined(String),
    /// A failed peer is beating again
    Recovered(String),
}

/// Known components of the group
pub struct Membership {
    self_name: String,
    timeout: Duration,
    members: RwLock<BTreeMap<String, Member>>,
}

impl Membership {
    /// Create a table for the named component
    #[must_use]
    pub fn new(self_name: impl Into<String>, timeout: Duration) -> Self {
        Self {
            self_name: self_name.into(),
            timeout,
            members: RwLock::new(BTreeMap::new()),
        }
    }

    /// Failure timeout
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Record a registration record seen at `now`
    pub fn observe(&self, record: &ComponentRecord, now: Instant) -> Option<Transition> {
        let mut members = self.members.write().unwrap_or_else(PoisonError::into_inner);
        match members.get_mut(&record.service_name) {
            None => {
                members.insert(
                    record.service_name.clone(),
                    Member {
                        name: record.service_name.clone(),
                        service_type: record.service_type.clone(),
                        priority: record.priority,
                        state: MemberState::Alive,
                        last_seen: now,
                        beat: record.beat,
                        incarnation: record.incarnation,
                    },
                );
                Some(Transition::Joined(record.service_name.clone()))
            }
            Some(member) => {
                if !record.supersedes(member.incarnation, member.beat) {
                    return None;
                }
                member.service_type.clone_from(&record.service_type);
                member.priority = record.priority;
                member.beat = record.beat;
                member.incarnation = record.incarnation;
                member.last_seen = now;
                if member.state == MemberState::Failed {
                    member.state = MemberState::Alive;
                    return Some(Transition::Recovered(record.service_name.clone()));
                }
                None
            }
        }
    }

    /// Mark peers whose beat is overdue at `now`; returns the newly failed
    pub fn check(&self, now: Instant) -> Vec<String> {
        let mut members = self.members.write().unwrap_or_else(PoisonError::into_inner);
        let mut failed = Vec::new();

        for (name, member) in members.iter_mut() {
            if *name == self.self_name || !member.is_alive() {
                continue;
            }
            if now.saturating_duration_since(member.last_seen) > self.timeout {
                member.state = MemberState::Failed;
                failed.push(name.clone());
            }
        }

        failed
    }

    /// Is the named component alive? This component always is.
    #[must_use]
    pub fn is_alive(&self, name: &str) -> bool {
        name == self.self_name
            || self
                .members
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .get(name)
                .is_some_and(Member::is_alive)
    }

    /// Get a member by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Member> {
        self.members
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// All known members, ordered by name
    #[must_use]
    pub fn members(&self) -> Vec<Member> {
        self.members
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Alive members offering `service_type`, ordered by name
    #[must_use]
    pub fn live_of_type(&self, service_type: &str) -> Vec<Member> {
        self.members
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|m| m.service_type == service_type)
            .filter(|m| m.is_alive() || m.name == self.self_name)
            .cloned()
            .collect()
    }
}

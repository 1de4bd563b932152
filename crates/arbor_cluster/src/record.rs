//! Component registration record.

use arbor_core::{CoreError, CoreResult, Node, join_path};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};

/// Subtree holding one record per component
pub const COMPONENTS_ROOT: &str = "/components";

/// What a component announces about itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentRecord {
    /// Unique component name
    pub service_name: String,
    /// Kind of service offered
    pub service_type: String,
    /// Scheduling priority, lower runs first
    pub priority: i32,
    /// Heartbeat counter
    pub beat: i32,
    /// Start stamp of the announcing process; a restart carries a larger
    /// one and starts counting beats again
    pub incarnation: i64,
}

/// Wall-clock milliseconds, strictly increasing within this process
fn next_incarnation() -> i64 {
    static LAST: AtomicI64 = AtomicI64::new(0);
    let now = Utc::now().timestamp_millis();
    let prev = LAST
        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |prev| {
            Some(now.max(prev + 1))
        })
        .unwrap_or_else(|prev| prev);
    now.max(prev + 1)
}

impl ComponentRecord {
    /// Fresh record with beat zero and a new incarnation
    #[must_use]
    pub fn new(
        service_name: impl Into<String>,
        service_type: impl Into<String>,
        priority: i32,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            service_type: service_type.into(),
            priority,
            beat: 0,
            incarnation: next_incarnation(),
        }
    }

    /// Does this record come after the given incarnation and beat? A
    /// later incarnation always does; within one incarnation the beat must
    /// move forward, modulo wrap-around.
    #[must_use]
    pub fn supersedes(&self, incarnation: i64, beat: i32) -> bool {
        match self.incarnation.cmp(&incarnation) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => self.beat.wrapping_sub(beat) > 0,
        }
    }

    /// Store path of this record
    #[must_use]
    pub fn path(&self) -> String {
        join_path(COMPONENTS_ROOT, &self.service_name)
    }

    /// Tree form
    #[must_use]
    pub fn to_node(&self) -> Node {
        Node::dict(self.service_name.clone())
            .with_child(Node::str("service_name", self.service_name.clone()))
            .with_child(Node::str("service_type", self.service_type.clone()))
            .with_child(Node::int("priority", self.priority))
            .with_child(Node::int("beat", self.beat))
            .with_child(Node::str("incarnation", self.incarnation.to_string()))
    }

    /// Read a record back from its tree form
    ///
    /// # Errors
    ///
    /// Returns `Malformed` if a field is missing or has the wrong type
    pub fn from_node(node: &Node) -> CoreResult<Self> {
        let text = |field: &str| {
            node.child(field)
                .and_then(Node::as_str)
                .map(str::to_string)
                .ok_or_else(|| {
                    CoreError::malformed("component record", format!("missing '{}'", field))
                })
        };
        let int = |field: &str| {
            node.child(field)
                .and_then(Node::as_int)
                .ok_or_else(|| {
                    CoreError::malformed("component record", format!("missing '{}'", field))
                })
        };
        Ok(Self {
            service_name: text("service_name")?,
            service_type: text("service_type")?,
            priority: int("priority")?,
            beat: int("beat").unwrap_or(0),
            incarnation: node
                .child("incarnation")
                .and_then(Node::as_str)
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_form() {
        let record = ComponentRecord::new("counter-1", "counter", 2);
        assert_eq!(record.path(), "/components/counter-1");
        assert_eq!(ComponentRecord::from_node(&record.to_node()).unwrap(), record);
    }

    #[test]
    fn test_missing_fields() {
        let node = Node::dict("x").with_child(Node::str("service_name", "x"));
        assert!(ComponentRecord::from_node(&node).is_err());

        let no_beat = Node::dict("x")
            .with_child(Node::str("service_name", "x"))
            .with_child(Node::str("service_type", "t"))
            .with_child(Node::int("priority", 1));
        let parsed = ComponentRecord::from_node(&no_beat).unwrap();
        assert_eq!((parsed.beat, parsed.incarnation), (0, 0));
    }

    #[test]
    fn test_incarnations_increase() {
        let first = ComponentRecord::new("a", "t", 0);
        let second = ComponentRecord::new("a", "t", 0);
        assert!(second.incarnation > first.incarnation);
        assert!(second.supersedes(first.incarnation, first.beat));
        assert!(!first.supersedes(second.incarnation, second.beat));
    }

    #[test]
    fn test_supersedes_within_incarnation() {
        let at = |beat| ComponentRecord {
            beat,
            incarnation: 7,
            ..ComponentRecord::new("a", "t", 0)
        };
        assert!(at(6).supersedes(7, 5));
        assert!(!at(5).supersedes(7, 5));
        assert!(!at(3).supersedes(7, 5));
        assert!(at(i32::MIN).supersedes(7, i32::MAX));
        assert!(at(0).supersedes(6, 40));
    }
}

//! Service addressing.
//!
//! Components are addressed by a (cluster type, instance, component)
//! triple. Messages are multicast within a group, which is the
//! (cluster type, instance) pair.

use serde::{Deserialize, Serialize};

/// Address of one component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceAddress {
    /// Cluster type id
    pub cluster_type: u16,
    /// Cluster instance id
    pub instance: u16,
    /// Component id within the instance
    pub component: u16,
}

impl ServiceAddress {
    /// Create a new address
    #[must_use]
    pub const fn new(cluster_type: u16, instance: u16, component: u16) -> Self {
        Self {
            cluster_type,
            instance,
            component,
        }
    }

    /// Multicast group this address belongs to
    #[must_use]
    pub const fn group(&self) -> (u16, u16) {
        (self.cluster_type, self.instance)
    }

    /// Do both addresses share a multicast group?
    #[must_use]
    pub const fn same_group(&self, other: &ServiceAddress) -> bool {
        self.cluster_type == other.cluster_type && self.instance == other.instance
    }
}

impl std::fmt::Display for ServiceAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.cluster_type, self.instance, self.component)
    }
}

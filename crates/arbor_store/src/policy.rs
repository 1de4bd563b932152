//! Which paths a component publishes, accepts and fetches at startup.

use arbor_core::{Node, PathFilter, Pattern, Value, join_path};

/// Publish/subscribe eligibility of one component
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicationPolicy {
    /// Local writes broadcast to peers
    pub publish: PathFilter,
    /// Remote writes accepted from peers
    pub subscribe: PathFilter,
    /// Subscribed patterns requested from peers at startup
    pub pre_get: Vec<Pattern>,
}

impl ReplicationPolicy {
    /// Policy that neither publishes nor accepts anything
    #[must_use]
    pub fn local_only() -> Self {
        Self::default()
    }

    /// Publish and accept every path
    #[must_use]
    pub fn everything() -> Self {
        Self {
            publish: PathFilter::everything(),
            subscribe: PathFilter::everything(),
            pre_get: Vec::new(),
        }
    }

    /// Replace the publish filter
    #[must_use]
    pub fn with_publish(mut self, filter: PathFilter) -> Self {
        self.publish = filter;
        self
    }

    /// Replace the subscribe filter
    #[must_use]
    pub fn with_subscribe(mut self, filter: PathFilter) -> Self {
        self.subscribe = filter;
        self
    }

    /// Add a startup fetch pattern
    #[must_use]
    pub fn with_pre_get(mut self, pattern: Pattern) -> Self {
        self.pre_get.push(pattern);
        self
    }

    /// Copy of `node` to broadcast for a write at `path`, with denied
    /// descendants removed. `None` if the path is not published.
    #[must_use]
    pub fn outgoing(&self, path: &str, node: &Node) -> Option<Node> {
        if !self.publish.permits(path) {
            return None;
        }
        Some(prune(&self.publish, path, node.clone()))
    }

    /// Copy of a remote `node` to apply at `path`, with denied
    /// descendants removed. `None` if the path is not subscribed.
    #[must_use]
    pub fn incoming(&self, path: &str, node: Node) -> Option<Node> {
        if !self.subscribe.permits(path) {
            return None;
        }
        Some(prune(&self.subscribe, path, node))
    }
}

/// Drop every descendant whose path a deny pattern matches
fn prune(filter: &PathFilter, path: &str, mut node: Node) -> Node {
    if !filter.denied().is_empty() {
        prune_in_place(filter, path, &mut node);
    }
    node
}

fn prune_in_place(filter: &PathFilter, path: &str, node: &mut Node) {
    if let Value::Dict(children) = node.value_mut() {
        children.retain(|name, _| {
            let child_path = join_path(path, name);
            !filter.denied().iter().any(|deny| deny.matches(&child_path))
        });
        for (name, child) in children.iter_mut() {
            prune_in_place(filter, &join_path(path, name), child);
        }
    }
}

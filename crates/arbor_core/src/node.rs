//! The tagged tree value stored in every local store and sent on the wire.
//!
//! A `Node` is a name plus one of four values: a dictionary of named
//! children, a string, a 32-bit integer or a reference (a path string that
//! is never dereferenced by the node itself). Every node except the tree
//! root carries a non-empty name.

use crate::path::split_path;
use crate::{CoreError, CoreResult};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Deepest dictionary nesting accepted from decoders and paths
pub const MAX_DEPTH: usize = 128;

/// Node payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    /// Named children; insertion order is kept for deterministic output
    Dict(#[serde(with = "children_seq")] IndexMap<String, Node>),
    /// Text
    Str(String),
    /// 32-bit integer
    Int(i32),
    /// Path of another node
    Ref(String),
}

impl Value {
    /// Short tag used by the codecs and log output
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Dict(_) => "dict",
            Self::Str(_) => "str",
            Self::Int(_) => "int",
            Self::Ref(_) => "ref",
        }
    }
}

/// A named tree value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    name: String,
    value: Value,
}

impl Node {
    /// Create a node from parts
    #[must_use]
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    /// Empty dictionary
    #[must_use]
    pub fn dict(name: impl Into<String>) -> Self {
        Self::new(name, Value::Dict(IndexMap::new()))
    }

    /// The unnamed tree root
    #[must_use]
    pub fn root() -> Self {
        Self::dict("")
    }

    /// String leaf
    #[must_use]
    pub fn str(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(name, Value::Str(text.into()))
    }

    /// Integer leaf
    #[must_use]
    pub fn int(name: impl Into<String>, value: i32) -> Self {
        Self::new(name, Value::Int(value))
    }

    /// Reference leaf
    #[must_use]
    pub fn reference(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, Value::Ref(path.into()))
    }

    /// Builder-style child insertion; non-dict nodes are returned unchanged
    #[must_use]
    pub fn with_child(mut self, child: Node) -> Self {
        if let Value::Dict(children) = &mut self.value {
            children.insert(child.name.clone(), child);
        }
        self
    }

    /// Node name (empty only for a tree root)
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Node payload
    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Mutable payload
    pub fn value_mut(&mut self) -> &mut Value {
        &mut self.value
    }

    /// Same node under another name
    #[must_use]
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Is this a dictionary?
    #[must_use]
    pub fn is_dict(&self) -> bool {
        matches!(self.value, Value::Dict(_))
    }

    /// String payload
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integer payload
    #[must_use]
    pub fn as_int(&self) -> Option<i32> {
        match self.value {
            Value::Int(v) => Some(v),
            _ => None,
        }
    }

    /// Reference payload
    #[must_use]
    pub fn as_ref_path(&self) -> Option<&str> {
        match &self.value {
            Value::Ref(p) => Some(p),
            _ => None,
        }
    }

    /// Children of a dictionary
    #[must_use]
    pub fn children(&self) -> Option<&IndexMap<String, Node>> {
        match &self.value {
            Value::Dict(c) => Some(c),
            _ => None,
        }
    }

    /// Direct child by name
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children().and_then(|c| c.get(name))
    }

    /// Mutable direct child by name
    pub fn child_mut(&mut self, name: &str) -> Option<&mut Node> {
        match &mut self.value {
            Value::Dict(c) => c.get_mut(name),
            _ => None,
        }
    }

    /// Insert or replace a child, keeping the position of a replaced entry
    ///
    /// # Errors
    ///
    /// Returns `PathConflict` if this node is not a dictionary
    pub fn insert_child(&mut self, child: Node) -> CoreResult<Option<Node>> {
        match &mut self.value {
            Value::Dict(c) => Ok(c.insert(child.name.clone(), child)),
            _ => Err(CoreError::PathConflict {
                path: self.name.clone(),
            }),
        }
    }

    /// Remove a child by name
    pub fn remove_child(&mut self, name: &str) -> Option<Node> {
        match &mut self.value {
            Value::Dict(c) => c.shift_remove(name),
            _ => None,
        }
    }

    /// Descend by path segments
    #[must_use]
    pub fn lookup(&self, segments: &[&str]) -> Option<&Node> {
        segments.iter().try_fold(self, |node, seg| node.child(seg))
    }

    /// Descend by slash-delimited path
    #[must_use]
    pub fn lookup_path(&self, path: &str) -> Option<&Node> {
        self.lookup(&split_path(path))
    }

    /// Mutable descent by path segments
    pub fn lookup_mut(&mut self, segments: &[&str]) -> Option<&mut Node> {
        let mut node = self;
        for seg in segments {
            node = node.child_mut(seg)?;
        }
        Some(node)
    }

    /// Place `node` at `path` below this node, creating intermediate
    /// dictionaries. The node is renamed to the final path segment. An
    /// empty path replaces `self` entirely.
    ///
    /// # Errors
    ///
    /// Returns `PathConflict` when an intermediate node is a leaf and
    /// `InvalidPath` for paths deeper than [`MAX_DEPTH`]
    pub fn insert_at(&mut self, path: &str, node: Node) -> CoreResult<()> {
        let segments = split_path(path);
        if segments.len() > MAX_DEPTH {
            return Err(CoreError::InvalidPath {
                path: path.chars().take(64).collect(),
                reason: format!("more than {} segments", MAX_DEPTH),
            });
        }
        let Some((last, parents)) = segments.split_last() else {
            *self = node;
            return Ok(());
        };

        let mut cursor = self;
        let mut walked = String::new();
        for seg in parents {
            walked.push('/');
            walked.push_str(seg);
            let Value::Dict(children) = &mut cursor.value else {
                return Err(CoreError::PathConflict { path: walked });
            };
            cursor = children
                .entry((*seg).to_string())
                .or_insert_with(|| Node::dict(*seg));
        }

        if !cursor.is_dict() {
            return Err(CoreError::PathConflict {
                path: if walked.is_empty() { "/".to_string() } else { walked },
            });
        }
        cursor.insert_child(node.renamed(*last))?;
        Ok(())
    }

    /// Remove the node at `path`, returning it
    pub fn remove_at(&mut self, path: &str) -> Option<Node> {
        let segments = split_path(path);
        let (last, parents) = segments.split_last()?;
        self.lookup_mut(parents)?.remove_child(last)
    }

    /// Check the naming invariant: every descendant has a non-empty name
    /// without '/', and dictionary keys agree with child names
    ///
    /// # Errors
    ///
    /// Returns `Malformed` describing the first violation
    pub fn validate(&self) -> CoreResult<()> {
        if self.name.contains('/') {
            return Err(CoreError::malformed("node", format!("name '{}' contains '/'", self.name)));
        }
        if let Value::Dict(children) = &self.value {
            for (key, child) in children {
                if child.name.is_empty() {
                    return Err(CoreError::malformed(
                        "node",
                        format!("unnamed child below '{}'", self.name),
                    ));
                }
                if key != &child.name {
                    return Err(CoreError::malformed(
                        "node",
                        format!("key '{}' holds child '{}'", key, child.name),
                    ));
                }
                child.validate()?;
            }
        }
        Ok(())
    }

    /// Number of nodes in this subtree, including itself
    #[must_use]
    pub fn entry_count(&self) -> usize {
        1 + self
            .children()
            .map(|c| c.values().map(Node::entry_count).sum())
            .unwrap_or(0)
    }

    /// Visit every node with its absolute path, parents before children
    pub fn walk<F: FnMut(&str, &Node)>(&self, base: &str, f: &mut F) {
        f(base, self);
        if let Value::Dict(children) = &self.value {
            for child in children.values() {
                let path = crate::path::join_path(base, &child.name);
                child.walk(&path, f);
            }
        }
    }
}

/// Dictionary children travel as a sequence of nodes; keys are rebuilt
/// from the child names on decode. Decoding counts open dictionaries per
/// thread and refuses to go past [`MAX_DEPTH`](super::MAX_DEPTH).
mod children_seq {
    use super::{MAX_DEPTH, Node};
    use indexmap::IndexMap;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::cell::Cell;

    thread_local! {
        static DEPTH: Cell<usize> = const { Cell::new(0) };
    }

    struct DepthGuard;

    impl DepthGuard {
        fn enter() -> Option<Self> {
            DEPTH.with(|depth| {
                let next = depth.get() + 1;
                if next > MAX_DEPTH {
                    return None;
                }
                depth.set(next);
                Some(DepthGuard)
            })
        }
    }

    impl Drop for DepthGuard {
        fn drop(&mut self) {
            DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
        }
    }

    pub fn serialize<S: Serializer>(
        map: &IndexMap<String, Node>,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        s.collect_seq(map.values())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<IndexMap<String, Node>, D::Error> {
        let _guard = DepthGuard::enter().ok_or_else(|| {
            D::Error::custom(format!("dictionaries nested deeper than {}", MAX_DEPTH))
        })?;
        let nodes = Vec::<Node>::deserialize(d)?;
        let mut map = IndexMap::with_capacity(nodes.len());
        for node in nodes {
            if map.contains_key(&node.name) {
                return Err(D::Error::custom(format!("duplicate child '{}'", node.name)));
            }
            map.insert(node.name.clone(), node);
        }
        Ok(map)
    }
}

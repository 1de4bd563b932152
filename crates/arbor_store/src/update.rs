//! Replication message.

use arbor_codec::{CodecResult, Wire};
use arbor_core::{CoreError, CoreResult, Node, Pattern, normalize_path};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a replication message asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    /// A node was written at the path
    Put,
    /// The sender wants the subtrees matching the pattern
    Get,
}

impl Command {
    /// Wire spelling used in logs and callbacks
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Command::Put => "PUT",
            Command::Get => "GET",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message exchanged between replicas
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    /// Put or Get
    pub command: Command,
    /// Concrete path for Put, pattern for Get
    pub path: String,
    /// Written value, present for Put
    pub node: Option<Node>,
    /// Name of the sending component
    pub origin: String,
}

impl Update {
    /// A write notification
    #[must_use]
    pub fn put(path: &str, node: Node, origin: impl Into<String>) -> Self {
        Self {
            command: Command::Put,
            path: normalize_path(path),
            node: Some(node),
            origin: origin.into(),
        }
    }

    /// A request for matching subtrees
    #[must_use]
    pub fn get(pattern: &Pattern, origin: impl Into<String>) -> Self {
        Self {
            command: Command::Get,
            path: pattern.to_string(),
            node: None,
            origin: origin.into(),
        }
    }

    /// The pattern of a Get
    ///
    /// # Errors
    ///
    /// Returns `InvalidPath` if the path is not a pattern
    pub fn pattern(&self) -> CoreResult<Pattern> {
        Pattern::parse(&self.path)
    }

    /// The node of a Put
    ///
    /// # Errors
    ///
    /// Returns `Malformed` if a Put carries no node
    pub fn take_node(&mut self) -> CoreResult<Node> {
        self.node
            .take()
            .ok_or_else(|| {
                CoreError::malformed("update", format!("PUT {} without a node", self.path))
            })
    }
}

impl Wire for Update {
    fn from_wire(bytes: &[u8]) -> CodecResult<Self> {
        let update: Update = arbor_codec::from_bytes(bytes)?;
        if let Some(node) = &update.node {
            node.validate()
                .map_err(|e| arbor_codec::CodecError::Malformed {
                    format: "binary",
                    reason: e.to_string(),
                })?;
        }
        Ok(update)
    }
}

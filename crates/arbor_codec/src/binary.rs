//! Binary wire format.
//!
//! Uses postcard for byte-stable encoding. A node encodes as its name,
//! the variant tag and the payload; dictionaries encode their children
//! as a sequence, so the format is self-describing per node.

use crate::{CodecError, CodecResult};
use arbor_core::Node;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Encode any serializable value
///
/// # Errors
///
/// Returns `Malformed` if the value cannot be represented
pub fn to_bytes<T: Serialize + ?Sized>(value: &T) -> CodecResult<Vec<u8>> {
    postcard::to_allocvec(value).map_err(CodecError::binary)
}

/// Decode a value, rejecting trailing bytes
///
/// # Errors
///
/// Returns `Malformed` if the buffer is not exactly one encoded value
pub fn from_bytes<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    let (value, rest) = postcard::take_from_bytes::<T>(bytes).map_err(CodecError::binary)?;
    if !rest.is_empty() {
        return Err(CodecError::binary(format!("{} trailing bytes", rest.len())));
    }
    Ok(value)
}

/// Encode a node
///
/// # Errors
///
/// Returns `Malformed` if the node cannot be represented
pub fn encode(node: &Node) -> CodecResult<Vec<u8>> {
    to_bytes(node)
}

/// Decode a node and check its naming invariant
///
/// # Errors
///
/// Returns `Malformed` for undecodable buffers or ill-formed trees
pub fn decode(bytes: &[u8]) -> CodecResult<Node> {
    let node: Node = from_bytes(bytes)?;
    node.validate().map_err(CodecError::binary)?;
    Ok(node)
}

/// Types carried on the wire or in logs
pub trait Wire: Serialize + DeserializeOwned {
    /// Encode to wire bytes
    ///
    /// # Errors
    ///
    /// Returns `Malformed` if the value cannot be represented
    fn to_wire(&self) -> CodecResult<Vec<u8>> {
        to_bytes(self)
    }

    /// Decode from wire bytes
    ///
    /// # Errors
    ///
    /// Returns `Malformed` if the bytes are not a valid value
    fn from_wire(bytes: &[u8]) -> CodecResult<Self>
    where
        Self: Sized,
    {
        from_bytes(bytes)
    }
}

impl Wire for Node {
    fn from_wire(bytes: &[u8]) -> CodecResult<Self> {
        decode(bytes)
    }
}

//! ARBOR Transport
//!
//! Point-to-multipoint delivery of opaque buffers between components.
//! A component sends to its whole group (cluster type + instance) and
//! receives everything its group peers send.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod frame;
pub mod memory;
pub mod udp;

pub use error::{TransportError, TransportResult};
pub use frame::Frame;
pub use memory::{MemoryBus, MemoryTransport};
pub use udp::{MAX_DATAGRAM, UdpTransport};

use arbor_core::ServiceAddress;
use async_trait::async_trait;
use bytes::Bytes;

/// Group messaging endpoint of one component
#[async_trait]
pub trait Transport: Send + Sync {
    /// Address this endpoint sends from
    fn address(&self) -> ServiceAddress;

    /// Multicast a buffer to every peer in the group
    ///
    /// # Errors
    ///
    /// Returns error if the buffer cannot be handed to the network
    async fn send(&self, payload: Bytes) -> TransportResult<()>;

    /// Wait for the next buffer from a group peer
    ///
    /// # Errors
    ///
    /// Returns `Closed` once no further buffers can arrive
    async fn recv(&self) -> TransportResult<Bytes>;
}

//! In-process transport.
//!
//! Every endpoint joined to a [`MemoryBus`] sees every frame sent on it
//! and filters by group, the same way a multicast socket would.

use crate::{Frame, Transport, TransportError, TransportResult};
use arbor_core::ServiceAddress;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, warn};

/// Default number of frames buffered per endpoint
pub const DEFAULT_CAPACITY: usize = 1024;

/// Shared in-process medium
#[derive(Clone)]
pub struct MemoryBus {
    sender: broadcast::Sender<Frame>,
}

impl MemoryBus {
    /// Create a bus with the default capacity
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a bus buffering up to `capacity` frames per endpoint
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Attach an endpoint. It receives frames sent after this call.
    #[must_use]
    pub fn join(&self, address: ServiceAddress) -> MemoryTransport {
        debug!(%address, "joined memory bus");
        MemoryTransport {
            address,
            sender: self.sender.clone(),
            receiver: Mutex::new(self.sender.subscribe()),
        }
    }

    /// Number of attached endpoints
    #[must_use]
    pub fn endpoints(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Endpoint on a [`MemoryBus`]
pub struct MemoryTransport {
    address: ServiceAddress,
    sender: broadcast::Sender<Frame>,
    receiver: Mutex<broadcast::Receiver<Frame>>,
}

#[async_trait]
impl Transport for MemoryTransport {
    fn address(&self) -> ServiceAddress {
        self.address
    }

    async fn send(&self, payload: Bytes) -> TransportResult<()> {
        self.sender
            .send(Frame::new(self.address, payload))
            .map(|_| ())
            .map_err(|_| TransportError::Closed)
    }

    async fn recv(&self) -> TransportResult<Bytes> {
        let mut receiver = self.receiver.lock().await;
        loop {
            match receiver.recv().await {
                Ok(frame) if frame.is_for(&self.address) => return Ok(frame.payload),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(address = %self.address, skipped, "memory endpoint lagged, frames lost");
                }
                Err(broadcast::error::RecvError::Closed) => return Err(TransportError::Closed),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_group_multicast() {
        let bus = MemoryBus::new();
        let a = bus.join(ServiceAddress::new(1, 1, 1));
        let b = bus.join(ServiceAddress::new(1, 1, 2));
        let c = bus.join(ServiceAddress::new(1, 1, 3));
        assert_eq!(bus.endpoints(), 3);

        a.send(Bytes::from_static(b"ping")).await.unwrap();
        assert_eq!(b.recv().await.unwrap(), Bytes::from_static(b"ping"));
        assert_eq!(c.recv().await.unwrap(), Bytes::from_static(b"ping"));
    }

    #[tokio::test]
    async fn test_sender_and_other_groups_filtered() {
        let bus = MemoryBus::new();
        let a = bus.join(ServiceAddress::new(1, 1, 1));
        let b = bus.join(ServiceAddress::new(1, 1, 2));
        let stranger = bus.join(ServiceAddress::new(1, 9, 1));

        stranger.send(Bytes::from_static(b"elsewhere")).await.unwrap();
        a.send(Bytes::from_static(b"first")).await.unwrap();
        b.send(Bytes::from_static(b"reply")).await.unwrap();

        assert_eq!(a.recv().await.unwrap(), Bytes::from_static(b"reply"));
        assert_eq!(b.recv().await.unwrap(), Bytes::from_static(b"first"));

        let nothing = tokio::time::timeout(Duration::from_millis(50), stranger.recv()).await;
        assert!(nothing.is_err());
    }

    #[tokio::test]
    async fn test_order_preserved_per_sender() {
        let bus = MemoryBus::new();
        let a = bus.join(ServiceAddress::new(1, 1, 1));
        let b = bus.join(ServiceAddress::new(1, 1, 2));
        for i in 0..10u8 {
            a.send(Bytes::from(vec![i])).await.unwrap();
        }
        for i in 0..10u8 {
            assert_eq!(b.recv().await.unwrap(), Bytes::from(vec![i]));
        }
    }

    #[tokio::test]
    async fn test_lagging_endpoint_keeps_receiving() {
        let bus = MemoryBus::with_capacity(2);
        let a = bus.join(ServiceAddress::new(1, 1, 1));
        let b = bus.join(ServiceAddress::new(1, 1, 2));
        for i in 0..5u8 {
            a.send(Bytes::from(vec![i])).await.unwrap();
        }
        assert_eq!(b.recv().await.unwrap(), Bytes::from(vec![3]));
        assert_eq!(b.recv().await.unwrap(), Bytes::from(vec![4]));
    }
}

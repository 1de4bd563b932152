//! UDP transport with a static peer list.
//!
//! Each datagram is one encoded [`Frame`]. Frames from this endpoint or
//! from another group are discarded on receipt, as are datagrams that do
//! not decode. A send goes to every peer; it fails only when no peer
//! accepted the datagram.

use crate::{Frame, Transport, TransportError, TransportResult};
use arbor_core::ServiceAddress;
use async_trait::async_trait;
use bytes::Bytes;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

/// Largest datagram sent or accepted
pub const MAX_DATAGRAM: usize = 64 * 1024;

/// UDP endpoint
pub struct UdpTransport {
    address: ServiceAddress,
    socket: UdpSocket,
    peers: Vec<SocketAddr>,
}

impl UdpTransport {
    /// Bind a socket and remember the peers to send to
    ///
    /// # Errors
    ///
    /// Returns `Bind` if the socket cannot be bound
    pub async fn bind(
        address: ServiceAddress,
        bind: SocketAddr,
        peers: Vec<SocketAddr>,
    ) -> TransportResult<Self> {
        let socket = UdpSocket::bind(bind).await.map_err(|e| TransportError::Bind {
            address: bind.to_string(),
            reason: e.to_string(),
        })?;
        info!(%address, local = %bind, peers = peers.len(), "udp transport bound");
        Ok(Self {
            address,
            socket,
            peers,
        })
    }

    /// Actual bound socket address
    ///
    /// # Errors
    ///
    /// Returns `Bind` if the socket has no local address
    pub fn local_addr(&self) -> TransportResult<SocketAddr> {
        self.socket.local_addr().map_err(|e| TransportError::Bind {
            address: "unknown".to_string(),
            reason: e.to_string(),
        })
    }

    /// Add a peer after binding
    pub fn add_peer(&mut self, peer: SocketAddr) {
        if !self.peers.contains(&peer) {
            self.peers.push(peer);
        }
    }
}

#[async_trait]
impl Transport for UdpTransport {
    fn address(&self) -> ServiceAddress {
        self.address
    }

    async fn send(&self, payload: Bytes) -> TransportResult<()> {
        let datagram = Frame::new(self.address, payload).encode()?;
        if datagram.len() > MAX_DATAGRAM {
            return Err(TransportError::TooLarge {
                size: datagram.len(),
                limit: MAX_DATAGRAM,
            });
        }
        let mut failures = Vec::new();
        for peer in &self.peers {
            if let Err(e) = self.socket.send_to(&datagram, peer).await {
                warn!(%peer, error = %e, "udp send to peer failed");
                failures.push(format!("{}: {}", peer, e));
            }
        }
        if !self.peers.is_empty() && failures.len() == self.peers.len() {
            return Err(TransportError::Send(failures.join("; ")));
        }
        Ok(())
    }

    async fn recv(&self) -> TransportResult<Bytes> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let (len, from) = self
                .socket
                .recv_from(&mut buf)
                .await
                .map_err(|e| TransportError::Recv(e.to_string()))?;
            match Frame::decode(&buf[..len]) {
                Ok(frame) if frame.is_for(&self.address) => return Ok(frame.payload),
                Ok(frame) => debug!(from = %frame.from, "ignoring frame outside group"),
                Err(e) => warn!(%from, error = %e, "dropping undecodable datagram"),
            }
        }
    }
}

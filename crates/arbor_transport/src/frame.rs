//! Wire envelope carrying the sender address.

use crate::{TransportError, TransportResult};
use arbor_codec::Wire;
use arbor_core::ServiceAddress;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// One multicast message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// Sender
    pub from: ServiceAddress,
    /// Opaque payload
    pub payload: Bytes,
}

impl Wire for Frame {}

impl Frame {
    /// Wrap a payload
    #[must_use]
    pub fn new(from: ServiceAddress, payload: Bytes) -> Self {
        Self { from, payload }
    }

    /// Encode for the wire
    ///
    /// # Errors
    ///
    /// Returns `Malformed` if serialization fails
    pub fn encode(&self) -> TransportResult<Vec<u8>> {
        self.to_wire()
            .map_err(|e| TransportError::Malformed(e.to_string()))
    }

    /// Decode from the wire
    ///
    /// # Errors
    ///
    /// Returns `Malformed` if the bytes are not a frame
    pub fn decode(bytes: &[u8]) -> TransportResult<Self> {
        Self::from_wire(bytes).map_err(|e| TransportError::Malformed(e.to_string()))
    }

    /// Should `receiver` accept this frame?
    #[must_use]
    pub fn is_for(&self, receiver: &ServiceAddress) -> bool {
        self.from != *receiver && self.from.same_group(receiver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_wire() {
        let frame = Frame::new(ServiceAddress::new(1, 1, 2), Bytes::from_static(b"hello"));
        let back = Frame::decode(&frame.encode().unwrap()).unwrap();
        assert_eq!(back, frame);
        assert!(Frame::decode(&[0xff]).is_err());
    }

    #[test]
    fn test_group_filter() {
        let frame = Frame::new(ServiceAddress::new(1, 1, 2), Bytes::new());
        assert!(frame.is_for(&ServiceAddress::new(1, 1, 3)));
        assert!(!frame.is_for(&ServiceAddress::new(1, 1, 2)));
        assert!(!frame.is_for(&ServiceAddress::new(1, 2, 3)));
        assert!(!frame.is_for(&ServiceAddress::new(2, 1, 3)));
    }
}

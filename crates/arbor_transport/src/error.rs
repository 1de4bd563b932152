//! Transport errors.

use arbor_core::CoreError;

/// Transport result type
pub type TransportResult<T> = Result<T, TransportError>;

/// Transport errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Socket could not be bound
    #[error("Bind failed on {address}: {reason}")]
    Bind {
        /// Local address
        address: String,
        /// OS message
        reason: String,
    },

    /// Sending failed
    #[error("Send failed: {0}")]
    Send(String),

    /// Receiving failed
    #[error("Receive failed: {0}")]
    Recv(String),

    /// Payload does not fit in one message
    #[error("Payload of {size} bytes exceeds limit of {limit}")]
    TooLarge {
        /// Payload size
        size: usize,
        /// Limit
        limit: usize,
    },

    /// Frame could not be decoded
    #[error("Malformed frame: {0}")]
    Malformed(String),

    /// The endpoint is shut down
    #[error("Transport closed")]
    Closed,
}

impl From<TransportError> for CoreError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Malformed(reason) => CoreError::malformed("frame", reason),
            other => CoreError::Transport {
                reason: other.to_string(),
            },
        }
    }
}

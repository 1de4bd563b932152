//! Codec errors.

use arbor_core::CoreError;

/// Codec result type
pub type CodecResult<T> = Result<T, CodecError>;

/// Encoding and decoding errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Input could not be decoded
    #[error("Malformed {format} input: {reason}")]
    Malformed {
        /// Which codec rejected the input
        format: &'static str,
        /// Decoder message
        reason: String,
    },

    /// A frame ended before its declared length
    #[error("Truncated frame: expected {expected} bytes, found {found}")]
    Truncated {
        /// Declared length
        expected: usize,
        /// Bytes actually present
        found: usize,
    },

    /// A frame exceeds the accepted size
    #[error("Frame of {size} bytes exceeds limit of {limit}")]
    FrameTooLarge {
        /// Declared size
        size: usize,
        /// Limit
        limit: usize,
    },

    /// Underlying reader or writer failed
    #[error("I/O error: {0}")]
    Io(String),
}

impl CodecError {
    pub(crate) fn binary(reason: impl std::fmt::Display) -> Self {
        Self::Malformed {
            format: "binary",
            reason: reason.to_string(),
        }
    }

    pub(crate) fn xml(reason: impl std::fmt::Display) -> Self {
        Self::Malformed {
            format: "xml",
            reason: reason.to_string(),
        }
    }
}

impl From<std::io::Error> for CodecError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<CodecError> for CoreError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Malformed { format, reason } => CoreError::malformed(format, reason),
            CodecError::Io(reason) => CoreError::Io {
                operation: "codec".to_string(),
                reason,
            },
            other => CoreError::malformed("frame", other),
        }
    }
}

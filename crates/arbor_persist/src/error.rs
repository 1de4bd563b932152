//! Persistence errors.

use arbor_codec::CodecError;
use arbor_core::CoreError;
use std::path::Path;

/// Persistence result type
pub type PersistResult<T> = Result<T, PersistError>;

/// Persistence errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PersistError {
    /// File system operation failed
    #[error("I/O error on {path}: {reason}")]
    Io {
        /// File or directory involved
        path: String,
        /// OS message
        reason: String,
    },

    /// File content is not what it claims to be
    #[error("Corrupt file {path}: {reason}")]
    Corrupt {
        /// File involved
        path: String,
        /// What is wrong
        reason: String,
    },

    /// Binary snapshot body does not match its checksum
    #[error("Checksum mismatch in {path}")]
    ChecksumMismatch {
        /// File involved
        path: String,
    },

    /// Encoding failed
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl PersistError {
    pub(crate) fn io(path: &Path, err: impl std::fmt::Display) -> Self {
        Self::Io {
            path: path.display().to_string(),
            reason: err.to_string(),
        }
    }

    pub(crate) fn corrupt(path: &Path, reason: impl std::fmt::Display) -> Self {
        Self::Corrupt {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<PersistError> for CoreError {
    fn from(err: PersistError) -> Self {
        match err {
            PersistError::Io { path, reason } => CoreError::Io {
                operation: path,
                reason,
            },
            PersistError::Codec(e) => e.into(),
            other => CoreError::malformed("persisted file", other),
        }
    }
}

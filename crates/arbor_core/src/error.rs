//! Core error types for ARBOR.

use std::fmt;

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Path or key absent
    NotFound {
        /// What was looked up ("path", "key", ...)
        kind: String,
        /// The missing identifier
        id: String,
    },

    /// A buffer, XML fragment or record could not be decoded
    Malformed {
        /// What was being decoded
        what: String,
        /// Decoder message
        reason: String,
    },

    /// A job precondition is not satisfiable right now
    PreconditionNotMet {
        /// Which precondition failed
        reason: String,
    },

    /// A required configuration key is absent and has no default
    ConfigMissing {
        /// Missing key
        key: String,
    },

    /// File open/read/write failure
    Io {
        /// Operation that failed
        operation: String,
        /// OS error message
        reason: String,
    },

    /// Path is not a valid concrete path or pattern
    InvalidPath {
        /// Offending path
        path: String,
        /// Why it was rejected
        reason: String,
    },

    /// A write would descend through a node that is not a dictionary
    PathConflict {
        /// Path of the blocking node
        path: String,
    },

    /// Messaging transport failure
    Transport {
        /// Transport message
        reason: String,
    },

    /// Cancelled
    Cancelled,

    /// Internal error (for unexpected errors)
    Internal {
        /// Error message
        message: String,
    },
}

impl CoreError {
    /// Shorthand for a missing path
    #[must_use]
    pub fn path_not_found(path: &str) -> Self {
        Self::NotFound {
            kind: "path".to_string(),
            id: path.to_string(),
        }
    }

    /// Shorthand for a decode failure
    #[must_use]
    pub fn malformed(what: &str, reason: impl fmt::Display) -> Self {
        Self::Malformed {
            what: what.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Shorthand for an I/O failure
    #[must_use]
    pub fn io(operation: impl fmt::Display, err: impl fmt::Display) -> Self {
        Self::Io {
            operation: operation.to_string(),
            reason: err.to_string(),
        }
    }

    /// True for conditions callers are expected to poll or skip
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::PreconditionNotMet { .. })
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { kind, id } => write!(f, "{} not found: {}", kind, id),
            Self::Malformed { what, reason } => write!(f, "Malformed {}: {}", what, reason),
            Self::PreconditionNotMet { reason } => write!(f, "Precondition not met: {}", reason),
            Self::ConfigMissing { key } => write!(f, "Missing configuration key: {}", key),
            Self::Io { operation, reason } => {
                write!(f, "I/O failure during {}: {}", operation, reason)
            }
            Self::InvalidPath { path, reason } => write!(f, "Invalid path {}: {}", path, reason),
            Self::PathConflict { path } => write!(f, "Path conflict: {} is not a dictionary", path),
            Self::Transport { reason } => write!(f, "Transport error: {}", reason),
            Self::Cancelled => write!(f, "Operation cancelled"),
            Self::Internal { message } => write!(f, "Internal error: {}", message),
        }
    }
}

impl std::error::Error for CoreError {}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        Self::io("io", err)
    }
}

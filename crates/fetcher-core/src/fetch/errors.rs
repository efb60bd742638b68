//! Fetch error types.
//!
//! These errors are designed to be cloneable and serializable: one failure is
//! fanned out to every listener of a transfer, and may cross FFI or event
//! boundaries. For I/O errors, we capture the kind and message as strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Classification of a transport-level failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportErrorKind {
    /// Connection refused, reset, DNS failure, offline.
    Connectivity,
    /// The operation timed out.
    Timeout,
    /// The server answered with a non-success status.
    Http { status: u16 },
    /// The OS reported that storage is full.
    InsufficientStorage,
    /// The transport operation was cancelled underneath us.
    Cancelled,
    /// Anything else.
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connectivity => f.write_str("connectivity"),
            Self::Timeout => f.write_str("timeout"),
            Self::Http { status } => write!(f, "http {status}"),
            Self::InsufficientStorage => f.write_str("insufficient storage"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::Other => f.write_str("other"),
        }
    }
}

/// Failure reported by a transport, with the raw cause preserved as text.
#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn connectivity(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Connectivity, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }

    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Http { status }, message)
    }

    pub fn insufficient_storage(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::InsufficientStorage, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Other, message)
    }

    /// Map a `std::io::Error` raised while the transport wrote the payload.
    #[must_use]
    pub fn from_io_error(err: &std::io::Error) -> Self {
        use std::io::ErrorKind;

        let kind = match err.kind() {
            ErrorKind::StorageFull => TransportErrorKind::InsufficientStorage,
            ErrorKind::TimedOut => TransportErrorKind::Timeout,
            ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof => TransportErrorKind::Connectivity,
            _ => TransportErrorKind::Other,
        };
        Self::new(kind, err.to_string())
    }
}

/// Error raised by a cache store.
#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum CacheError {
    /// The store ran out of space.
    #[error("Insufficient storage: {message}")]
    InsufficientStorage { message: String },

    /// I/O error during store operations.
    #[error("I/O error ({kind}): {message}")]
    Io { kind: String, message: String },

    /// Metadata could not be encoded or decoded.
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// General/uncategorized error.
    #[error("{message}")]
    Other { message: String },
}

impl CacheError {
    /// Create a cache error from a `std::io::Error`.
    ///
    /// `StorageFull` becomes `InsufficientStorage`; every other kind keeps its
    /// name and message.
    #[must_use]
    pub fn from_io_error(err: &std::io::Error) -> Self {
        let kind = err.kind();
        if kind == std::io::ErrorKind::StorageFull {
            return Self::InsufficientStorage {
                message: err.to_string(),
            };
        }
        Self::Io {
            kind: format!("{kind:?}"),
            message: err.to_string(),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

/// Terminal failure delivered to a fetch listener.
#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum FetchError {
    /// Bytes were received but failed domain validation.
    #[error("Invalid payload: {reason}")]
    InvalidPayload { reason: String },

    /// Network or OS-level failure reported by the transport.
    #[error("Transport error ({kind}): {message}")]
    Transport {
        kind: TransportErrorKind,
        message: String,
    },

    /// The cache store rejected the artifact.
    #[error("Persistence failed: {message}")]
    Persistence { message: String },

    /// Domain-specific rejection (e.g. unsupported resource kind).
    #[error("{message}")]
    Explicit { message: String },

    /// A cache-only fetch found nothing in the cache.
    #[error("Resource is not cached")]
    NotCached,

    /// Cancelled by the caller or the system.
    #[error("Fetch cancelled")]
    Cancelled,

    /// A result arrived for a caller that had already detached.
    #[error("Stale result suppressed")]
    StaleResult,
}

impl FetchError {
    pub fn invalid_payload(reason: impl Into<String>) -> Self {
        Self::InvalidPayload {
            reason: reason.into(),
        }
    }

    pub fn explicit(message: impl Into<String>) -> Self {
        Self::Explicit {
            message: message.into(),
        }
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Storage-full is surfaced separately so UIs can tell users to free space.
    #[must_use]
    pub const fn is_insufficient_storage(&self) -> bool {
        matches!(
            self,
            Self::Transport {
                kind: TransportErrorKind::InsufficientStorage,
                ..
            }
        )
    }

    /// Convert to a user-friendly message.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidPayload { .. } => {
                "The downloaded file is damaged or not in the expected format.".to_string()
            }
            Self::Transport {
                kind: TransportErrorKind::InsufficientStorage,
                ..
            } => "Not enough storage space. Free up space and try again.".to_string(),
            Self::Transport {
                kind: TransportErrorKind::Http { status },
                message,
            } => format!("Server error (HTTP {status}): {message}"),
            Self::Transport { message, .. } => format!("Network error: {message}"),
            Self::Persistence { message } => format!("Could not save the file: {message}"),
            Self::Explicit { message } => message.clone(),
            Self::NotCached => "This item is not available offline.".to_string(),
            Self::Cancelled => "Cancelled.".to_string(),
            Self::StaleResult => "This result is no longer relevant.".to_string(),
        }
    }
}

impl From<TransportError> for FetchError {
    fn from(err: TransportError) -> Self {
        match err.kind {
            TransportErrorKind::Cancelled => Self::Cancelled,
            kind => Self::Transport {
                kind,
                message: err.message,
            },
        }
    }
}

impl From<CacheError> for FetchError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::InsufficientStorage { message } => Self::Transport {
                kind: TransportErrorKind::InsufficientStorage,
                message,
            },
            other => Self::Persistence {
                message: other.to_string(),
            },
        }
    }
}

/// Convenience result type for fetch operations.
pub type FetchResult<T> = Result<T, FetchError>;

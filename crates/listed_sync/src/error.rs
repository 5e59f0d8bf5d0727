//! Error types for the sync layer.

use listed_core::MergeError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
///
/// Missing janitors and responses addressed to other peers are expected
/// transient states and never surface as errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    /// The local store rejected an operation.
    #[error("storage error: {message}")]
    Storage {
        /// Error message.
        message: String,
    },

    /// The relay rejected a send, watch or snapshot.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Not connected to the relay.
    #[error("not connected to relay")]
    NotConnected,

    /// The merge engine rejected an update or failed to encode.
    #[error("merge error: {0}")]
    Merge(#[from] MergeError),

    /// Invalid state transition.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },

    /// The provider task has stopped.
    #[error("sync provider closed")]
    Closed,
}

impl SyncError {
    /// Creates a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    ///
    /// Nothing in this crate retries; callers decide.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::NotConnected => true,
            SyncError::Storage { .. } => true,
            _ => false,
        }
    }

    /// Returns true for relay-side failures.
    pub fn is_transport(&self) -> bool {
        matches!(self, SyncError::Transport { .. } | SyncError::NotConnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transport_retryable("connection lost").is_retryable());
        assert!(!SyncError::transport_fatal("permission denied").is_retryable());
        assert!(SyncError::NotConnected.is_retryable());
        assert!(SyncError::storage("quota exceeded").is_retryable());
        assert!(!SyncError::Closed.is_retryable());
        assert!(!SyncError::Merge(MergeError::decoding("eof")).is_retryable());
    }

    #[test]
    fn error_display() {
        let err = SyncError::NotConnected;
        assert_eq!(err.to_string(), "not connected to relay");

        let err = SyncError::from(MergeError::decoding("bad header"));
        assert_eq!(err.to_string(), "merge error: decoding failed: bad header");
        assert!(SyncError::transport_fatal("x").is_transport());
        assert!(!SyncError::storage("x").is_transport());
    }
}

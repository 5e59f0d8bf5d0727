//! Error types for merge-engine operations.

use thiserror::Error;

/// Result type for merge-engine operations.
pub type MergeResult<T> = Result<T, MergeError>;

/// Errors that can occur while encoding, decoding or applying updates.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MergeError {
    /// Failed to encode document state.
    #[error("encoding failed: {message}")]
    Encoding {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode an update or state vector.
    #[error("decoding failed: {message}")]
    Decoding {
        /// Description of the decoding error.
        message: String,
    },

    /// The update decoded but is not valid for this document.
    #[error("invalid update: {message}")]
    InvalidUpdate {
        /// Description of the problem.
        message: String,
    },
}

impl MergeError {
    /// Create an encoding error.
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
        }
    }

    /// Create a decoding error.
    pub fn decoding(message: impl Into<String>) -> Self {
        Self::Decoding {
            message: message.into(),
        }
    }

    /// Create an invalid update error.
    pub fn invalid_update(message: impl Into<String>) -> Self {
        Self::InvalidUpdate {
            message: message.into(),
        }
    }
}

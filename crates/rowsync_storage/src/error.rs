//! Error types for row stores.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in a row store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An incoming row targets a namespace this store is not bound to.
    #[error("namespace mismatch: store is bound to {expected:?}, row targets {actual:?}")]
    NamespaceMismatch {
        /// The namespace the store is configured for.
        expected: String,
        /// The namespace the rejected row carried.
        actual: String,
    },

    /// An incoming value failed protocol validation.
    #[error(transparent)]
    Protocol(#[from] rowsync_protocol::ProtocolError),

    /// A value could not be serialized for the backend.
    #[error("serialization failed: {message}")]
    Serialization {
        /// Description of the failure.
        message: String,
    },

    /// The storage backend failed.
    #[error("storage backend error: {message}")]
    Backend {
        /// Description of the backend failure.
        message: String,
    },
}

impl StoreError {
    /// Creates a namespace mismatch error.
    pub fn namespace_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::NamespaceMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Creates a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

//! Error types for the engine.

use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur in the HLC service or storage engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A caller-provided argument is invalid.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the argument issue.
        message: String,
    },

    /// A protocol value failed validation.
    #[error(transparent)]
    Protocol(#[from] rowsync_protocol::ProtocolError),

    /// The row store failed.
    #[error(transparent)]
    Store(#[from] rowsync_storage::StoreError),
}

impl EngineError {
    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = EngineError::invalid_argument("count must be at least 1");
        assert_eq!(err.to_string(), "invalid argument: count must be at least 1");
    }

    #[test]
    fn store_errors_pass_through() {
        let err: EngineError = rowsync_storage::StoreError::backend("down").into();
        assert_eq!(err.to_string(), "storage backend error: down");
    }
}

//! Error types for protocol validation.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while validating protocol values.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A hybrid logical clock component is malformed.
    #[error("invalid HLC: {message}")]
    InvalidHlc {
        /// Description of the malformed component.
        message: String,
    },

    /// A row envelope is malformed.
    #[error("invalid row: {message}")]
    InvalidRow {
        /// Description of the malformed field.
        message: String,
    },
}

impl ProtocolError {
    /// Creates an invalid HLC error.
    pub fn invalid_hlc(message: impl Into<String>) -> Self {
        Self::InvalidHlc {
            message: message.into(),
        }
    }

    /// Creates an invalid row error.
    pub fn invalid_row(message: impl Into<String>) -> Self {
        Self::InvalidRow {
            message: message.into(),
        }
    }
}

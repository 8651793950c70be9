//! Error types for transports and the sync loop.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in a transport or the sync loop.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The server answered with a non-success status.
    #[error("transport error: status {status}: {body}")]
    Transport {
        /// HTTP-like status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// The request never produced a server response.
    #[error("network error: {message}")]
    Network {
        /// Description of the failure.
        message: String,
    },

    /// The server rejected the credentials (401/403).
    #[error("unauthorized")]
    Unauthorized,

    /// A server response violated the wire shape.
    #[error("protocol error at {path}: expected {expected}")]
    Protocol {
        /// Endpoint or field the violation occurred at.
        path: String,
        /// What the shape check expected.
        expected: String,
    },

    /// The server requires (re-)authentication before syncing resumes.
    #[error("authentication required")]
    AuthRequired,

    /// The persisted pull cursor failed its shape check.
    #[error("invalid cursor: {message}")]
    InvalidCursor {
        /// Description of the shape violation.
        message: String,
    },

    /// The engine or its store failed during a cycle.
    #[error(transparent)]
    Engine(#[from] rowsync_core::EngineError),

    /// `start` was called on a loop that is already running.
    #[error("sync loop already started")]
    AlreadyStarted,

    /// `stop` was called on a loop that is not running.
    #[error("sync loop not started")]
    NotStarted,
}

impl SyncError {
    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    pub fn protocol(path: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::Protocol {
            path: path.into(),
            expected: expected.into(),
        }
    }

    /// Creates an invalid cursor error.
    pub fn invalid_cursor(message: impl Into<String>) -> Self {
        Self::InvalidCursor {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = SyncError::Transport {
            status: 500,
            body: "boom".into(),
        };
        assert_eq!(err.to_string(), "transport error: status 500: boom");

        let err = SyncError::protocol("/sync/pull", "object with changes array");
        assert!(err.to_string().contains("/sync/pull"));

        assert_eq!(SyncError::Unauthorized.to_string(), "unauthorized");
    }
}

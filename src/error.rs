//! Error Types
//!
//! Error taxonomy for the collaboration core. The split mirrors how each
//! class of failure is handled:
//!
//! - `TransportError` - recovered internally via reconnect; never surfaced
//!   to the consumer as a blocking error
//! - `BufferError` - a malformed remote update is dropped and logged, not
//!   retried; local range and apply errors are reported to the caller
//! - `SessionError` - lifecycle misuse is a programming error in the
//!   consumer and fails fast
//! - `InitError` - unrecoverable initialization failure, the only class
//!   that should block the UI
//!
//! All error types are `Send + Sync` and can be shared across thread
//! boundaries.

use thiserror::Error;

/// Errors raised by the replicated text buffer.
#[derive(Debug, Error)]
pub enum BufferError {
    /// A remote update could not be applied. The update is dropped by the
    /// caller; retrying a malformed operation cannot succeed.
    #[error("malformed remote update: {message}")]
    MalformedUpdate {
        /// Human-readable error message
        message: String,
    },

    /// A local edit referenced a range outside the current document.
    #[error("edit range {start}..{end} exceeds document length {len}")]
    RangeOutOfBounds {
        /// Start of the rejected range (chars)
        start: usize,
        /// End of the rejected range (chars)
        end: usize,
        /// Document length at the time of the edit (chars)
        len: usize,
    },

    /// A local edit was rejected by the document despite passing the range
    /// check. Distinct from `MalformedUpdate` so it never reads as a
    /// remote peer's fault.
    #[error("failed to apply local edit: {message}")]
    LocalApply {
        /// Human-readable error message
        message: String,
    },

    /// Exporting the replicated state failed.
    #[error("failed to export buffer state: {message}")]
    Export {
        /// Human-readable error message
        message: String,
    },
}

/// Errors raised by the transport layer.
///
/// These are recovered internally: a failed connection keeps retrying with
/// backoff, and editing continues against the local buffer in the meantime.
#[derive(Debug, Error, Clone)]
pub enum TransportError {
    /// The signaling endpoint refused the connection.
    #[error("connection refused for room '{room}'")]
    ConnectionRefused {
        /// The room the connection was scoped to
        room: String,
    },

    /// An operation required a live connection and there was none.
    #[error("not connected")]
    NotConnected,
}

/// Session lifecycle errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// `close` was called for a key with no live session (close without a
    /// matching open, or one close too many). This is a programming error
    /// in the consumer; failing fast beats silently corrupting refcounts.
    #[error("no open session for key '{key}'")]
    LifecycleMisuse {
        /// The offending file key
        key: String,
    },

    /// Buffer-level failure while setting up or seeding a session.
    #[error(transparent)]
    Buffer(#[from] BufferError),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing value: {0}")]
    MissingValue(&'static str),

    #[error("invalid value for {field}: {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },
}

/// Unrecoverable initialization failures.
#[derive(Debug, Error)]
pub enum InitError {
    /// The supplied configuration was rejected.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_misuse_message_names_key() {
        let err = SessionError::LifecycleMisuse {
            key: "file-1".to_string(),
        };
        assert!(err.to_string().contains("file-1"));
    }

    #[test]
    fn test_buffer_error_converts_into_session_error() {
        let err: SessionError = BufferError::RangeOutOfBounds {
            start: 4,
            end: 9,
            len: 2,
        }
        .into();
        match err {
            SessionError::Buffer(BufferError::RangeOutOfBounds { len, .. }) => {
                assert_eq!(len, 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_local_apply_error_does_not_blame_remote() {
        let err = BufferError::LocalApply {
            message: "index out of range".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("local edit"));
        assert!(!text.contains("remote"));
    }

    #[test]
    fn test_transport_error_is_cloneable() {
        let err = TransportError::ConnectionRefused {
            room: "ws/file".to_string(),
        };
        let cloned = err.clone();
        assert_eq!(err.to_string(), cloned.to_string());
    }
}

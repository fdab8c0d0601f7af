//! Errors from snapshot operations.

use thiserror::Error;

/// Errors from [`crate::SnapshotManager`] operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The source file could not be read while capturing a pre-image.
    #[error("failed to read {path}: {message}")]
    CaptureFailed {
        /// The path that failed to capture.
        path: String,
        /// The underlying I/O error message.
        message: String,
        /// The underlying I/O error's kind, so callers can tell a missing
        /// file apart from a permissions failure without re-parsing `message`.
        io_kind: std::io::ErrorKind,
    },

    /// A manifest or metadata file failed to read, write, or parse.
    #[error("snapshot state I/O failed: {0}")]
    Io(String),

    /// Serialization or deserialization of on-disk snapshot state failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The handle is not in a state that permits the requested operation
    /// (e.g. `capture` on an already-committed handle).
    #[error("handle {snapshot_id} is {state}, cannot {attempted}")]
    InvalidState {
        /// The snapshot id of the offending handle.
        snapshot_id: String,
        /// The handle's current state.
        state: String,
        /// The operation that was attempted.
        attempted: String,
    },

    /// No handle is tracked for the given snapshot id.
    #[error("unknown snapshot handle: {0}")]
    UnknownHandle(String),
}

//! Error types for Companion Sync

use thiserror::Error;

/// Main error type for Companion Sync operations
///
/// Transport-level failures (peer unreachable, session not activated) are not
/// errors from the caller's point of view: push and send report them as a
/// dropped [`Delivery`](crate::transport::Delivery). `SyncError` is returned for
/// malformed data, caller mistakes, and a stopped engine.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Action texts and completion flags are not index-aligned
    #[error("Length mismatch: {texts} action texts but {flags} completion flags")]
    LengthMismatch {
        /// Number of action texts
        texts: usize,
        /// Number of completion flags
        flags: usize,
    },

    /// Inbound payload is missing a required key or has a mistyped value
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Point message with a discriminator this build does not understand
    #[error("Unknown message discriminator: {0}")]
    UnknownMessage(String),

    /// Only the authoritative side may change journal content
    #[error("Operation requires the authoritative (primary) device")]
    NotAuthoritative,

    /// The engine task has shut down
    #[error("Engine stopped")]
    EngineStopped,

    /// A value could not be encoded as a wire payload
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid or unreadable configuration
    #[error("Config error: {0}")]
    Config(String),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using SyncError
pub type SyncResult<T> = Result<T, SyncError>;

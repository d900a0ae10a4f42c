//! Error types for ressync-client.

use ressync_core::BufferError;
use ressync_types::MessageError;

use crate::transport::TransportError;

/// Processor stage errors.
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    /// Encoding a value failed.
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// Decoding a payload failed.
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),

    /// The stage received a value of the wrong shape.
    #[error("unexpected input: expected {expected}, got {actual}")]
    UnexpectedInput {
        /// Shape the stage accepts.
        expected: &'static str,
        /// Shape it received.
        actual: &'static str,
    },

    /// Base64 decoding failed.
    #[error("base64 decode failed: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Decoded bytes were not UTF-8.
    #[error("invalid utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Pipeline errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A processor stage failed; the remaining stages did not run.
    #[error("processor failed: {0}")]
    Processor(#[from] ProcessorError),

    /// The packed payload is not a mapping.
    #[error("packed payload must be a mapping: {0}")]
    NotAnEnvelope(#[source] MessageError),

    /// A resource hook (marshal, prestore, validate, ...) failed.
    #[error("hook failed: {0}")]
    Hook(String),
}

/// Key-value store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Store file is not a JSON object of strings.
    #[error("store file is corrupt: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from a backend `get`/`set`.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Pipeline error.
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Message encoding error.
    #[error("message error: {0}")]
    Message(#[from] MessageError),

    /// Outgoing queue is full.
    #[error("{0}")]
    QueueFull(#[from] BufferError),
}

impl From<ProcessorError> for SyncError {
    fn from(err: ProcessorError) -> Self {
        SyncError::Pipeline(PipelineError::Processor(err))
    }
}

/// Errors surfaced by [`Resource`](crate::Resource) and [`Dict`](crate::Dict).
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    /// `update` on a resource whose meta has no type.
    #[error("update requires meta to contain __type")]
    MissingType,

    /// A backend operation failed.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Validation of an incoming value failed.
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// A dict child was requested for a key that is neither listed nor cached.
    #[error("unresolved key: {0}")]
    UnresolvedKey(String),

    /// A backend task panicked or was cancelled.
    #[error("backend task failed: {0}")]
    Task(String),
}

/// Result type alias for backend operations.
pub type SyncResult<T> = std::result::Result<T, SyncError>;

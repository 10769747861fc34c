//! Dispatch error taxonomy.
//!
//! Every variant ends in a failure acknowledgement for the message; none of
//! them stop the loop.

use thiserror::Error;

use craft_core::error::DecodeError;

/// Why a message failed to dispatch.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    InvalidRequest(#[from] InvalidRequest),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Submission(#[from] SubmitError),
}

impl DispatchError {
    /// Short label used as a tracing field.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::Decode(_) => "decode",
            DispatchError::InvalidRequest(_) => "invalid_request",
            DispatchError::Fetch(_) => "fetch",
            DispatchError::Submission(_) => "submission",
        }
    }
}

/// A decoded deploy event that cannot be submitted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid request {identity}: {reason}")]
pub struct InvalidRequest {
    /// Request id when present, otherwise the message or object key.
    pub identity: String,
    pub reason: InvalidReason,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvalidReason {
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("`{0}` is not a valid job name (1-128 of [A-Za-z0-9_-], starting alphanumeric)")]
    JobName(String),
}

/// Reading a referenced deploy event from the blob store failed.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no bucket configured for referenced events ({0})")]
    NotConfigured(String),

    #[error("bucket {actual} is not served by this dispatcher (expected {expected})")]
    UnknownBucket { expected: String, actual: String },

    /// The key cannot be addressed through the object store without being
    /// rewritten (empty, `.` or `..` segments, leading or trailing `/`).
    #[error("object key {key:?} is not addressable: {reason}")]
    UnsupportedKey { key: String, reason: String },

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("object store error: {0}")]
    Store(String),
}

/// The job scheduler call failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubmitError {
    /// The request never got a definitive answer (network, throttling, timeout).
    #[error("transport error: {0}")]
    Transport(String),

    /// The scheduler answered and refused the job.
    #[error("rejected by scheduler: {0}")]
    Rejected(String),
}

use thiserror::Error;

/// Startup configuration errors. Fatal: the worker exits before consuming.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("required setting {0} is not set")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// The payload of a message could not be turned into a deploy event.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("invalid deploy event JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unusable event envelope: {0}")]
    Envelope(String),
}

/// A deploy request field that was absent or empty.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("missing field `{0}`")]
pub struct MissingField(pub &'static str);

//! Queue error types.

use thiserror::Error;

use craft_core::error::ConfigError;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("message parse error: {0}")]
    Parse(String),

    #[error("acknowledge error: {0}")]
    Ack(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub mod consumer;
pub mod error;
pub mod parser;
pub mod sqs;

pub use consumer::{QueueConsumer, QueueHealth, QueueMessage};
pub use error::QueueError;
pub use parser::{parse_body, parse_message};
pub use sqs::SqsConsumer;

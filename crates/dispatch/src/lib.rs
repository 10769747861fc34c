//! Deploy request dispatcher.
//!
//! This crate provides:
//! - `DispatchService`, the sequential dispatch loop over classified envelopes
//! - Job identity resolution from request ids or object keys
//! - `JobScheduler` trait with an AWS Batch implementation
//! - `BlobStore` trait with an `object_store` implementation
//! - `QueueBridge`, which feeds the loop from a queue consumer and acks back

pub mod blob;
pub mod bridge;
pub mod error;
pub mod resolver;
pub mod service;
pub mod submit;
pub mod validate;

#[cfg(test)]
pub(crate) mod test_support;

pub use blob::{BlobStore, ObjectStoreBlobs};
pub use bridge::{BridgeOptions, QueueBridge};
pub use error::{DispatchError, FetchError, InvalidReason, InvalidRequest, SubmitError};
pub use resolver::{resolve_key, KeyIdentity, Resolution};
pub use service::{Ack, DispatchService, DispatchStats, Msg, Outcome};
pub use submit::{BatchScheduler, JobId, JobScheduler, JobSubmission, JobSubmitter};
pub use validate::validate;

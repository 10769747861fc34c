//! The dispatch loop.
//!
//! Messages come in on one channel, acknowledgements go out on another. Each
//! message is dispatched to completion before the next is read, and each one
//! yields exactly one [`Ack`] carrying its receipt handle.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use craft_core::config::DispatchConfig;
use craft_core::error::{ConfigError, DecodeError};
use craft_core::event::{DeployEvent, Envelope, ObjectRef};

use crate::blob::BlobStore;
use crate::error::{DispatchError, FetchError};
use crate::resolver::{resolve_key, KeyIdentity, Resolution};
use crate::submit::{JobId, JobScheduler, JobSubmitter};
use crate::validate::validate;

/// An inbound message together with the handles needed to acknowledge it.
#[derive(Debug, Clone)]
pub struct Msg<T> {
    pub message_id: String,
    pub receipt_handle: String,
    pub body: T,
}

/// Acknowledgement for one message.
#[derive(Debug)]
pub struct Ack {
    pub message_id: String,
    pub receipt_handle: String,
    pub outcome: Outcome,
}

impl Ack {
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}

/// What happened to a message.
#[derive(Debug)]
pub enum Outcome {
    /// Not a deploy request; acknowledged without work.
    Ignored { reason: String },
    Submitted { job_id: JobId },
    Failed(DispatchError),
}

impl Outcome {
    /// Success acks remove the message from the source; failures leave it
    /// for redelivery.
    pub fn is_success(&self) -> bool {
        !matches!(self, Outcome::Failed(_))
    }
}

/// Counters returned when the loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub received: u64,
    pub submitted: u64,
    pub ignored: u64,
    pub failed: u64,
}

impl DispatchStats {
    fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Ignored { .. } => self.ignored += 1,
            Outcome::Submitted { .. } => self.submitted += 1,
            Outcome::Failed(_) => self.failed += 1,
        }
    }
}

/// Dispatches deploy requests to the job scheduler.
///
/// Holds only immutable configuration, so several services (or several
/// processes) can consume the same source.
pub struct DispatchService {
    submitter: JobSubmitter,
    blobs: Option<Arc<dyn BlobStore>>,
    marker_suffix: String,
}

impl DispatchService {
    /// Fails if the job queue or job definition is missing.
    pub fn new(
        config: &DispatchConfig,
        scheduler: Arc<dyn JobScheduler>,
        blobs: Option<Arc<dyn BlobStore>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            submitter: JobSubmitter::new(scheduler, &config.job_queue, &config.job_definition),
            blobs,
            marker_suffix: config.marker_suffix.clone(),
        })
    }

    /// Suffix that marks deploy event objects.
    pub fn marker_suffix(&self) -> &str {
        &self.marker_suffix
    }

    /// Consume messages until `rcv` closes, acknowledging each on `ack`.
    ///
    /// Stops early if the acknowledgement side goes away, since nothing
    /// processed after that point could be acknowledged.
    pub async fn run(
        &self,
        mut rcv: mpsc::Receiver<Msg<Envelope>>,
        ack: mpsc::Sender<Ack>,
    ) -> DispatchStats {
        let mut stats = DispatchStats::default();
        info!("Dispatch loop started");

        while let Some(msg) = rcv.recv().await {
            stats.received += 1;
            let outcome = self.dispatch(&msg.body, &msg.message_id).await;
            stats.record(&outcome);

            let reply = Ack {
                message_id: msg.message_id,
                receipt_handle: msg.receipt_handle,
                outcome,
            };
            if ack.send(reply).await.is_err() {
                warn!("Ack channel closed, stopping dispatch loop");
                break;
            }
        }

        info!(
            received = stats.received,
            submitted = stats.submitted,
            ignored = stats.ignored,
            failed = stats.failed,
            "Dispatch loop finished"
        );
        stats
    }

    /// Dispatch a single envelope. Never panics, never retries.
    pub async fn dispatch(&self, envelope: &Envelope, message_id: &str) -> Outcome {
        let result = match envelope {
            Envelope::Unrelated { reason } => {
                debug!(message_id, reason = %reason, "Ignoring unrelated message");
                return Outcome::Ignored {
                    reason: reason.clone(),
                };
            }
            Envelope::Malformed { reason } => Err(DispatchError::Decode(DecodeError::Envelope(
                reason.clone(),
            ))),
            Envelope::Inline(body) => self.dispatch_inline(body, message_id).await,
            Envelope::Reference(object) => match resolve_key(object, &self.marker_suffix) {
                Some(identity) => self.dispatch_reference(object, identity).await,
                None => {
                    debug!(message_id, key = %object.key, "Key outside naming convention, ignoring");
                    return Outcome::Ignored {
                        reason: format!("{object} does not end in {}", self.marker_suffix),
                    };
                }
            },
        };

        match result {
            Ok(job_id) => Outcome::Submitted { job_id },
            Err(err) => {
                let key = match envelope {
                    Envelope::Reference(object) => object.to_string(),
                    _ => message_id.to_string(),
                };
                if matches!(err, DispatchError::Submission(_)) {
                    error!(message_id, key = %key, kind = err.kind(), error = %err, "Job submission failed");
                } else {
                    warn!(message_id, key = %key, kind = err.kind(), error = %err, "Dispatch failed");
                }
                Outcome::Failed(err)
            }
        }
    }

    async fn dispatch_inline(&self, body: &[u8], message_id: &str) -> Result<JobId, DispatchError> {
        let event = DeployEvent::decode(body)?;
        let resolution = Resolution::Direct;
        let request = validate(event, &resolution, message_id)?;
        Ok(self.submitter.submit(&request, &resolution).await?)
    }

    async fn dispatch_reference(
        &self,
        object: &ObjectRef,
        identity: KeyIdentity,
    ) -> Result<JobId, DispatchError> {
        let blobs = self
            .blobs
            .as_ref()
            .ok_or_else(|| FetchError::NotConfigured(object.to_string()))?;
        let payload = blobs.fetch(object).await?;

        let event = DeployEvent::decode(&payload)?;
        debug!(
            key = %object.key,
            target = %identity.target,
            scope = %identity.scope,
            module = identity.module.as_deref().unwrap_or("-"),
            "Resolved key identity"
        );
        let resolution = Resolution::KeyConvention(identity);
        let request = validate(event, &resolution, &object.key)?;
        Ok(self.submitter.submit(&request, &resolution).await?)
    }
}

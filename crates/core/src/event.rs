//! Deploy request payloads and the envelopes that carry them.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::error::{DecodeError, MissingField};

/// A deploy request as it appears on the wire.
///
/// Every field is optional here; [`DeployRequest::try_from`] is the only way
/// to get a fully populated request out of it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeployEvent {
    /// Unique identity of the request, used as the job name.
    #[serde(default, alias = "uid", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Identity of the deployable module (e.g. `github.com/acme/app`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,

    /// Deployment context, kept as the exact JSON text that arrived.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Box<RawValue>>,
}

impl DeployEvent {
    /// Decode a JSON payload.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        Ok(serde_json::from_slice(payload)?)
    }

    /// The identity to report in logs and errors, if the event carries one.
    pub fn identity(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.trim().is_empty())
    }
}

/// A validated deploy request: `id`, `module` and `context` are all present
/// and non-empty.
#[derive(Debug, Clone)]
pub struct DeployRequest {
    id: String,
    module: String,
    context: Box<RawValue>,
}

impl DeployRequest {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    /// The context exactly as received, e.g. `{"acc":"test"}`.
    pub fn context_str(&self) -> &str {
        self.context.get()
    }
}

impl TryFrom<DeployEvent> for DeployRequest {
    type Error = MissingField;

    fn try_from(event: DeployEvent) -> Result<Self, Self::Error> {
        let id = event
            .id
            .filter(|s| !s.trim().is_empty())
            .ok_or(MissingField("id"))?;
        let module = event
            .module
            .filter(|s| !s.trim().is_empty())
            .ok_or(MissingField("module"))?;
        let context = event
            .context
            .filter(|raw| !is_empty_json(raw.get()))
            .ok_or(MissingField("context"))?;

        Ok(Self {
            id,
            module,
            context,
        })
    }
}

/// `null` is already mapped to `None` by serde; an empty string is the
/// remaining way to send "no context".
fn is_empty_json(raw: &str) -> bool {
    let raw = raw.trim();
    raw.is_empty() || raw == "null" || raw == "\"\""
}

/// Location of an object in the blob store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
}

impl ObjectRef {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// Classified form of an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    /// The message body is the serialized deploy request.
    Inline(Bytes),
    /// The message points at an object holding the deploy request.
    Reference(ObjectRef),
    /// Some other kind of event; acknowledged without work.
    Unrelated { reason: String },
    /// Recognisably an object event, but not one that can be processed.
    Malformed { reason: String },
}

impl Envelope {
    /// Short label used as a tracing field.
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Inline(_) => "inline",
            Envelope::Reference(_) => "reference",
            Envelope::Unrelated { .. } => "unrelated",
            Envelope::Malformed { .. } => "malformed",
        }
    }
}

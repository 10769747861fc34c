//! Request validation. Runs before any submission attempt.

use craft_core::event::{DeployEvent, DeployRequest};

use crate::error::{InvalidReason, InvalidRequest};
use crate::resolver::{is_valid_job_name, Resolution};

/// Turn a decoded event into a [`DeployRequest`], or explain why not.
///
/// `fallback_identity` names the request in the error when the event has no
/// usable id (typically the message id or object key). The job name the
/// resolution yields must be one the scheduler accepts.
pub fn validate(
    event: DeployEvent,
    resolution: &Resolution,
    fallback_identity: &str,
) -> Result<DeployRequest, InvalidRequest> {
    let identity = event.identity().unwrap_or(fallback_identity).to_string();

    let request = DeployRequest::try_from(event).map_err(|missing| InvalidRequest {
        identity: identity.clone(),
        reason: InvalidReason::MissingField(missing.0),
    })?;

    let job_name = resolution.job_name(&request);
    if !is_valid_job_name(job_name) {
        return Err(InvalidRequest {
            identity,
            reason: InvalidReason::JobName(job_name.to_string()),
        });
    }

    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use craft_core::event::ObjectRef;

    use crate::resolver::resolve_key;

    fn event(body: &str) -> DeployEvent {
        DeployEvent::decode(body.as_bytes()).unwrap()
    }

    #[test]
    fn accepts_complete_request() {
        let req = validate(
            event(r#"{"id":"123-456-789","module":"github.com/acme/app","context":{"acc":"test"}}"#),
            &Resolution::Direct,
            "msg-1",
        )
        .unwrap();
        assert_eq!(req.id(), "123-456-789");
    }

    #[test]
    fn missing_fields_name_the_field() {
        let cases = [
            (r#"{}"#, "id"),
            (r#"{"context":{"acc":"test"}}"#, "id"),
            (r#"{"id":"a","context":{"acc":"test"}}"#, "module"),
            (r#"{"id":"a","module":"","context":{"acc":"test"}}"#, "module"),
            (r#"{"id":"a","module":"m"}"#, "context"),
        ];
        for (body, field) in cases {
            let err = validate(event(body), &Resolution::Direct, "msg-1").unwrap_err();
            assert_eq!(err.reason, InvalidReason::MissingField(field), "body: {body}");
        }
    }

    #[test]
    fn identity_prefers_request_id() {
        let err = validate(event(r#"{"id":"req-7","context":{}}"#), &Resolution::Direct, "msg-1").unwrap_err();
        assert_eq!(err.identity, "req-7");

        let err = validate(event(r#"{"module":"m"}"#), &Resolution::Direct, "msg-1").unwrap_err();
        assert_eq!(err.identity, "msg-1");
    }

    #[test]
    fn rejects_ids_the_scheduler_cannot_use() {
        let err = validate(
            event(r#"{"id":"not a job name","module":"m","context":{}}"#),
            &Resolution::Direct,
            "msg-1",
        )
        .unwrap_err();
        assert_eq!(err.reason, InvalidReason::JobName("not a job name".into()));
        assert!(err.to_string().contains("not a valid job name"));
    }

    #[test]
    fn key_derived_name_replaces_the_id_check() {
        let identity = resolve_key(
            &ObjectRef::new("test-s3", "acme/module__scope.craft.event.json"),
            ".craft.event.json",
        )
        .unwrap();
        let req = validate(
            event(r#"{"id":"free form id","module":"m","context":{}}"#),
            &Resolution::KeyConvention(identity),
            "acme/module__scope.craft.event.json",
        )
        .unwrap();
        assert_eq!(req.id(), "free form id");
    }
}

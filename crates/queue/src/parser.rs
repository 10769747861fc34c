//! Classify queue message bodies into [`Envelope`]s.
//!
//! Recognised shapes:
//! - S3 event notifications (`{"Records":[{"eventSource":"aws:s3",...}]}`)
//! - the S3 test event sent when a notification is configured
//! - EventBridge S3 events (`{"source":"aws.s3","detail-type":...}`)
//! - SNS notifications wrapping any of the above
//!
//! Everything else is passed through as an inline deploy request and decoded
//! later, so corrupt bodies surface as decode failures rather than being
//! silently dropped.

use bytes::Bytes;
use serde::Deserialize;
use serde_json::Value;

use craft_core::event::{Envelope, ObjectRef};

use crate::consumer::QueueMessage;

const S3_EVENT_SOURCE: &str = "aws:s3";
const S3_TEST_EVENT: &str = "s3:TestEvent";
const EVENTBRIDGE_S3_SOURCE: &str = "aws.s3";
const EVENTBRIDGE_OBJECT_CREATED: &str = "Object Created";

#[derive(Debug, Deserialize)]
struct S3Notification {
    #[serde(rename = "Records")]
    records: Vec<S3Record>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct S3Record {
    #[serde(default)]
    event_source: String,
    #[serde(default)]
    event_name: String,
    s3: Option<S3Entity>,
}

#[derive(Debug, Default, Deserialize)]
struct S3Entity {
    bucket: Option<S3Bucket>,
    object: Option<S3Object>,
}

#[derive(Debug, Deserialize)]
struct S3Bucket {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct S3Object {
    #[serde(default)]
    key: String,
}

impl S3Entity {
    fn parts(&self) -> (&str, &str) {
        let bucket = self.bucket.as_ref().map(|b| b.name.as_str()).unwrap_or("");
        let key = self.object.as_ref().map(|o| o.key.as_str()).unwrap_or("");
        (bucket, key)
    }
}

/// Parse a single queue message into an [`Envelope`].
pub fn parse_message(msg: &QueueMessage, marker_suffix: &str) -> Envelope {
    parse_body(&msg.body, marker_suffix)
}

/// Classify a raw message body.
///
/// Object events whose key does not end in `marker_suffix` are unrelated,
/// whatever else is wrong with them.
pub fn parse_body(body: &str, marker_suffix: &str) -> Envelope {
    let json: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => return inline(body),
    };

    let Some(obj) = json.as_object() else {
        return inline(body);
    };

    // SNS fan-out wraps the original event as a JSON string.
    if obj.get("Type").and_then(Value::as_str) == Some("Notification") {
        if let Some(message) = obj.get("Message").and_then(Value::as_str) {
            return parse_body(message, marker_suffix);
        }
    }

    if obj.contains_key("Records") {
        return match serde_json::from_value::<S3Notification>(json) {
            Ok(notification) => from_s3_notification(notification, marker_suffix),
            Err(e) => Envelope::Malformed {
                reason: format!("unreadable S3 notification: {e}"),
            },
        };
    }

    if obj.get("Event").and_then(Value::as_str) == Some(S3_TEST_EVENT) {
        return Envelope::Unrelated {
            reason: "S3 test event".into(),
        };
    }

    if let (Some(source), Some(detail_type)) = (
        obj.get("source").and_then(Value::as_str),
        obj.get("detail-type").and_then(Value::as_str),
    ) {
        return from_eventbridge(source, detail_type, obj.get("detail"), marker_suffix);
    }

    inline(body)
}

fn inline(body: &str) -> Envelope {
    Envelope::Inline(Bytes::copy_from_slice(body.as_bytes()))
}

fn from_s3_notification(notification: S3Notification, marker_suffix: &str) -> Envelope {
    // (bucket, decoded key, raw key) of every created deploy marker.
    let mut markers: Vec<(&str, Option<String>, &str)> = Vec::new();
    for record in &notification.records {
        if record.event_source != S3_EVENT_SOURCE || !record.event_name.starts_with("ObjectCreated") {
            continue;
        }
        let (bucket, raw_key) = record.s3.as_ref().map(S3Entity::parts).unwrap_or(("", ""));
        let key = decode_key(raw_key);
        if key.as_deref().unwrap_or(raw_key).ends_with(marker_suffix) {
            markers.push((bucket, key, raw_key));
        }
    }

    let count = markers.len();
    match markers.pop() {
        None => Envelope::Unrelated {
            reason: "no deploy marker among object-created records".into(),
        },
        Some(_) if count > 1 => Envelope::Malformed {
            reason: format!("{count} deploy markers in one message"),
        },
        Some((bucket, Some(key), _)) => object_ref(bucket, key),
        Some((_, None, raw_key)) => Envelope::Malformed {
            reason: format!("object key {raw_key:?} is not valid URL encoding"),
        },
    }
}

fn from_eventbridge(
    source: &str,
    detail_type: &str,
    detail: Option<&Value>,
    marker_suffix: &str,
) -> Envelope {
    if source != EVENTBRIDGE_S3_SOURCE || detail_type != EVENTBRIDGE_OBJECT_CREATED {
        return Envelope::Unrelated {
            reason: format!("{source} / {detail_type}"),
        };
    }

    let entity = detail
        .cloned()
        .and_then(|d| serde_json::from_value::<S3Entity>(d).ok())
        .unwrap_or_default();
    let (bucket, key) = entity.parts();
    if !key.ends_with(marker_suffix) {
        return Envelope::Unrelated {
            reason: format!("object {key:?} is not a deploy marker"),
        };
    }
    object_ref(bucket, key.to_string())
}

fn object_ref(bucket: &str, key: String) -> Envelope {
    if bucket.is_empty() {
        return Envelope::Malformed {
            reason: format!("object event for {key:?} without bucket"),
        };
    }
    Envelope::Reference(ObjectRef::new(bucket, key))
}

/// S3 notifications URL-encode object keys, with spaces as `+`.
fn decode_key(raw: &str) -> Option<String> {
    urlencoding::decode(&raw.replace('+', " "))
        .ok()
        .map(|k| k.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    const MARKER: &str = ".craft.event.json";

    /// Helper: build a QueueMessage with the given body.
    fn make_msg(id: &str, body: &str) -> QueueMessage {
        QueueMessage {
            id: id.to_string(),
            body: body.to_string(),
            receipt_handle: "handle-test".to_string(),
            timestamp: Utc::now(),
            attempt_count: 1,
        }
    }

    fn s3_record(event_name: &str, bucket: &str, key: &str) -> String {
        format!(
            r#"{{"eventVersion":"2.1","eventSource":"aws:s3","awsRegion":"us-east-1",
                "eventName":"{event_name}",
                "s3":{{"s3SchemaVersion":"1.0","bucket":{{"name":"{bucket}","arn":"arn:aws:s3:::{bucket}"}},
                       "object":{{"key":"{key}","size":42}}}}}}"#
        )
    }

    #[test]
    fn test_parse_object_created_notification() {
        let body = format!(
            r#"{{"Records":[{}]}}"#,
            s3_record("ObjectCreated:Put", "test-s3", "acme/module__scope.craft.event.json")
        );
        let env = parse_message(&make_msg("msg-1", &body), MARKER);

        assert_eq!(
            env,
            Envelope::Reference(ObjectRef::new("test-s3", "acme/module__scope.craft.event.json"))
        );
    }

    #[test]
    fn test_parse_url_encoded_key() {
        let body = format!(
            r#"{{"Records":[{}]}}"#,
            s3_record("ObjectCreated:CompleteMultipartUpload", "b", "my+dir/a%2Bb.craft.event.json")
        );
        let env = parse_body(&body, MARKER);

        assert_eq!(
            env,
            Envelope::Reference(ObjectRef::new("b", "my dir/a+b.craft.event.json"))
        );
    }

    #[test]
    fn test_parse_object_removed_is_unrelated() {
        let body = format!(
            r#"{{"Records":[{}]}}"#,
            s3_record("ObjectRemoved:Delete", "test-s3", "acme/scope.craft.event.json")
        );
        assert!(matches!(parse_body(&body, MARKER), Envelope::Unrelated { .. }));
    }

    #[test]
    fn test_parse_multiple_markers_is_malformed() {
        let body = format!(
            r#"{{"Records":[{},{}]}}"#,
            s3_record("ObjectCreated:Put", "b", "a/x.craft.event.json"),
            s3_record("ObjectCreated:Put", "b", "a/y.craft.event.json")
        );
        let env = parse_body(&body, MARKER);
        match env {
            Envelope::Malformed { reason } => assert!(reason.contains("2 deploy markers")),
            other => panic!("expected malformed, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_other_keys_are_unrelated() {
        // No bucket, and not a deploy marker either.
        let body = r#"{"Records":[{"eventSource":"aws:s3","eventName":"ObjectCreated:Put",
                      "s3":{"object":{"key":"some-key"}}}]}"#;
        assert!(matches!(parse_body(body, MARKER), Envelope::Unrelated { .. }));

        let body = format!(
            r#"{{"Records":[{},{}]}}"#,
            s3_record("ObjectCreated:Put", "b", "acme/cdk.out/a.json"),
            s3_record("ObjectCreated:Put", "b", "acme/cdk.out/b.json")
        );
        assert!(matches!(parse_body(&body, MARKER), Envelope::Unrelated { .. }));

        let body = r#"{"Records":[{"eventSource":"aws:s3","eventName":"ObjectCreated:Put",
                      "s3":{"bucket":{"name":"b"}}}]}"#;
        assert!(matches!(parse_body(body, MARKER), Envelope::Unrelated { .. }));
    }

    #[test]
    fn test_parse_marker_among_other_records() {
        let body = format!(
            r#"{{"Records":[{},{}]}}"#,
            s3_record("ObjectCreated:Put", "b", "acme/cdk.out/manifest.json"),
            s3_record("ObjectCreated:Put", "b", "acme/scope.craft.event.json")
        );
        assert_eq!(
            parse_body(&body, MARKER),
            Envelope::Reference(ObjectRef::new("b", "acme/scope.craft.event.json"))
        );
    }

    #[test]
    fn test_parse_marker_without_bucket_is_malformed() {
        let body = r#"{"Records":[{"eventSource":"aws:s3","eventName":"ObjectCreated:Put",
                      "s3":{"object":{"key":"acme/scope.craft.event.json"}}}]}"#;
        assert!(matches!(parse_body(body, MARKER), Envelope::Malformed { .. }));
    }

    #[test]
    fn test_parse_marker_with_bad_encoding_is_malformed() {
        let body = format!(
            r#"{{"Records":[{}]}}"#,
            s3_record("ObjectCreated:Put", "b", "acme/%FF.craft.event.json")
        );
        match parse_body(&body, MARKER) {
            Envelope::Malformed { reason } => assert!(reason.contains("URL encoding")),
            other => panic!("expected malformed, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_eventbridge_other_key_is_unrelated() {
        let body = r#"{"source":"aws.s3","detail-type":"Object Created",
                      "detail":{"object":{"key":"some-key"}}}"#;
        assert!(matches!(parse_body(body, MARKER), Envelope::Unrelated { .. }));
    }

    #[test]
    fn test_parse_s3_test_event() {
        let body = r#"{"Service":"Amazon S3","Event":"s3:TestEvent",
                      "Time":"2024-01-01T00:00:00.000Z","Bucket":"test-s3"}"#;
        assert!(matches!(parse_body(body, MARKER), Envelope::Unrelated { .. }));
    }

    #[test]
    fn test_parse_eventbridge_object_created() {
        let body = r#"{"version":"0","source":"aws.s3","detail-type":"Object Created",
                      "detail":{"bucket":{"name":"test-s3"},"object":{"key":"acme/scope.craft.event.json"}}}"#;
        assert_eq!(
            parse_body(body, MARKER),
            Envelope::Reference(ObjectRef::new("test-s3", "acme/scope.craft.event.json"))
        );
    }

    #[test]
    fn test_parse_eventbridge_other_detail_type() {
        let body = r#"{"source":"aws.s3","detail-type":"Object Deleted",
                      "detail":{"bucket":{"name":"b"},"object":{"key":"k"}}}"#;
        assert!(matches!(parse_body(body, MARKER), Envelope::Unrelated { .. }));
    }

    #[test]
    fn test_parse_sns_wrapped_notification() {
        let inner = format!(
            r#"{{"Records":[{}]}}"#,
            s3_record("ObjectCreated:Put", "b", "a/x.craft.event.json")
        );
        let body = serde_json::json!({
            "Type": "Notification",
            "MessageId": "sns-1",
            "Message": inner,
        })
        .to_string();

        assert_eq!(
            parse_body(&body, MARKER),
            Envelope::Reference(ObjectRef::new("b", "a/x.craft.event.json"))
        );
    }

    #[test]
    fn test_parse_inline_deploy_request() {
        let body = r#"{"id":"123-456-789","module":"github.com/acme/app","context":{"acc":"test"}}"#;
        assert_eq!(
            parse_body(body, MARKER),
            Envelope::Inline(Bytes::from_static(body.as_bytes()))
        );
    }

    #[test]
    fn test_parse_corrupted_body_stays_inline() {
        // Decoding happens in the dispatch loop, which reports the failure.
        assert_eq!(parse_body("{", MARKER), Envelope::Inline(Bytes::from_static(b"{")));
    }
}

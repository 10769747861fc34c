//! Job identity derivation.
//!
//! Inline requests keep their own id as the job name. Referenced requests
//! take their identity from the object key:
//!
//! ```text
//! <target-path>/[<module>__]<scope><marker-suffix>
//! acme/module__scope.craft.event.json  ->  target "acme", scope "scope", job "acme-scope"
//! ```

use craft_core::event::{DeployRequest, ObjectRef};

/// Longest job name the scheduler accepts.
pub const MAX_JOB_NAME_LEN: usize = 128;

const MODULE_SEPARATOR: &str = "__";

/// Identity derived from an object key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyIdentity {
    /// Parent directory of the key, `""` for top-level keys.
    pub target: String,
    pub scope: String,
    /// Optional module segment of the file name.
    pub module: Option<String>,
    pub job_name: String,
    /// Locator of the target directory, `s3://<bucket>/<target>`.
    pub source: String,
}

/// How the job identity of a request is obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Direct,
    KeyConvention(KeyIdentity),
}

impl Resolution {
    pub fn job_name<'a>(&'a self, request: &'a DeployRequest) -> &'a str {
        match self {
            Resolution::Direct => request.id(),
            Resolution::KeyConvention(identity) => &identity.job_name,
        }
    }
}

/// Derive the job identity from an object key.
///
/// Returns `None` for keys outside the convention: a different suffix, or
/// nothing left for the scope once suffix and module are stripped.
pub fn resolve_key(object: &ObjectRef, marker_suffix: &str) -> Option<KeyIdentity> {
    let (target, file) = match object.key.rsplit_once('/') {
        Some((dir, file)) => (dir, file),
        None => ("", object.key.as_str()),
    };

    let stem = file.strip_suffix(marker_suffix)?;
    let (module, scope) = match stem.split_once(MODULE_SEPARATOR) {
        Some((module, scope)) => (Some(module).filter(|m| !m.is_empty()), scope),
        None => (None, stem),
    };
    if scope.is_empty() {
        return None;
    }

    let base = target.rsplit('/').find(|s| !s.is_empty()).unwrap_or("");
    let job_name = if base.is_empty() {
        sanitize_job_name(scope)
    } else {
        sanitize_job_name(&format!("{base}-{scope}"))
    };
    if job_name.is_empty() {
        return None;
    }

    Some(KeyIdentity {
        target: target.to_string(),
        scope: scope.to_string(),
        module: module.map(str::to_string),
        job_name,
        source: format!("s3://{}/{}", object.bucket, target),
    })
}

/// Whether the scheduler accepts `name` as a job name.
pub fn is_valid_job_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    name.len() <= MAX_JOB_NAME_LEN
        && first.is_ascii_alphanumeric()
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Map a derived name onto the scheduler's job-name alphabet.
pub fn sanitize_job_name(raw: &str) -> String {
    let mut name: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .skip_while(|c| !c.is_ascii_alphanumeric())
        .collect();
    name.truncate(MAX_JOB_NAME_LEN);
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUFFIX: &str = ".craft.event.json";

    fn resolve(key: &str) -> Option<KeyIdentity> {
        resolve_key(&ObjectRef::new("test-s3", key), SUFFIX)
    }

    #[test]
    fn derives_identity_from_module_key() {
        let id = resolve("acme/module__scope.craft.event.json").unwrap();
        assert_eq!(id.target, "acme");
        assert_eq!(id.scope, "scope");
        assert_eq!(id.module.as_deref(), Some("module"));
        assert_eq!(id.job_name, "acme-scope");
        assert_eq!(id.source, "s3://test-s3/acme");
    }

    #[test]
    fn module_segment_is_optional() {
        let id = resolve("acme/scope.craft.event.json").unwrap();
        assert_eq!(id.scope, "scope");
        assert_eq!(id.module, None);
        assert_eq!(id.job_name, "acme-scope");
    }

    #[test]
    fn nested_target_uses_its_base_name() {
        let id = resolve("deploy/prod/eu/app__web.craft.event.json").unwrap();
        assert_eq!(id.target, "deploy/prod/eu");
        assert_eq!(id.job_name, "eu-web");
        assert_eq!(id.source, "s3://test-s3/deploy/prod/eu");
    }

    #[test]
    fn top_level_key_uses_scope_alone() {
        let id = resolve("test.craft.event.json").unwrap();
        assert_eq!(id.target, "");
        assert_eq!(id.job_name, "test");
        assert_eq!(id.source, "s3://test-s3/");
    }

    #[test]
    fn other_keys_are_outside_the_convention() {
        assert!(resolve("some-key").is_none());
        assert!(resolve("acme/cdk.context.json").is_none());
        assert!(resolve("acme/.craft.event.json").is_none());
        assert!(resolve("acme/module__.craft.event.json").is_none());
    }

    #[test]
    fn derived_names_are_sanitized() {
        let id = resolve("my.team/app__v1.2.craft.event.json").unwrap();
        assert_eq!(id.scope, "v1.2");
        assert_eq!(id.job_name, "my-team-v1-2");
        assert!(is_valid_job_name(&id.job_name));
    }

    #[test]
    fn job_name_rules() {
        assert!(is_valid_job_name("123-456-789"));
        assert!(is_valid_job_name("acme_scope"));
        assert!(!is_valid_job_name(""));
        assert!(!is_valid_job_name("-leading"));
        assert!(!is_valid_job_name("has space"));
        assert!(!is_valid_job_name(&"a".repeat(MAX_JOB_NAME_LEN + 1)));
    }

    #[test]
    fn sanitize_truncates_and_trims_leading_symbols() {
        assert_eq!(sanitize_job_name("__x.y"), "x-y");
        assert_eq!(sanitize_job_name(&"b".repeat(200)).len(), MAX_JOB_NAME_LEN);
    }
}

use std::env;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Marker suffix of deploy event objects in the source bucket.
pub const DEFAULT_MARKER_SUFFIX: &str = ".craft.event.json";

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub aws: AwsConfig,
    pub queue: QueueConfig,
    pub dispatch: DispatchConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `CRAFT_PROFILE`. When set (e.g. `PROD`), every
    /// key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("CRAFT_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            aws: AwsConfig::from_env_profiled(p),
            queue: QueueConfig::from_env_profiled(p),
            dispatch: DispatchConfig::from_env_profiled(p),
        }
    }

    /// Check every identity the worker cannot run without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.queue.validate()?;
        self.dispatch.validate()
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  aws:       region={}, static_credentials={}, endpoint={}",
            self.aws.region,
            self.aws.has_static_credentials(),
            self.aws.endpoint_url.as_deref().unwrap_or("(default)")
        );
        tracing::info!(
            "  queue:     url={}, dlq={}, visibility={}s",
            self.queue.queue_url,
            self.queue.dlq_url.as_deref().unwrap_or("(none)"),
            self.queue.visibility_timeout_secs
        );
        tracing::info!(
            "  dispatch:  job_queue={}, job_definition={}, bucket={}, marker={}",
            self.dispatch.job_queue,
            self.dispatch.job_definition,
            self.dispatch.bucket.as_deref().unwrap_or("(none)"),
            self.dispatch.marker_suffix
        );
    }
}

// ── AWS ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub endpoint_url: Option<String>,
}

impl AwsConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            region: profiled_env_or(p, "AWS_REGION", "us-east-1"),
            access_key_id: profiled_env_opt(p, "AWS_ACCESS_KEY_ID"),
            secret_access_key: profiled_env_opt(p, "AWS_SECRET_ACCESS_KEY"),
            session_token: profiled_env_opt(p, "AWS_SESSION_TOKEN"),
            endpoint_url: profiled_env_opt(p, "AWS_ENDPOINT_URL"),
        }
    }

    pub fn has_static_credentials(&self) -> bool {
        self.access_key_id.is_some() && self.secret_access_key.is_some()
    }

    /// Endpoint override with a scheme, or `None` for the regional default.
    pub fn endpoint(&self) -> Option<String> {
        let endpoint = self.endpoint_url.as_deref().filter(|e| !e.is_empty())?;
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            Some(endpoint.to_string())
        } else {
            Some(format!("https://{endpoint}"))
        }
    }
}

// ── Queue (event source) ──────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub queue_url: String,
    pub dlq_url: Option<String>,
    pub visibility_timeout_secs: u32,
    pub max_batch_size: u32,
    /// Pause between polls; also the back-off after a failed poll.
    pub poll_interval_ms: u64,
}

impl QueueConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            queue_url: profiled_env_or(p, "CRAFT_QUEUE_URL", ""),
            dlq_url: profiled_env_opt(p, "CRAFT_DLQ_URL"),
            visibility_timeout_secs: profiled_env_u32(p, "CRAFT_VISIBILITY_TIMEOUT_SECS", 300),
            max_batch_size: profiled_env_u32(p, "CRAFT_MAX_BATCH_SIZE", 10),
            poll_interval_ms: profiled_env_u64(p, "CRAFT_POLL_INTERVAL_MS", 0),
        }
    }

    /// Longest visibility timeout SQS accepts (12 hours).
    pub const MAX_VISIBILITY_TIMEOUT_SECS: u32 = 43_200;

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_url.trim().is_empty() {
            return Err(ConfigError::Missing("CRAFT_QUEUE_URL"));
        }
        if self.visibility_timeout_secs > Self::MAX_VISIBILITY_TIMEOUT_SECS {
            return Err(ConfigError::Invalid {
                key: "CRAFT_VISIBILITY_TIMEOUT_SECS",
                reason: format!(
                    "{} exceeds the SQS maximum of {}",
                    self.visibility_timeout_secs,
                    Self::MAX_VISIBILITY_TIMEOUT_SECS
                ),
            });
        }
        Ok(())
    }
}

// ── Dispatch (job scheduler + source bucket) ──────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Job queue identity jobs are submitted to.
    pub job_queue: String,
    /// Job definition identity (name, name:revision or ARN).
    pub job_definition: String,
    /// Bucket holding referenced deploy events. Without it, reference
    /// envelopes fail to fetch.
    pub bucket: Option<String>,
    pub marker_suffix: String,
}

impl DispatchConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            job_queue: profiled_env_or(p, "CRAFT_JOB_QUEUE", ""),
            job_definition: profiled_env_or(p, "CRAFT_JOB_DEFINITION", ""),
            bucket: profiled_env_opt(p, "CRAFT_BUCKET"),
            marker_suffix: profiled_env_or(p, "CRAFT_MARKER_SUFFIX", DEFAULT_MARKER_SUFFIX),
        }
    }

    /// Build a config directly, e.g. in tests or embedding code.
    pub fn new(job_queue: impl Into<String>, job_definition: impl Into<String>) -> Self {
        Self {
            job_queue: job_queue.into(),
            job_definition: job_definition.into(),
            bucket: None,
            marker_suffix: DEFAULT_MARKER_SUFFIX.to_string(),
        }
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.job_queue.trim().is_empty() {
            return Err(ConfigError::Missing("CRAFT_JOB_QUEUE"));
        }
        if self.job_definition.trim().is_empty() {
            return Err(ConfigError::Missing("CRAFT_JOB_DEFINITION"));
        }
        if matches!(self.bucket.as_deref(), Some(b) if b.trim().is_empty()) {
            return Err(ConfigError::Invalid {
                key: "CRAFT_BUCKET",
                reason: "must not be blank".into(),
            });
        }
        if self.marker_suffix.is_empty() {
            return Err(ConfigError::Invalid {
                key: "CRAFT_MARKER_SUFFIX",
                reason: "must not be empty".into(),
            });
        }
        Ok(())
    }
}

//! Job submission against the compute scheduler.
//!
//! [`JobSubmitter`] turns a validated request into a [`JobSubmission`] and
//! hands it to a [`JobScheduler`]. Exactly one scheduler call is made per
//! request; retries happen at the message level, so a retry after a
//! submission that succeeded remotely can create a second job with the same
//! name.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_batch::error::{DisplayErrorContext, SdkError};
use aws_sdk_batch::types::{ContainerOverrides, KeyValuePair};
use aws_sdk_batch::Client;
use tracing::{debug, info};

use craft_core::aws::load_sdk_config;
use craft_core::config::AwsConfig;
use craft_core::event::DeployRequest;

use crate::error::SubmitError;
use crate::resolver::Resolution;

/// Module identity of the request.
pub const ENV_MODULE: &str = "CRAFT_MODULE";
/// Raw deployment context JSON.
pub const ENV_CONTEXT: &str = "CRAFT_CDK_CONTEXT";
/// `s3://<bucket>/<target>` locator (key convention only).
pub const ENV_SOURCE: &str = "CRAFT_SOURCE";
/// Target path inside the bucket (key convention only).
pub const ENV_TARGET: &str = "CRAFT_TARGET";

/// Scheduler-assigned job identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobId(pub String);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One job-submission call. Built per request, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSubmission {
    pub job_name: String,
    pub job_definition: String,
    pub job_queue: String,
    /// Container environment overrides, in submission order.
    pub environment: Vec<(String, String)>,
}

impl JobSubmission {
    pub fn env(&self, key: &str) -> Option<&str> {
        self.environment
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A remote scheduler that accepts job submissions.
#[async_trait]
pub trait JobScheduler: Send + Sync {
    async fn submit_job(&self, job: &JobSubmission) -> Result<JobId, SubmitError>;

    /// Scheduler name for logs (e.g. "batch").
    fn name(&self) -> &str;
}

/// Builds and issues job submissions with the configured queue and definition.
#[derive(Clone)]
pub struct JobSubmitter {
    scheduler: Arc<dyn JobScheduler>,
    job_queue: String,
    job_definition: String,
}

impl JobSubmitter {
    pub fn new(
        scheduler: Arc<dyn JobScheduler>,
        job_queue: impl Into<String>,
        job_definition: impl Into<String>,
    ) -> Self {
        Self {
            scheduler,
            job_queue: job_queue.into(),
            job_definition: job_definition.into(),
        }
    }

    /// The submission for `request`. Deterministic in its inputs.
    pub fn build(&self, request: &DeployRequest, resolution: &Resolution) -> JobSubmission {
        let mut environment = vec![
            (ENV_MODULE.to_string(), request.module().to_string()),
            (ENV_CONTEXT.to_string(), request.context_str().to_string()),
        ];
        if let Resolution::KeyConvention(identity) = resolution {
            environment.push((ENV_SOURCE.to_string(), identity.source.clone()));
            environment.push((ENV_TARGET.to_string(), identity.target.clone()));
        }

        JobSubmission {
            job_name: resolution.job_name(request).to_string(),
            job_definition: self.job_definition.clone(),
            job_queue: self.job_queue.clone(),
            environment,
        }
    }

    /// Submit one job for `request`. Does not retry.
    pub async fn submit(
        &self,
        request: &DeployRequest,
        resolution: &Resolution,
    ) -> Result<JobId, SubmitError> {
        let job = self.build(request, resolution);
        debug!(
            job_name = %job.job_name,
            scheduler = self.scheduler.name(),
            "Submitting job"
        );

        let job_id = self.scheduler.submit_job(&job).await?;
        info!(
            id = %request.id(),
            job_name = %job.job_name,
            job_id = %job_id,
            "job scheduled"
        );
        Ok(job_id)
    }
}

// ── AWS Batch ───────────────────────────────────────────────────────

/// A submission without a job id is not one we can report as scheduled.
fn job_id_from(job_id: Option<&str>) -> Result<JobId, SubmitError> {
    match job_id {
        Some(id) if !id.is_empty() => Ok(JobId(id.to_string())),
        _ => Err(SubmitError::Rejected("SubmitJob returned no job id".into())),
    }
}

/// [`JobScheduler`] backed by AWS Batch `SubmitJob`.
pub struct BatchScheduler {
    client: Client,
}

impl BatchScheduler {
    pub async fn new(aws: &AwsConfig) -> Self {
        let sdk_config = load_sdk_config(aws).await;
        info!(region = %aws.region, "Batch scheduler initialized");
        Self::from_client(Client::new(&sdk_config))
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl JobScheduler for BatchScheduler {
    async fn submit_job(&self, job: &JobSubmission) -> Result<JobId, SubmitError> {
        let environment = job
            .environment
            .iter()
            .map(|(name, value)| KeyValuePair::builder().name(name).value(value).build())
            .collect::<Vec<_>>();

        let resp = self
            .client
            .submit_job()
            .job_name(&job.job_name)
            .job_definition(&job.job_definition)
            .job_queue(&job.job_queue)
            .container_overrides(
                ContainerOverrides::builder()
                    .set_environment(Some(environment))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| {
                let detail = DisplayErrorContext(&e).to_string();
                match e {
                    SdkError::ServiceError(_) => SubmitError::Rejected(detail),
                    _ => SubmitError::Transport(detail),
                }
            })?;

        job_id_from(resp.job_id())
    }

    fn name(&self) -> &str {
        "batch"
    }
}

//! Shared mocks for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::SubmitError;
use crate::submit::{JobId, JobScheduler, JobSubmission};

/// Scheduler that records every submission and answers with a fixed result.
pub(crate) struct RecordingScheduler {
    calls: AtomicUsize,
    submitted: Mutex<Vec<JobSubmission>>,
    fail_with: Option<SubmitError>,
}

impl RecordingScheduler {
    /// Accepts every job as `job-<job_name>`.
    pub(crate) fn ok() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            submitted: Mutex::new(Vec::new()),
            fail_with: None,
        })
    }

    pub(crate) fn failing(err: SubmitError) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            submitted: Mutex::new(Vec::new()),
            fail_with: Some(err),
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) async fn submitted(&self) -> Vec<JobSubmission> {
        self.submitted.lock().await.clone()
    }
}

#[async_trait]
impl JobScheduler for RecordingScheduler {
    async fn submit_job(&self, job: &JobSubmission) -> Result<JobId, SubmitError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.submitted.lock().await.push(job.clone());
        match &self.fail_with {
            Some(err) => Err(err.clone()),
            None => Ok(JobId(format!("job-{}", job.job_name))),
        }
    }

    fn name(&self) -> &str {
        "recording"
    }
}

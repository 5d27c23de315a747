use std::sync::{Arc, Mutex};

use serde_json::{Value, json};

use crate::bail;
use crate::error::{BqGcsResult, ErrorKind};
use crate::extract::{ExtractJob, ExtractJobClient, ExtractResult, JobReference};

/// Slot milliseconds reported by every finished job.
pub const TOTAL_SLOT_MS: i64 = 1234;

#[derive(Debug, Default)]
struct Inner {
    jobs: Vec<ExtractJob>,
    get_calls: usize,
    pending_polls: usize,
    remaining_polls: usize,
    job_error: Option<(String, String)>,
}

/// [`ExtractJobClient`] finishing jobs in memory.
///
/// Jobs are reported as running for a configurable number of status checks and then finish,
/// successfully unless a job error was configured.
#[derive(Debug, Clone, Default)]
pub struct MemoryExtractClient {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryExtractClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports each job as running for `polls` status checks.
    pub fn with_pending_polls(self, polls: usize) -> Self {
        self.inner.lock().unwrap().pending_polls = polls;
        self
    }

    /// Makes every job finish with the given error.
    pub fn fail_jobs_with(self, reason: &str, message: &str) -> Self {
        self.inner.lock().unwrap().job_error = Some((reason.to_string(), message.to_string()));
        self
    }

    /// Returns the submitted jobs, in submission order.
    pub fn jobs(&self) -> Vec<ExtractJob> {
        self.inner.lock().unwrap().jobs.clone()
    }

    pub fn get_calls(&self) -> usize {
        self.inner.lock().unwrap().get_calls
    }
}

fn job_resource(job: &ExtractJob, done: bool, job_error: Option<&(String, String)>) -> Value {
    let mut resource = job.to_resource();

    if done {
        resource["statistics"] = json!({
            "startTime": "1700000000000",
            "endTime": "1700000002500",
            "totalSlotMs": TOTAL_SLOT_MS.to_string(),
        });
        resource["status"] = match job_error {
            Some((reason, message)) => json!({
                "state": "DONE",
                "errorResult": { "reason": reason, "message": message },
            }),
            None => json!({ "state": "DONE" }),
        };
    } else {
        resource["status"] = json!({ "state": "RUNNING" });
    }

    resource
}

impl ExtractJobClient for MemoryExtractClient {
    async fn insert_job(&self, job: &ExtractJob) -> BqGcsResult<ExtractResult> {
        let mut inner = self.inner.lock().unwrap();
        inner.jobs.push(job.clone());
        inner.remaining_polls = inner.pending_polls;

        let done = inner.remaining_polls == 0;
        Ok(ExtractResult::new(job_resource(
            job,
            done,
            inner.job_error.as_ref(),
        )))
    }

    async fn get_job(&self, job_reference: &JobReference) -> BqGcsResult<ExtractResult> {
        let mut inner = self.inner.lock().unwrap();
        inner.get_calls += 1;

        let Some(job) = inner
            .jobs
            .iter()
            .find(|job| &job.job_reference == job_reference)
            .cloned()
        else {
            bail!(
                ErrorKind::ApiRequestFailed,
                "Google API returned an error",
                format!("job {} not found", job_reference.job_id)
            );
        };

        inner.remaining_polls = inner.remaining_polls.saturating_sub(1);
        let done = inner.remaining_polls == 0;

        Ok(ExtractResult::new(job_resource(
            &job,
            done,
            inner.job_error.as_ref(),
        )))
    }
}

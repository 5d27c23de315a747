//! Table extract jobs: request and result types, the job client seam and the dispatcher
//! which drives a job to completion.

use std::future::Future;
use std::time::{Duration, Instant};

use bq_gcs_config::shared::ExtractConfig;
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::bail;
use crate::error::{BqGcsResult, ErrorKind};
use crate::metrics::{
    BQ_GCS_EXTRACT_JOB_DURATION_SECONDS, BQ_GCS_EXTRACT_JOBS_TOTAL, OUTCOME_FAILURE,
    OUTCOME_LABEL, OUTCOME_SUCCESS,
};

/// Location used when the payload does not name one.
pub const DEFAULT_LOCATION: &str = "EU";

/// Prefix of every extract job id.
pub const JOB_ID_PREFIX: &str = "bq-gcs";

/// Format of the extracted objects.
pub const DESTINATION_FORMAT: &str = "CSV";

/// Table to extract, as requested by an incoming message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractRequest {
    pub project: String,
    pub dataset: String,
    pub table: String,
    /// Location of the source dataset. The job must run there.
    pub location: String,
}

impl ExtractRequest {
    /// Returns the `project.dataset.table` identity of the source table.
    pub fn qualified_table(&self) -> String {
        format!("{}.{}.{}", self.project, self.dataset, self.table)
    }
}

/// Returns the object a table is extracted to: `gs://{bucket}/{dataset}/{table}.csv`.
pub fn destination_uri(bucket: &str, request: &ExtractRequest) -> String {
    format!("gs://{bucket}/{}/{}.csv", request.dataset, request.table)
}

/// Identity of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReference {
    pub project_id: String,
    pub job_id: String,
    pub location: String,
}

/// Identity of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableReference {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
}

impl std::fmt::Display for TableReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.project_id, self.dataset_id, self.table_id)
    }
}

/// Extract job submitted to the job engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractJob {
    pub job_reference: JobReference,
    pub source_table: TableReference,
    pub destination_uris: Vec<String>,
    pub destination_format: &'static str,
}

impl ExtractJob {
    /// Builds a CSV extract job with a fresh `bq-gcs-{uuid}` id, run in `job_project`.
    pub fn new(job_project: &str, request: &ExtractRequest, destination_uri: String) -> Self {
        Self {
            job_reference: JobReference {
                project_id: job_project.to_string(),
                job_id: format!("{JOB_ID_PREFIX}-{}", Uuid::new_v4()),
                location: request.location.clone(),
            },
            source_table: TableReference {
                project_id: request.project.clone(),
                dataset_id: request.dataset.clone(),
                table_id: request.table.clone(),
            },
            destination_uris: vec![destination_uri],
            destination_format: DESTINATION_FORMAT,
        }
    }

    /// Returns the job resource sent to `jobs.insert`.
    pub fn to_resource(&self) -> Value {
        serde_json::json!({
            "jobReference": self.job_reference,
            "configuration": {
                "extract": {
                    "sourceTable": self.source_table,
                    "destinationUris": self.destination_uris,
                    "destinationFormat": self.destination_format,
                }
            }
        })
    }
}

/// Terminal error of a failed job.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JobError {
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
}

/// Job metadata returned by the job engine, kept verbatim.
///
/// Serializes as the raw job resource. The accessors read the fields the function cares about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtractResult(Value);

impl ExtractResult {
    pub fn new(job: Value) -> Self {
        Self(job)
    }

    pub fn as_json(&self) -> &Value {
        &self.0
    }

    pub fn job_id(&self) -> Option<&str> {
        self.0.pointer("/jobReference/jobId")?.as_str()
    }

    /// Returns the job state (`PENDING`, `RUNNING` or `DONE`).
    pub fn state(&self) -> Option<&str> {
        self.0.pointer("/status/state")?.as_str()
    }

    pub fn is_done(&self) -> bool {
        self.state() == Some("DONE")
    }

    /// Returns the error which made the job fail, if it failed.
    pub fn error_result(&self) -> Option<JobError> {
        let error = self.0.pointer("/status/errorResult")?;
        serde_json::from_value(error.clone()).ok()
    }

    /// Returns the slot milliseconds consumed by the job.
    pub fn total_slot_ms(&self) -> Option<i64> {
        json_int(self.0.pointer("/statistics/totalSlotMs")?)
    }

    /// Returns the time between job start and end, once both are known.
    pub fn elapsed(&self) -> Option<Duration> {
        let start = json_int(self.0.pointer("/statistics/startTime")?)?;
        let end = json_int(self.0.pointer("/statistics/endTime")?)?;

        u64::try_from(end - start).ok().map(Duration::from_millis)
    }

    /// Returns the source table of the extract.
    pub fn source_table(&self) -> Option<TableReference> {
        let table = self.0.pointer("/configuration/extract/sourceTable")?;
        serde_json::from_value(table.clone()).ok()
    }

    /// Returns the objects written by the extract.
    pub fn destination_uris(&self) -> Vec<String> {
        self.0
            .pointer("/configuration/extract/destinationUris")
            .and_then(Value::as_array)
            .map(|uris| {
                uris.iter()
                    .filter_map(|uri| uri.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Reads an int64 field, which the REST API encodes as a string.
fn json_int(value: &Value) -> Option<i64> {
    match value {
        Value::String(value) => value.parse().ok(),
        value => value.as_i64(),
    }
}

/// Client of the managed extract job engine.
pub trait ExtractJobClient: Send + Sync {
    /// Submits `job` and returns its metadata right after submission.
    fn insert_job(&self, job: &ExtractJob) -> impl Future<Output = BqGcsResult<ExtractResult>> + Send;

    /// Returns the current metadata of a submitted job.
    fn get_job(
        &self,
        job_reference: &JobReference,
    ) -> impl Future<Output = BqGcsResult<ExtractResult>> + Send;
}

/// Submits extract jobs and waits for them to finish.
#[derive(Debug)]
pub struct ExtractDispatcher<C> {
    client: C,
    bucket: String,
    job_project: String,
    polling: ExtractConfig,
}

impl<C> ExtractDispatcher<C>
where
    C: ExtractJobClient,
{
    /// Creates a dispatcher writing to `bucket` and running jobs in `job_project`.
    pub fn new(client: C, bucket: String, job_project: String, polling: ExtractConfig) -> Self {
        Self {
            client,
            bucket,
            job_project,
            polling,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Extracts the requested table to CSV and returns the finished job metadata.
    ///
    /// Waits for the job without an overall timeout. A job which finishes with an error is
    /// reported as [`ErrorKind::ExtractJobFailed`] and is never resubmitted.
    pub async fn extract_table(&self, request: &ExtractRequest) -> BqGcsResult<ExtractResult> {
        let job = ExtractJob::new(
            &self.job_project,
            request,
            destination_uri(&self.bucket, request),
        );
        let job_id = job.job_reference.job_id.clone();

        info!(
            job_id = %job_id,
            source_table = %job.source_table,
            destination_uri = %job.destination_uris.join(","),
            location = %request.location,
            "submitting extract job"
        );

        let submitted_at = Instant::now();
        let mut result = self.client.insert_job(&job).await?;

        let initial_delay = Duration::from_millis(self.polling.poll_initial_ms);
        let max_delay = Duration::from_millis(self.polling.poll_max_ms);
        let mut delay = initial_delay;

        while !result.is_done() {
            debug!(
                job_id = %job_id,
                state = result.state().unwrap_or("UNKNOWN"),
                delay_ms = delay.as_millis() as u64,
                "extract job not done yet"
            );

            tokio::time::sleep(delay).await;
            delay = delay.saturating_mul(2).min(max_delay);

            result = self.client.get_job(&job.job_reference).await?;
        }

        histogram!(BQ_GCS_EXTRACT_JOB_DURATION_SECONDS).record(submitted_at.elapsed().as_secs_f64());

        if let Some(job_error) = result.error_result() {
            counter!(BQ_GCS_EXTRACT_JOBS_TOTAL, OUTCOME_LABEL => OUTCOME_FAILURE).increment(1);
            error!(
                job_id = %job_id,
                reason = %job_error.reason,
                message = %job_error.message,
                "extract job failed"
            );

            bail!(
                ErrorKind::ExtractJobFailed,
                "Extract job failed",
                format!(
                    "job {job_id} extracting {}: {}: {}",
                    job.source_table, job_error.reason, job_error.message
                )
            );
        }

        counter!(BQ_GCS_EXTRACT_JOBS_TOTAL, OUTCOME_LABEL => OUTCOME_SUCCESS).increment(1);
        info!(
            job_id = %job_id,
            total_slot_ms = result.total_slot_ms(),
            "extract job done"
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn request() -> ExtractRequest {
        ExtractRequest {
            project: "p".to_string(),
            dataset: "d".to_string(),
            table: "t".to_string(),
            location: DEFAULT_LOCATION.to_string(),
        }
    }

    #[test]
    fn destination_uri_uses_bucket_dataset_and_table() {
        assert_eq!(destination_uri("B", &request()), "gs://B/d/t.csv");
    }

    #[test]
    fn job_ids_are_prefixed_and_unique() {
        let first = ExtractJob::new("runner", &request(), "gs://B/d/t.csv".to_string());
        let second = ExtractJob::new("runner", &request(), "gs://B/d/t.csv".to_string());

        assert!(first.job_reference.job_id.starts_with("bq-gcs-"));
        assert_ne!(first.job_reference.job_id, second.job_reference.job_id);
        assert_eq!(first.job_reference.project_id, "runner");
        assert_eq!(first.job_reference.location, "EU");
    }

    #[test]
    fn job_resource_describes_a_csv_extract() {
        let job = ExtractJob::new("runner", &request(), "gs://B/d/t.csv".to_string());
        let resource = job.to_resource();

        assert_eq!(
            resource["configuration"]["extract"],
            json!({
                "sourceTable": { "projectId": "p", "datasetId": "d", "tableId": "t" },
                "destinationUris": ["gs://B/d/t.csv"],
                "destinationFormat": "CSV",
            })
        );
        assert_eq!(resource["jobReference"]["location"], "EU");
    }

    #[test]
    fn result_accessors_read_rest_encoded_fields() {
        let result = ExtractResult::new(json!({
            "jobReference": { "projectId": "runner", "jobId": "bq-gcs-1", "location": "EU" },
            "configuration": {
                "extract": {
                    "sourceTable": { "projectId": "p", "datasetId": "d", "tableId": "t" },
                    "destinationUris": ["gs://B/d/t.csv"]
                }
            },
            "statistics": { "startTime": "1000", "endTime": "3500", "totalSlotMs": "42" },
            "status": { "state": "DONE" }
        }));

        assert!(result.is_done());
        assert_eq!(result.job_id(), Some("bq-gcs-1"));
        assert_eq!(result.total_slot_ms(), Some(42));
        assert_eq!(result.elapsed(), Some(Duration::from_millis(2500)));
        assert_eq!(result.source_table().unwrap().to_string(), "p.d.t");
        assert_eq!(result.destination_uris(), vec!["gs://B/d/t.csv".to_string()]);
        assert_eq!(result.error_result(), None);
    }

    #[test]
    fn error_result_is_exposed() {
        let result = ExtractResult::new(json!({
            "status": {
                "state": "DONE",
                "errorResult": { "reason": "notFound", "message": "Not found: Table p:d.t" }
            }
        }));

        let error = result.error_result().unwrap();
        assert_eq!(error.reason, "notFound");
        assert_eq!(error.message, "Not found: Table p:d.t");
        assert_eq!(result.total_slot_ms(), None);
        assert!(result.destination_uris().is_empty());
    }
}

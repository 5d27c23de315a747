use reqwest::Method;
use serde_json::Value;

use crate::error::BqGcsResult;
use crate::extract::{ExtractJob, ExtractJobClient, ExtractResult, JobReference};
use crate::gcp::GoogleApiClient;

/// [`ExtractJobClient`] backed by the BigQuery v2 jobs REST API.
#[derive(Debug, Clone)]
pub struct BigQueryJobClient {
    api: GoogleApiClient,
    base_url: String,
}

impl BigQueryJobClient {
    /// Creates a client for the API rooted at `base_url` (for example
    /// `https://bigquery.googleapis.com/bigquery/v2`).
    pub fn new(api: GoogleApiClient, base_url: String) -> Self {
        Self {
            api,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl ExtractJobClient for BigQueryJobClient {
    async fn insert_job(&self, job: &ExtractJob) -> BqGcsResult<ExtractResult> {
        let url = format!(
            "{}/projects/{}/jobs",
            self.base_url, job.job_reference.project_id
        );

        let request = self
            .api
            .request(Method::POST, url)
            .await?
            .json(&job.to_resource());
        let job: Value = self.api.send_json(request, "jobs.insert").await?;

        Ok(ExtractResult::new(job))
    }

    async fn get_job(&self, job_reference: &JobReference) -> BqGcsResult<ExtractResult> {
        let url = format!(
            "{}/projects/{}/jobs/{}",
            self.base_url, job_reference.project_id, job_reference.job_id
        );

        let request = self
            .api
            .request(Method::GET, url)
            .await?
            .query(&[("location", job_reference.location.as_str())]);
        let job: Value = self.api.send_json(request, "jobs.get").await?;

        Ok(ExtractResult::new(job))
    }
}

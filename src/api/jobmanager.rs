//! HTTP client for the upstream job-manager service.
//!
//! The engine forwards the caller's bearer token on every request; it never
//! holds credentials of its own for the job manager.

use crate::jobs::types::{Job, Resource, Result};
use tracing::debug;

#[derive(Clone)]
pub struct JobManagerClient {
    http: reqwest::Client,
    base_url: String,
}

impl JobManagerClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Fetch the batch of jobs the job manager considers executable.
    pub async fn fetch_executable_jobs(&self, bearer: &str) -> Result<Vec<Job>> {
        let url = format!("{}/jobs/executable", self.base_url);
        debug!("fetching executable jobs from {url}");
        let jobs = self
            .http
            .get(&url)
            .bearer_auth(bearer)
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<Job>>()
            .await?;
        Ok(jobs)
    }

    /// Push one executed job (with its updated state and resource record)
    /// back to the job manager.
    pub async fn update_job(&self, bearer: &str, job: &Job) -> Result<()> {
        let url = format!("{}/jobs/{}", self.base_url, job.id);
        debug!("updating job {} at {url}", job.id);
        self.http
            .put(&url)
            .bearer_auth(bearer)
            .json(job)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Push one resource's current status to the job manager.
    pub async fn update_resource_status(&self, bearer: &str, resource: &Resource) -> Result<()> {
        let url = format!(
            "{}/resources/status/{}",
            self.base_url, resource.resource_uid
        );
        debug!("updating resource status at {url}");
        self.http
            .put(&url)
            .bearer_auth(bearer)
            .json(resource)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gcp_auth::TokenProvider;
use log::{debug, info};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::LoadJobError;
use crate::invoker::{JobErrorEntry, JobOutcome, Warehouse};
use crate::metadata::LoadJobMetadata;

const BIGQUERY_API: &str = "https://bigquery.googleapis.com/bigquery/v2";
const BIGQUERY_SCOPE: &str = "https://www.googleapis.com/auth/bigquery";
const JOB_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// The slice of a `jobs.insert` / `jobs.get` response the loader looks at.
/// Everything else (including the echoed load configuration) is ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobResource {
    job_reference: JobReference,
    #[serde(default)]
    status: JobStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatus {
    #[serde(default)]
    state: String,
    #[serde(default)]
    error_result: Option<JobErrorEntry>,
    #[serde(default)]
    errors: Vec<JobErrorEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    error: ApiError,
}

#[derive(Debug, Default, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

pub struct BigQueryWarehouse {
    http: reqwest::Client,
    auth: Arc<dyn TokenProvider>,
    project_id: String,
}

impl BigQueryWarehouse {
    /// Authenticate with the ambient Google credentials. An explicit
    /// `project_id` wins over the one attached to the credentials.
    pub async fn connect(project_id: Option<String>) -> Result<Self, LoadJobError> {
        let auth = gcp_auth::provider().await?;
        let project_id = match project_id {
            Some(project_id) => project_id,
            None => auth
                .project_id()
                .await
                .map(|p| p.to_string())
                .map_err(|e| {
                    LoadJobError::Config(format!(
                        "no project id, pass --project-id or set GOOGLE_CLOUD_PROJECT ({e})"
                    ))
                })?,
        };
        let http = reqwest::Client::builder()
            .user_agent(concat!("bql/", env!("CARGO_PKG_VERSION")))
            .https_only(true)
            .build()?;
        Ok(Self {
            http,
            auth,
            project_id,
        })
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    fn jobs_url(&self) -> String {
        format!("{}/projects/{}/jobs", BIGQUERY_API, self.project_id)
    }

    async fn insert_job(&self, body: &Value) -> Result<JobResource, LoadJobError> {
        let token = self.auth.token(&[BIGQUERY_SCOPE]).await?;
        let response = self
            .http
            .post(self.jobs_url())
            .bearer_auth(token.as_str())
            .json(body)
            .send()
            .await?;
        read_job(response).await
    }

    async fn get_job(&self, job_id: &str, location: Option<&str>) -> Result<JobResource, LoadJobError> {
        let token = self.auth.token(&[BIGQUERY_SCOPE]).await?;
        let mut request = self
            .http
            .get(format!("{}/{}", self.jobs_url(), job_id))
            .bearer_auth(token.as_str());
        if let Some(location) = location {
            request = request.query(&[("location", location)]);
        }
        read_job(request.send().await?).await
    }

    async fn wait_until_done(&self, mut job: JobResource) -> Result<JobResource, LoadJobError> {
        while job.status.state != "DONE" {
            debug!(
                "Job {} is {}, checking again in {:?}",
                job.job_reference.job_id, job.status.state, JOB_POLL_INTERVAL
            );
            tokio::time::sleep(JOB_POLL_INTERVAL).await;
            job = self
                .get_job(
                    &job.job_reference.job_id,
                    job.job_reference.location.as_deref(),
                )
                .await?;
        }
        Ok(job)
    }
}

#[async_trait]
impl Warehouse for BigQueryWarehouse {
    async fn load(
        &self,
        dataset_id: &str,
        table_id: &str,
        source_uris: &[String],
        metadata: &LoadJobMetadata,
    ) -> Result<JobOutcome, LoadJobError> {
        let body = load_job_body(
            &self.project_id,
            &Uuid::new_v4().to_string(),
            dataset_id,
            table_id,
            source_uris,
            metadata,
        )?;

        let created = self.insert_job(&body).await?;
        info!(
            "Inserted load job {} in {}",
            created.job_reference.job_id, metadata.location
        );
        let finished = self.wait_until_done(created).await?;

        Ok(JobOutcome {
            job_id: finished.job_reference.job_id,
            errors: error_entries(finished.status),
        })
    }
}

/// Build the `jobs.insert` request body. The serialized metadata becomes the
/// load configuration as is, so schema fields and partitioning descriptors
/// reach the API exactly as they were written in the schema file.
pub fn load_job_body(
    project_id: &str,
    job_id: &str,
    dataset_id: &str,
    table_id: &str,
    source_uris: &[String],
    metadata: &LoadJobMetadata,
) -> Result<Value, LoadJobError> {
    let mut load = match serde_json::to_value(metadata)? {
        Value::Object(load) => load,
        other => {
            return Err(LoadJobError::Config(format!(
                "job metadata did not serialize to an object: {other}"
            )))
        }
    };
    // location belongs to the job reference, not the load configuration
    load.remove("location");
    load.insert("sourceUris".to_string(), json!(source_uris));
    load.insert(
        "destinationTable".to_string(),
        json!({
            "projectId": project_id,
            "datasetId": dataset_id,
            "tableId": table_id,
        }),
    );

    Ok(json!({
        "jobReference": {
            "projectId": project_id,
            "jobId": job_id,
            "location": metadata.location,
        },
        "configuration": {"load": load},
    }))
}

async fn read_job(response: reqwest::Response) -> Result<JobResource, LoadJobError> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await?;
        let message = serde_json::from_str::<ApiErrorBody>(&text)
            .map(|body| body.error.message)
            .ok()
            .filter(|m| !m.is_empty())
            .unwrap_or(text);
        return Err(LoadJobError::Rejected {
            status: status.as_u16(),
            message,
        });
    }
    Ok(response.json().await?)
}

// `errors` holds every problem seen while running; a job can also end with
// only `errorResult` set
fn error_entries(status: JobStatus) -> Vec<JobErrorEntry> {
    match (status.errors, status.error_result) {
        (errors, _) if !errors.is_empty() => errors,
        (_, Some(error_result)) => vec![error_result],
        _ => vec![],
    }
}

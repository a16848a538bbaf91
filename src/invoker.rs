use async_trait::async_trait;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};

use crate::error::LoadJobError;
use crate::metadata::LoadJobMetadata;
use crate::Cli;

/// Where the data comes from and where it goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub dataset_id: String,
    pub table_id: String,
    pub bucket_name: String,
    pub file_name: String,
    pub verify_source: bool,
}

impl From<&Cli> for LoadRequest {
    fn from(args: &Cli) -> Self {
        Self {
            dataset_id: args.dataset_id.clone(),
            table_id: args.table_id.clone(),
            bucket_name: args.bucket_name.clone(),
            file_name: args.file_name.clone(),
            verify_source: args.verify_source,
        }
    }
}

/// One error reported by a finished job.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobErrorEntry {
    pub reason: Option<String>,
    pub location: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub job_id: String,
    pub errors: Vec<JobErrorEntry>,
}

impl JobOutcome {
    pub fn into_result(self) -> Result<JobOutcome, LoadJobError> {
        if self.errors.is_empty() {
            Ok(self)
        } else {
            Err(LoadJobError::JobFailed {
                job_id: self.job_id,
                errors: self.errors,
            })
        }
    }
}

/// A data warehouse that can run load jobs.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Submit one load job reading `source_uris` into `dataset_id.table_id`
    /// and wait until the service reports it finished.
    async fn load(
        &self,
        dataset_id: &str,
        table_id: &str,
        source_uris: &[String],
        metadata: &LoadJobMetadata,
    ) -> Result<JobOutcome, LoadJobError>;
}

/// An object store that holds the source files.
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// URI the warehouse should read `file_name` in `bucket` from.
    fn source_uri(&self, bucket: &str, file_name: &str) -> String;

    /// URIs of the objects in `bucket` matched by `file_name`, which may
    /// contain `*` wildcards.
    async fn matching_objects(
        &self,
        bucket: &str,
        file_name: &str,
    ) -> Result<Vec<String>, LoadJobError>;
}

pub async fn submit_load_job(
    warehouse: &dyn Warehouse,
    storage: &dyn SourceStore,
    request: &LoadRequest,
    metadata: &LoadJobMetadata,
) -> Result<JobOutcome, LoadJobError> {
    if request.verify_source {
        let matches = storage
            .matching_objects(&request.bucket_name, &request.file_name)
            .await?;
        if matches.is_empty() {
            return Err(LoadJobError::NoMatchingSource {
                bucket: request.bucket_name.clone(),
                file_name: request.file_name.clone(),
            });
        }
        info!("{} object(s) match {}", matches.len(), request.file_name);
    }

    let source_uris = vec![storage.source_uri(&request.bucket_name, &request.file_name)];
    if let Ok(json) = serde_json::to_string(metadata) {
        debug!("Job metadata: {}", json);
    }

    println!(
        "Loading {} into {}:{} from {}...",
        request.file_name, request.dataset_id, request.table_id, request.bucket_name
    );
    let outcome = warehouse
        .load(
            &request.dataset_id,
            &request.table_id,
            &source_uris,
            metadata,
        )
        .await?;
    println!("Job {} completed.", outcome.job_id);

    for entry in &outcome.errors {
        error!(
            "Job {} error: {} ({})",
            outcome.job_id,
            entry.message.as_deref().unwrap_or("no message"),
            entry.reason.as_deref().unwrap_or("unknown reason"),
        );
    }
    outcome.into_result()
}

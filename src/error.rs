use thiserror::Error;

use crate::invoker::JobErrorEntry;

#[derive(Error, Debug)]
pub enum LoadJobError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("could not read schema file")]
    SchemaRead(#[from] std::io::Error),
    #[error("could not parse schema file")]
    SchemaParse(#[from] serde_json::Error),
    #[error("could not obtain Google credentials")]
    Auth(#[from] gcp_auth::Error),
    #[error("BigQuery request error")]
    Submission(#[from] reqwest::Error),
    #[error("BigQuery rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("Object store error")]
    ObjectStore(#[from] object_store::Error),
    #[error("invalid storage URL")]
    InvalidUrl(#[from] url::ParseError),
    #[error("no objects in bucket {bucket} match {file_name}")]
    NoMatchingSource { bucket: String, file_name: String },
    #[error("job {job_id} failed with {} error(s): {errors:?}", .errors.len())]
    JobFailed {
        job_id: String,
        errors: Vec<JobErrorEntry>,
    },
}

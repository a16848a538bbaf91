use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use log::info;
use serde::Serialize;

pub mod bigquery;
pub mod error;
pub mod gcs;
pub mod invoker;
pub mod metadata;
pub mod schema;

use bigquery::BigQueryWarehouse;
use error::LoadJobError;
use gcs::GcsSourceStore;
use invoker::{submit_load_job, LoadRequest};
use metadata::LoadJobMetadata;
use schema::{load_schema_attachment, SchemaAttachment};

pub const DEFAULT_LOCATION: &str = "europe-west2";
pub const SCHEMA_FILE: &str = "schema.json";
pub const ENV_FILE: &str = ".env";

#[derive(Debug, Parser)]
#[command(name = "bql")]
#[command(about = "Load files from Cloud Storage into a BigQuery table", long_about = None)]
pub struct Cli {
    #[clap(
        long = "dataset-id",
        short = 'd',
        aliases = ["datasetId", "datasetid"],
        help("The name of the existing dataset into which to load the data")
    )]
    pub dataset_id: String,
    #[clap(
        long = "table-id",
        short = 't',
        aliases = ["tableId", "tableid"],
        help("The table to load into. It does not have to exist")
    )]
    pub table_id: String,
    #[clap(
        long = "bucket-name",
        short = 'b',
        aliases = ["bucketName", "bucketname"],
        help("The Cloud Storage bucket where the data is stored")
    )]
    pub bucket_name: String,
    #[clap(
        long = "file-name",
        short = 'f',
        aliases = ["fileName", "filename", "fn"],
        help("Object name within the bucket, may contain * wildcards")
    )]
    pub file_name: String,
    #[clap(
        long,
        short,
        action,
        help("Attach the table schema (and partitioning) from the schema file")
    )]
    pub schema: bool,
    #[clap(long, short, value_enum, help("Partitioning descriptor to take from the schema file"))]
    pub partition: Option<PartitionKind>,
    #[clap(
        long = "source-format",
        aliases = ["sourceFormat", "sourceformat", "sf"],
        value_enum,
        default_value = "CSV",
        help("Format of the source files")
    )]
    pub source_format: SourceFormat,
    #[clap(
        long,
        short,
        default_value = DEFAULT_LOCATION,
        help("The location for the job to run in")
    )]
    pub location: String,
    #[clap(
        long = "write-disposition",
        aliases = ["writeDisposition", "writedisposition", "wd"],
        value_enum,
        default_value = "WRITE_APPEND",
        help("What happens if the destination table already exists")
    )]
    pub write_disposition: WriteDisposition,
    #[clap(
        long = "skip-leading-rows",
        aliases = ["skipLeadingRows", "skipleadingrows", "skip"],
        help("Number of header rows in the source data")
    )]
    pub skip_leading_rows: Option<u32>,
    #[clap(
        long = "project-id",
        env = "GOOGLE_CLOUD_PROJECT",
        help("Project that runs the job and owns the dataset. Taken from the credentials if unset")
    )]
    pub project_id: Option<String>,
    #[clap(
        long = "schema-path",
        default_value = SCHEMA_FILE,
        help("Schema file read when --schema is passed")
    )]
    pub schema_path: PathBuf,
    #[clap(
        long = "verify-source",
        action,
        help("Fail before submitting if no object in the bucket matches the file name")
    )]
    pub verify_source: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PartitionKind {
    Time,
    Range,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[value(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceFormat {
    Csv,
    DatastoreBackup,
    NewlineDelimitedJson,
    Avro,
    Parquet,
    Orc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[value(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WriteDisposition {
    WriteAppend,
    WriteTruncate,
    WriteEmpty,
}

/// Load environment variables from `path`. A missing file is not an error,
/// a file that exists but cannot be read or parsed is.
pub fn load_env_file(path: &Path) -> Result<(), dotenvy::Error> {
    match dotenvy::from_path(path) {
        Err(e) if e.not_found() => Ok(()),
        other => other,
    }
}

/// Reads the schema file if requested and assembles the job metadata.
/// Touches nothing but the local filesystem.
pub fn prepare_metadata(args: &Cli) -> Result<LoadJobMetadata, LoadJobError> {
    let attachment = if args.schema {
        load_schema_attachment(&args.schema_path, args.partition)?
    } else {
        SchemaAttachment::None
    };
    Ok(LoadJobMetadata::new(args, attachment))
}

pub async fn do_main(args: Cli) -> Result<(), LoadJobError> {
    // Schema problems surface before any credential discovery happens
    let metadata = prepare_metadata(&args)?;

    let warehouse = BigQueryWarehouse::connect(args.project_id.clone()).await?;
    let storage = GcsSourceStore::from_env();
    info!("Submitting load job as project {}", warehouse.project_id());

    submit_load_job(&warehouse, &storage, &LoadRequest::from(&args), &metadata).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;
    use clap::CommandFactory;

    const REQUIRED: [&str; 9] = ["bql", "-d", "ds", "-t", "tbl", "-b", "bkt", "-f", "data/*.csv"];

    #[test]
    fn test_defaults_when_omitted() {
        let args = Cli::try_parse_from(REQUIRED).unwrap();
        assert_eq!(args.source_format, SourceFormat::Csv);
        assert_eq!(args.write_disposition, WriteDisposition::WriteAppend);
        assert_eq!(args.location, DEFAULT_LOCATION);
        assert_eq!(args.skip_leading_rows, None);
        assert_eq!(args.partition, None);
        assert_eq!(args.schema_path, PathBuf::from(SCHEMA_FILE));
        assert!(!args.schema);
        assert!(!args.verify_source);
    }

    #[test]
    fn test_camel_case_aliases() {
        let args = Cli::try_parse_from([
            "bql",
            "--datasetId",
            "ds",
            "--tableid",
            "tbl",
            "--bucketName",
            "bkt",
            "--fn",
            "f.json",
            "--sf",
            "NEWLINE_DELIMITED_JSON",
            "--writeDisposition",
            "WRITE_TRUNCATE",
            "--skip",
            "1",
            "-p",
            "range",
            "-s",
        ])
        .unwrap();
        assert_eq!(args.dataset_id, "ds");
        assert_eq!(args.table_id, "tbl");
        assert_eq!(args.bucket_name, "bkt");
        assert_eq!(args.file_name, "f.json");
        assert_eq!(args.source_format, SourceFormat::NewlineDelimitedJson);
        assert_eq!(args.write_disposition, WriteDisposition::WriteTruncate);
        assert_eq!(args.skip_leading_rows, Some(1));
        assert_eq!(args.partition, Some(PartitionKind::Range));
        assert!(args.schema);
    }

    #[test]
    fn test_missing_required_option() {
        for skipped in [1, 3, 5, 7] {
            let argv: Vec<&str> = REQUIRED
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != skipped && *i != skipped + 1)
                .map(|(_, a)| *a)
                .collect();
            let err = Cli::try_parse_from(argv).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
        }
    }

    #[test]
    fn test_invalid_enum_values() {
        for extra in [
            ["--source-format", "XML"],
            ["--write-disposition", "WRITE_SOMETIMES"],
            ["--partition", "hash"],
        ] {
            let argv: Vec<&str> = REQUIRED.iter().chain(extra.iter()).copied().collect();
            let err = Cli::try_parse_from(argv).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidValue);
        }
    }

    #[test]
    fn test_help_describes_every_option() {
        let command = Cli::command();
        for arg in command.get_arguments() {
            if matches!(arg.get_id().as_str(), "help" | "version") {
                continue;
            }
            assert!(
                arg.get_help().is_some(),
                "--{} has no help text",
                arg.get_id()
            );
        }
    }

    #[test]
    fn test_missing_env_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_env_file(&dir.path().join(ENV_FILE)).is_ok());
    }

    #[test]
    fn test_malformed_env_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(ENV_FILE);
        std::fs::write(&path, "GOOGLE_CLOUD_PROJECT my project\n").unwrap();
        assert!(load_env_file(&path).is_err());
    }

    #[test]
    fn test_env_file_values_are_exported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(ENV_FILE);
        std::fs::write(&path, "BQL_TEST_ENV_FILE_KEY=loaded\n").unwrap();
        load_env_file(&path).unwrap();
        assert_eq!(std::env::var("BQL_TEST_ENV_FILE_KEY").unwrap(), "loaded");
    }

    #[test]
    fn test_negative_skip_leading_rows() {
        let argv: Vec<&str> = REQUIRED
            .iter()
            .chain(["--skip-leading-rows", "-1"].iter())
            .copied()
            .collect();
        assert!(Cli::try_parse_from(argv).is_err());
    }
}

use std::path::Path;

use log::{info, warn};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::LoadJobError;
use crate::PartitionKind;

/// A JSON object from the schema file, forwarded to the warehouse untouched.
pub type Descriptor = Map<String, Value>;

/// On-disk shape of the schema descriptor.
///
/// Field definitions and partitioning descriptors are kept as raw JSON
/// objects: the warehouse validates them, so field types, nested records and
/// options this crate has never heard of all go through unchanged.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaFile {
    pub schema: SchemaFields,
    #[serde(default)]
    pub time_partitioning: Option<Descriptor>,
    #[serde(default)]
    pub range_partitioning: Option<Descriptor>,
}

#[derive(Debug, Deserialize)]
pub struct SchemaFields {
    pub fields: Vec<Descriptor>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Partitioning {
    Time(Descriptor),
    Range(Descriptor),
}

/// What the job carries about the destination table's layout.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SchemaAttachment {
    /// The table must already exist with a compatible schema.
    #[default]
    None,
    WithFields {
        fields: Vec<Descriptor>,
        partitioning: Option<Partitioning>,
    },
}

impl SchemaAttachment {
    pub fn from_schema_file(file: SchemaFile, kind: Option<PartitionKind>) -> Self {
        let partitioning = match kind {
            None => None,
            Some(PartitionKind::Time) => file.time_partitioning.map(Partitioning::Time),
            Some(PartitionKind::Range) => file.range_partitioning.map(Partitioning::Range),
        };
        if let (Some(kind), None) = (kind, &partitioning) {
            warn!(
                "{:?} partitioning requested but the schema file has no descriptor for it, \
                 the table will not be partitioned",
                kind
            );
        }
        SchemaAttachment::WithFields {
            fields: file.schema.fields,
            partitioning,
        }
    }

    pub fn fields(&self) -> Option<&[Descriptor]> {
        match self {
            SchemaAttachment::None => None,
            SchemaAttachment::WithFields { fields, .. } => Some(fields),
        }
    }

    pub fn time_partitioning(&self) -> Option<&Descriptor> {
        match self {
            SchemaAttachment::WithFields {
                partitioning: Some(Partitioning::Time(tp)),
                ..
            } => Some(tp),
            _ => None,
        }
    }

    pub fn range_partitioning(&self) -> Option<&Descriptor> {
        match self {
            SchemaAttachment::WithFields {
                partitioning: Some(Partitioning::Range(rp)),
                ..
            } => Some(rp),
            _ => None,
        }
    }
}

/// Read and parse the schema descriptor, keeping only the partitioning of `kind`.
pub fn load_schema_attachment(
    path: &Path,
    kind: Option<PartitionKind>,
) -> Result<SchemaAttachment, LoadJobError> {
    let raw = std::fs::read(path)?;
    let file: SchemaFile = serde_json::from_slice(&raw)?;
    info!(
        "Loaded schema with {} field(s) from {}",
        file.schema.fields.len(),
        path.display()
    );
    Ok(SchemaAttachment::from_schema_file(file, kind))
}

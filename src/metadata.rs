use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::schema::{Descriptor, Partitioning, SchemaAttachment};
use crate::{Cli, SourceFormat, WriteDisposition};

/// Settings of a single load job, independent of which warehouse client submits it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadJobMetadata {
    pub source_format: SourceFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_leading_rows: Option<u32>,
    pub write_disposition: WriteDisposition,
    pub location: String,
    #[serde(flatten)]
    pub attachment: SchemaAttachment,
}

impl LoadJobMetadata {
    pub fn new(args: &Cli, attachment: SchemaAttachment) -> Self {
        Self {
            source_format: args.source_format,
            skip_leading_rows: args.skip_leading_rows,
            write_disposition: args.write_disposition,
            location: args.location.clone(),
            attachment,
        }
    }
}

#[derive(Serialize)]
struct TableSchema<'a> {
    fields: &'a [Descriptor],
}

// Flattened into the job metadata as `schema` plus at most one of
// `timePartitioning` / `rangePartitioning`
impl Serialize for SchemaAttachment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        if let SchemaAttachment::WithFields {
            fields,
            partitioning,
        } = self
        {
            map.serialize_entry("schema", &TableSchema { fields })?;
            match partitioning {
                Some(Partitioning::Time(tp)) => map.serialize_entry("timePartitioning", tp)?,
                Some(Partitioning::Range(rp)) => map.serialize_entry("rangePartitioning", rp)?,
                None => {}
            }
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use serde_json::{json, Value};

    use super::*;

    fn args(extra: &[&str]) -> Cli {
        let mut argv = vec!["bql", "-d", "ds", "-t", "tbl", "-b", "bkt", "-f", "a.csv"];
        argv.extend_from_slice(extra);
        Cli::parse_from(argv)
    }

    fn descriptor(value: Value) -> Descriptor {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    fn fields() -> Vec<Descriptor> {
        vec![
            descriptor(json!({"name": "id", "type": "INT64"})),
            descriptor(json!({"name": "shape", "type": "GEOGRAPHY", "mode": "NULLABLE"})),
            descriptor(json!({
                "name": "tags",
                "type": "RECORD",
                "mode": "REPEATED",
                "fields": [{"name": "label", "type": "STRING", "maxLength": 64}]
            })),
        ]
    }

    #[test]
    fn test_defaults_serialize_without_optional_keys() {
        let metadata = LoadJobMetadata::new(&args(&[]), SchemaAttachment::None);
        let json = serde_json::to_value(&metadata).unwrap();

        assert_eq!(
            json,
            json!({
                "sourceFormat": "CSV",
                "writeDisposition": "WRITE_APPEND",
                "location": "europe-west2",
            })
        );
    }

    #[test]
    fn test_explicit_options_carried_over() {
        let metadata = LoadJobMetadata::new(
            &args(&["--sf", "PARQUET", "--wd", "WRITE_EMPTY", "-l", "US", "--skip", "2"]),
            SchemaAttachment::None,
        );
        assert_eq!(metadata.source_format, SourceFormat::Parquet);
        assert_eq!(metadata.write_disposition, WriteDisposition::WriteEmpty);
        assert_eq!(metadata.location, "US");
        assert_eq!(metadata.skip_leading_rows, Some(2));

        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["skipLeadingRows"], 2);
        assert_eq!(json["sourceFormat"], "PARQUET");
    }

    #[test]
    fn test_time_partitioning_serialized_verbatim() {
        let tp = json!({
            "type": "DAY",
            "field": "created",
            "expirationMs": 7776000000u64,
            "requirePartitionFilter": true
        });
        let attachment = SchemaAttachment::WithFields {
            fields: fields(),
            partitioning: Some(Partitioning::Time(descriptor(tp.clone()))),
        };
        let json = serde_json::to_value(LoadJobMetadata::new(&args(&[]), attachment)).unwrap();

        assert_eq!(json["schema"]["fields"][1]["type"], "GEOGRAPHY");
        assert_eq!(json["schema"]["fields"][2]["fields"][0]["maxLength"], 64);
        assert_eq!(json["timePartitioning"], tp);
        assert!(json.get("rangePartitioning").is_none());
    }

    #[test]
    fn test_range_partitioning_serialized_verbatim() {
        let rp = json!({"field": "id", "range": {"start": 0, "end": 100, "interval": "10"}});
        let attachment = SchemaAttachment::WithFields {
            fields: fields(),
            partitioning: Some(Partitioning::Range(descriptor(rp.clone()))),
        };
        let json = serde_json::to_value(LoadJobMetadata::new(&args(&[]), attachment)).unwrap();

        assert_eq!(json["rangePartitioning"], rp);
        assert!(json.get("timePartitioning").is_none());
    }

    #[test]
    fn test_fields_without_partitioning() {
        let attachment = SchemaAttachment::WithFields {
            fields: fields(),
            partitioning: None,
        };
        let json = serde_json::to_value(LoadJobMetadata::new(&args(&[]), attachment)).unwrap();

        assert_eq!(json["schema"]["fields"].as_array().unwrap().len(), 3);
        assert!(json.get("timePartitioning").is_none());
        assert!(json.get("rangePartitioning").is_none());
    }
}

use async_trait::async_trait;
use futures::TryStreamExt;
use log::debug;
use object_store::path::Path;
use object_store::ObjectMeta;
use url::Url;

use crate::error::LoadJobError;
use crate::invoker::SourceStore;

const GCS_SCHEME: &str = "gs";

fn keys_from_env(predicate: fn(&str) -> bool) -> Vec<(String, String)> {
    std::env::vars_os()
        .flat_map(|(k, v)| {
            if let (Some(key), Some(value)) = (k.to_str(), v.to_str()) {
                predicate(key).then(|| (key.to_ascii_lowercase(), value.to_string()))
            } else {
                None
            }
        })
        .collect()
}

/// Cloud Storage access configured from `GOOGLE_*` environment variables.
#[derive(Debug, Clone, Default)]
pub struct GcsSourceStore {
    options: Vec<(String, String)>,
}

impl GcsSourceStore {
    pub fn from_env() -> Self {
        Self {
            options: keys_from_env(|k| k.starts_with("GOOGLE_")),
        }
    }
}

#[async_trait]
impl SourceStore for GcsSourceStore {
    fn source_uri(&self, bucket: &str, file_name: &str) -> String {
        format!("{GCS_SCHEME}://{bucket}/{file_name}")
    }

    async fn matching_objects(
        &self,
        bucket: &str,
        file_name: &str,
    ) -> Result<Vec<String>, LoadJobError> {
        let bucket_url = Url::parse(&format!("{GCS_SCHEME}://{bucket}"))?;
        let (store, _) = object_store::parse_url_opts(&bucket_url, self.options.clone())?;

        let prefix = listing_prefix(file_name);
        let prefix = (!prefix.is_empty()).then(|| Path::from(prefix));
        debug!("Listing {} under {:?}", bucket_url, prefix);

        let objects: Vec<ObjectMeta> = store.list(prefix.as_ref()).try_collect().await?;
        Ok(objects
            .into_iter()
            .map(|meta| meta.location.to_string())
            .filter(|location| wildcard_match(file_name, location))
            .map(|location| self.source_uri(bucket, &location))
            .collect())
    }
}

/// The deepest directory that contains every object `pattern` can match.
fn listing_prefix(pattern: &str) -> &str {
    let literal = match pattern.find('*') {
        Some(idx) => &pattern[..idx],
        None => pattern,
    };
    match literal.rfind('/') {
        Some(idx) => &literal[..idx],
        None => "",
    }
}

/// Match an object name against a pattern where `*` stands for any run of
/// characters, `/` included.
pub fn wildcard_match(pattern: &str, name: &str) -> bool {
    let mut parts = pattern.split('*');
    let first = parts.next().unwrap_or("");
    let Some(mut rest) = name.strip_prefix(first) else {
        return false;
    };
    let parts: Vec<&str> = parts.collect();
    let Some((last, middle)) = parts.split_last() else {
        // No wildcard at all
        return rest.is_empty();
    };
    for part in middle {
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }
    rest.ends_with(last)
}

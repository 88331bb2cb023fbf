//! Dataset metadata resolution.
//!
//! Fetches the well-known per-dataset metadata document and reduces it to
//! the three facts the run needs: the full-snapshot URL, the delta-index
//! URL and the current version token.

use async_trait::async_trait;
use snafu::prelude::*;
use tracing::debug;

use crate::error::{BodySnafu, FetchError, StatusSnafu, TransportSnafu};
use crate::model::DatasetMetadata;

/// Trait for fetching dataset metadata documents.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Fetch the current metadata for `dataset`.
    async fn fetch(&self, dataset: &str) -> Result<DatasetMetadata, FetchError>;
}

/// Where the next import run will read from.
///
/// Both URLs are optional: a dataset may publish only a snapshot, only
/// deltas, or both. Absence of both is the caller's error condition, not
/// this resolver's.
#[derive(Debug, Clone)]
pub struct DatasetSource {
    pub version: String,
    pub snapshot_url: Option<String>,
    pub delta_index_url: Option<String>,
}

/// Resolve a dataset to its current version and source URLs.
pub async fn resolve(
    source: &dyn MetadataSource,
    dataset: &str,
) -> Result<DatasetSource, FetchError> {
    let metadata = source.fetch(dataset).await?;
    debug!(
        "Dataset {} is at version {} ({} resources, deltas: {})",
        dataset,
        metadata.version,
        metadata.resources.len(),
        metadata.delta_url.is_some()
    );

    Ok(DatasetSource {
        snapshot_url: metadata.snapshot_url().map(str::to_string),
        delta_index_url: metadata.delta_url.clone(),
        version: metadata.version,
    })
}

/// HTTP metadata source reading `{base}/{dataset}/index.json`.
#[derive(Debug, Clone)]
pub struct HttpMetadataSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMetadataSource {
    /// Create a metadata source rooted at `base_url`.
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    fn index_url(&self, dataset: &str) -> String {
        format!("{}/{}/index.json", self.base_url, dataset)
    }
}

#[async_trait]
impl MetadataSource for HttpMetadataSource {
    async fn fetch(&self, dataset: &str) -> Result<DatasetMetadata, FetchError> {
        let url = self.index_url(dataset);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context(TransportSnafu { url: &url })?;

        let status = response.status();
        ensure!(status.is_success(), StatusSnafu { url: &url, status });

        response.json().await.context(BodySnafu { url: &url })
    }
}

//! HTTP destination client.
//!
//! Talks to the collection store's REST API: collection lookup/creation,
//! bulk entity upsert, and per-id deletion. Entity ids are signed with the
//! collection's namespace before deletion, matching the id scheme the
//! destination applies on ingest.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use snafu::prelude::*;
use tracing::debug;

use crate::error::{
    BodySnafu, CreateError, CreateRejectedSnafu, CreateTransportSnafu, DeleteError,
    DeleteRejectedSnafu, DeleteTransportSnafu, FetchError, StatusSnafu, TransportSnafu,
    UpsertError, UpsertRejectedSnafu, UpsertTransportSnafu,
};
use crate::model::FlatEntity;
use crate::sink::{Collection, DestinationClient};

/// Hex digits of the namespace digest appended to signed ids.
const SIGNATURE_LEN: usize = 40;

/// Sign an entity id into the destination's namespaced form.
///
/// The destination keys stored entities as `{id}.{digest}` where the digest
/// is derived from the collection id, so deletions must address entities
/// through the same scheme.
pub fn sign_entity_id(namespace: &str, entity_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_bytes());
    hasher.update(b".");
    hasher.update(entity_id.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("{entity_id}.{}", &digest[..SIGNATURE_LEN])
}

/// Client for the destination's REST API.
pub struct HttpDestination {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct CollectionPage {
    #[serde(default)]
    results: Vec<Collection>,
}

impl HttpDestination {
    /// Create a client for the destination at `base_url`.
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/2/{}", self.base_url, path)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.header("Authorization", format!("ApiKey {}", self.api_key))
    }
}

#[async_trait]
impl DestinationClient for HttpDestination {
    async fn find_collection(&self, foreign_id: &str) -> Result<Option<Collection>, FetchError> {
        let url = self.api_url("collections");
        let response = self
            .authorized(self.client.get(&url))
            .query(&[("filter:foreign_id", foreign_id)])
            .send()
            .await
            .context(TransportSnafu { url: &url })?;

        let status = response.status();
        ensure!(status.is_success(), StatusSnafu { url: &url, status });

        let page: CollectionPage = response.json().await.context(BodySnafu { url: &url })?;
        Ok(page.results.into_iter().next())
    }

    async fn create_collection(&self, foreign_id: &str) -> Result<Collection, CreateError> {
        debug!("Creating collection {}", foreign_id);
        let url = self.api_url("collections");
        let body = json!({
            "foreign_id": foreign_id,
            "label": foreign_id,
            "category": "other",
        });

        let response = self
            .authorized(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .context(CreateTransportSnafu { foreign_id })?;

        let status = response.status();
        ensure!(
            status.is_success(),
            CreateRejectedSnafu { foreign_id, status }
        );

        response
            .json()
            .await
            .context(CreateTransportSnafu { foreign_id })
    }

    async fn bulk_upsert(
        &self,
        collection: &Collection,
        entities: &[FlatEntity],
    ) -> Result<(), UpsertError> {
        let count = entities.len();
        let url = self.api_url(&format!("collections/{}/_bulk", collection.id));

        let response = self
            .authorized(self.client.post(&url))
            .json(entities)
            .send()
            .await
            .context(UpsertTransportSnafu { count })?;

        let status = response.status();
        ensure!(status.is_success(), UpsertRejectedSnafu { count, status });
        Ok(())
    }

    async fn delete_entity(
        &self,
        collection: &Collection,
        entity_id: &str,
    ) -> Result<(), DeleteError> {
        let signed = sign_entity_id(&collection.id, entity_id);
        let url = self.api_url(&format!("entities/{signed}"));

        let response = self
            .authorized(self.client.delete(&url))
            .send()
            .await
            .context(DeleteTransportSnafu { entity_id })?;

        let status = response.status();
        // A missing entity is a successful deletion for our purposes
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        ensure!(
            status.is_success(),
            DeleteRejectedSnafu { entity_id, status }
        );
        Ok(())
    }
}

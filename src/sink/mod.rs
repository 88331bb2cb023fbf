//! Destination collection store.
//!
//! Defines the `DestinationClient` trait that abstracts the collection
//! store's write API, enabling dependency inversion and testing against
//! in-memory fakes.

pub mod http;

pub use http::HttpDestination;

use async_trait::async_trait;

use crate::error::{CreateError, DeleteError, FetchError, UpsertError};
use crate::model::FlatEntity;

/// Handle to a destination collection.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Collection {
    pub id: String,
    pub foreign_id: String,
    /// Collections can be frozen at the destination; writes to a frozen
    /// collection must never be attempted.
    #[serde(default)]
    pub writeable: bool,
}

/// Trait for clients of the destination's collection write API.
///
/// Upserts are keyed by entity id and idempotent; deletions are per-id and
/// independent of each other.
#[async_trait]
pub trait DestinationClient: Send + Sync {
    /// Look up a collection by its foreign identifier.
    async fn find_collection(&self, foreign_id: &str) -> Result<Option<Collection>, FetchError>;

    /// Create a collection for the given foreign identifier.
    async fn create_collection(&self, foreign_id: &str) -> Result<Collection, CreateError>;

    /// Upsert a batch of entities in one request.
    ///
    /// Assumed atomic enough that partial application is not distinguished;
    /// callers retry the whole run on failure.
    async fn bulk_upsert(
        &self,
        collection: &Collection,
        entities: &[FlatEntity],
    ) -> Result<(), UpsertError>;

    /// Delete a single entity by its upstream id.
    async fn delete_entity(
        &self,
        collection: &Collection,
        entity_id: &str,
    ) -> Result<(), DeleteError>;
}

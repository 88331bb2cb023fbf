//! Batch importer.
//!
//! Consumes entity records and delta operations and applies them to the
//! destination in size-bounded batches. Two independent accumulators are
//! kept: pending removals (ordered ids) and pending upserts (ordered flat
//! entities). Within one flush step, removals go out before upserts; ops
//! that land in different steps flush in arrival order of their steps.
//!
//! Failure policy is asymmetric: a rejected per-id deletion is a warning
//! and the run continues; a rejected bulk upsert aborts the run.
//! The next invocation retries from the same version boundary, which is
//! safe because upserts are idempotent by id.

use futures::stream::{self, StreamExt};
use snafu::prelude::*;
use tracing::{debug, warn};

use crate::error::{SyncError, UpsertSnafu};
use crate::model::{DeltaOperation, FlatEntity};
use crate::sink::{Collection, DestinationClient};

/// Upsert flush threshold for full imports. Larger than the delta
/// threshold: a full import has no removals to interleave with.
pub const FULL_UPSERT_BATCH: usize = 1000;

/// Per-kind flush threshold for delta imports.
pub const DELTA_BATCH: usize = 100;

/// Fan-out width for one removal flush. Deletions within a batch are
/// independent and fail soft, so a small fixed concurrency is safe.
pub const DELETE_CONCURRENCY: usize = 5;

/// What happened during one import run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportStats {
    pub entities_upserted: usize,
    pub entities_deleted: usize,
    /// Per-id deletions that failed and were skipped with a warning.
    pub delete_failures: usize,
    /// Removals dropped because `--skip-removals` was set.
    pub removals_skipped: usize,
    pub upsert_flushes: usize,
}

/// Size-bounded batch writer against one destination collection.
///
/// Owned exclusively by one run; the accumulators are never shared.
pub struct BatchImporter<'a> {
    client: &'a dyn DestinationClient,
    collection: &'a Collection,
    upsert_threshold: usize,
    removal_threshold: usize,
    skip_removals: bool,
    pending_upserts: Vec<FlatEntity>,
    pending_removals: Vec<String>,
    stats: ImportStats,
}

impl<'a> BatchImporter<'a> {
    /// Importer for a full snapshot: one large upsert accumulator, no
    /// removals expected.
    pub fn for_full(
        client: &'a dyn DestinationClient,
        collection: &'a Collection,
        upsert_threshold: usize,
    ) -> Self {
        Self::new(client, collection, upsert_threshold, upsert_threshold, false)
    }

    /// Importer for a delta chain: smaller per-kind thresholds so removals
    /// and upserts interleave promptly.
    pub fn for_delta(
        client: &'a dyn DestinationClient,
        collection: &'a Collection,
        threshold: usize,
        skip_removals: bool,
    ) -> Self {
        Self::new(client, collection, threshold, threshold, skip_removals)
    }

    fn new(
        client: &'a dyn DestinationClient,
        collection: &'a Collection,
        upsert_threshold: usize,
        removal_threshold: usize,
        skip_removals: bool,
    ) -> Self {
        Self {
            client,
            collection,
            upsert_threshold,
            removal_threshold,
            skip_removals,
            pending_upserts: Vec::new(),
            pending_removals: Vec::new(),
            stats: ImportStats::default(),
        }
    }

    /// Apply one delta operation.
    pub async fn apply(&mut self, op: DeltaOperation) -> Result<(), SyncError> {
        match op {
            DeltaOperation::Add { entity } | DeltaOperation::Mod { entity } => {
                self.upsert(entity.flatten()).await
            }
            DeltaOperation::Del { entity } => self.remove(entity.id).await,
        }
    }

    /// Queue an entity for upsert, flushing when a threshold crosses.
    pub async fn upsert(&mut self, entity: FlatEntity) -> Result<(), SyncError> {
        self.pending_upserts.push(entity);
        self.maybe_flush().await
    }

    /// Queue an entity id for removal, flushing when a threshold crosses.
    pub async fn remove(&mut self, entity_id: String) -> Result<(), SyncError> {
        if self.skip_removals {
            self.stats.removals_skipped += 1;
            return Ok(());
        }
        self.pending_removals.push(entity_id);
        self.maybe_flush().await
    }

    /// Flush any accumulator past its threshold, removals first within
    /// the step.
    async fn maybe_flush(&mut self) -> Result<(), SyncError> {
        if self.pending_removals.len() >= self.removal_threshold {
            self.flush_removals().await;
        }
        if self.pending_upserts.len() >= self.upsert_threshold {
            self.flush_upserts().await?;
        }
        Ok(())
    }

    /// Flush both accumulators and return the run's statistics.
    pub async fn finish(mut self) -> Result<ImportStats, SyncError> {
        self.flush_removals().await;
        self.flush_upserts().await?;
        Ok(self.stats)
    }

    /// Fail-soft removal flush: each id is submitted independently with
    /// bounded fan-out; a failed deletion is logged and skipped.
    async fn flush_removals(&mut self) {
        if self.pending_removals.is_empty() {
            return;
        }
        let ids = std::mem::take(&mut self.pending_removals);
        debug!("Deleting {} entities", ids.len());

        let client = self.client;
        let collection = self.collection;
        let results: Vec<(String, Result<(), crate::error::DeleteError>)> = stream::iter(ids)
            .map(|id| async move {
                let result = client.delete_entity(collection, &id).await;
                (id, result)
            })
            .buffer_unordered(DELETE_CONCURRENCY)
            .collect()
            .await;

        for (id, result) in results {
            match result {
                Ok(()) => self.stats.entities_deleted += 1,
                Err(e) => {
                    warn!("Failed to delete entity {}: {}", id, e);
                    self.stats.delete_failures += 1;
                }
            }
        }
    }

    /// Fail-hard upsert flush: one bulk request; any failure aborts the run.
    async fn flush_upserts(&mut self) -> Result<(), SyncError> {
        if self.pending_upserts.is_empty() {
            return Ok(());
        }
        let entities = std::mem::take(&mut self.pending_upserts);
        debug!("Upserting {} entities", entities.len());

        self.client
            .bulk_upsert(self.collection, &entities)
            .await
            .context(UpsertSnafu)?;

        self.stats.entities_upserted += entities.len();
        self.stats.upsert_flushes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use crate::error::{CreateError, DeleteError, DeleteRejectedSnafu, FetchError, UpsertError};
    use crate::model::{Entity, EntityRef};

    /// Records every write issued against it; optionally rejects chosen ids.
    #[derive(Default)]
    struct RecordingClient {
        upsert_batches: Mutex<Vec<Vec<String>>>,
        deleted: Mutex<Vec<String>>,
        failing_deletes: Vec<String>,
    }

    #[async_trait]
    impl DestinationClient for RecordingClient {
        async fn find_collection(&self, _: &str) -> Result<Option<Collection>, FetchError> {
            Ok(None)
        }

        async fn create_collection(&self, _: &str) -> Result<Collection, CreateError> {
            unreachable!("importer never creates collections")
        }

        async fn bulk_upsert(
            &self,
            _: &Collection,
            entities: &[FlatEntity],
        ) -> Result<(), UpsertError> {
            self.upsert_batches
                .lock()
                .unwrap()
                .push(entities.iter().map(|e| e.id.clone()).collect());
            Ok(())
        }

        async fn delete_entity(&self, _: &Collection, entity_id: &str) -> Result<(), DeleteError> {
            if self.failing_deletes.iter().any(|id| id == entity_id) {
                return DeleteRejectedSnafu {
                    entity_id,
                    status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                }
                .fail();
            }
            self.deleted.lock().unwrap().push(entity_id.to_string());
            Ok(())
        }
    }

    fn collection() -> Collection {
        Collection {
            id: "7".to_string(),
            foreign_id: "acme".to_string(),
            writeable: true,
        }
    }

    fn entity(id: &str) -> Entity {
        Entity {
            id: id.to_string(),
            schema: "Person".to_string(),
            properties: HashMap::new(),
            extra: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn test_threshold_plus_one_makes_two_flushes() {
        let client = RecordingClient::default();
        let coll = collection();
        let threshold = 4;
        let mut importer = BatchImporter::for_full(&client, &coll, threshold);

        for i in 0..threshold + 1 {
            importer.upsert(entity(&format!("e{i}")).flatten()).await.unwrap();
        }
        let stats = importer.finish().await.unwrap();

        let batches = client.upsert_batches.lock().unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), threshold);
        assert_eq!(batches[1].len(), 1);
        // Source order preserved across the boundary
        assert_eq!(batches[0][0], "e0");
        assert_eq!(batches[1][0], "e4");
        assert_eq!(stats.upsert_flushes, 2);
        assert_eq!(stats.entities_upserted, 5);
    }

    #[tokio::test]
    async fn test_delta_ops_route_to_accumulators() {
        let client = RecordingClient::default();
        let coll = collection();
        let mut importer = BatchImporter::for_delta(&client, &coll, 100, false);

        importer
            .apply(DeltaOperation::Add { entity: entity("a") })
            .await
            .unwrap();
        importer
            .apply(DeltaOperation::Mod { entity: entity("b") })
            .await
            .unwrap();
        importer
            .apply(DeltaOperation::Del {
                entity: EntityRef { id: "c".to_string() },
            })
            .await
            .unwrap();
        let stats = importer.finish().await.unwrap();

        assert_eq!(stats.entities_upserted, 2);
        assert_eq!(stats.entities_deleted, 1);
        assert_eq!(client.deleted.lock().unwrap().as_slice(), ["c"]);
    }

    #[tokio::test]
    async fn test_removal_failure_is_soft() {
        let client = RecordingClient {
            failing_deletes: vec!["d2".to_string()],
            ..RecordingClient::default()
        };
        let coll = collection();
        let mut importer = BatchImporter::for_delta(&client, &coll, 100, false);

        for id in ["d0", "d1", "d2", "d3", "d4"] {
            importer.remove(id.to_string()).await.unwrap();
        }
        let stats = importer.finish().await.unwrap();

        assert_eq!(stats.entities_deleted, 4);
        assert_eq!(stats.delete_failures, 1);
        assert!(!client.deleted.lock().unwrap().contains(&"d2".to_string()));
    }

    #[tokio::test]
    async fn test_skip_removals_drops_deletions() {
        let client = RecordingClient::default();
        let coll = collection();
        let mut importer = BatchImporter::for_delta(&client, &coll, 100, true);

        importer.remove("gone".to_string()).await.unwrap();
        let stats = importer.finish().await.unwrap();

        assert_eq!(stats.removals_skipped, 1);
        assert_eq!(stats.entities_deleted, 0);
        assert!(client.deleted.lock().unwrap().is_empty());
    }
}

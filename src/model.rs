//! Data model for datasets, entities and delta operations.
//!
//! Mirrors the upstream publication format: a per-dataset metadata document,
//! newline-delimited entity snapshots, and newline-delimited operation logs
//! indexed by an ordered delta index.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Name of the resource that carries the full entity snapshot.
pub const SNAPSHOT_RESOURCE: &str = "entities.ftm.json";

/// A full entity record as published upstream.
///
/// Only `id`, `schema` and `properties` matter to the importer; provenance,
/// collection membership and timestamps are captured as pass-through fields
/// and never interpreted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub schema: String,
    /// Property name to list of loosely typed values (strings or nested
    /// entity references).
    #[serde(default)]
    pub properties: HashMap<String, Vec<Value>>,
    /// Everything else in the record (datasets, referents, timestamps).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Entity {
    /// Project this entity down to the shape the destination write API
    /// accepts. Pure; recomputed whenever the entity changes.
    pub fn flatten(&self) -> FlatEntity {
        FlatEntity {
            id: self.id.clone(),
            schema: self.schema.clone(),
            properties: self.properties.clone(),
        }
    }
}

/// The subset of an entity actually sent to the destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatEntity {
    pub id: String,
    pub schema: String,
    pub properties: HashMap<String, Vec<Value>>,
}

/// Reference to an entity by id, as carried by removal operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: String,
}

/// A single operation from a delta file.
///
/// `Mod` is kept distinct from `Add` even though the payloads match, since
/// destination-side semantics may diverge (upsert vs. strict-create).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op")]
pub enum DeltaOperation {
    #[serde(rename = "ADD")]
    Add { entity: Entity },
    #[serde(rename = "MOD")]
    Mod { entity: Entity },
    #[serde(rename = "DEL")]
    Del { entity: EntityRef },
}

impl DeltaOperation {
    /// The id of the entity this operation touches.
    pub fn entity_id(&self) -> &str {
        match self {
            DeltaOperation::Add { entity } | DeltaOperation::Mod { entity } => &entity.id,
            DeltaOperation::Del { entity } => &entity.id,
        }
    }
}

/// A downloadable resource listed in the dataset metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct Resource {
    pub name: String,
    pub url: String,
}

/// Per-dataset metadata document.
///
/// Version strings are opaque tokens: compared for equality and chain
/// membership only, never ordered lexically.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetMetadata {
    pub version: String,
    #[serde(default)]
    pub resources: Vec<Resource>,
    /// URL of the delta index, when the dataset publishes deltas.
    #[serde(default)]
    pub delta_url: Option<String>,
}

impl DatasetMetadata {
    /// URL of the full snapshot resource, if the dataset publishes one.
    pub fn snapshot_url(&self) -> Option<&str> {
        self.resources
            .iter()
            .find(|r| r.name == SNAPSHOT_RESOURCE)
            .map(|r| r.url.as_str())
    }
}

/// An entry of the auxiliary ordered version list in a delta index.
#[derive(Debug, Clone, Deserialize)]
pub struct DeltaEntry {
    pub version: String,
    pub url: String,
}

/// The published delta index for a dataset.
///
/// `versions` is stored newest-first. Some mirrors serialize it through
/// order-losing maps, so an auxiliary `entries` list carries the same chain
/// and is consulted when `versions` is empty.
#[derive(Debug, Clone, Deserialize)]
pub struct DeltaIndex {
    /// URL of the newest delta file; embeds the head version as a path
    /// segment.
    #[serde(default)]
    pub current: Option<String>,
    #[serde(default)]
    pub versions: IndexMap<String, String>,
    #[serde(default)]
    pub entries: Vec<DeltaEntry>,
}

impl DeltaIndex {
    /// The known version chain, newest-first, as `(version, url)` pairs.
    pub fn ordered_versions(&self) -> Vec<(&str, &str)> {
        if !self.versions.is_empty() {
            self.versions
                .iter()
                .map(|(v, u)| (v.as_str(), u.as_str()))
                .collect()
        } else {
            self.entries
                .iter()
                .map(|e| (e.version.as_str(), e.url.as_str()))
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_flatten() {
        let entity: Entity = serde_json::from_str(
            r#"{
                "id": "ent-1",
                "schema": "Person",
                "properties": {"name": ["Jane Doe"]},
                "datasets": ["acme"],
                "first_seen": "2024-01-01"
            }"#,
        )
        .unwrap();

        let flat = entity.flatten();
        assert_eq!(flat.id, "ent-1");
        assert_eq!(flat.schema, "Person");
        assert_eq!(flat.properties["name"][0], "Jane Doe");

        // Pass-through fields survive on the entity but not the projection
        assert!(entity.extra.contains_key("datasets"));
        let json = serde_json::to_value(&flat).unwrap();
        assert!(json.get("datasets").is_none());
    }

    #[test]
    fn test_delta_operation_tags() {
        let add: DeltaOperation =
            serde_json::from_str(r#"{"op": "ADD", "entity": {"id": "a", "schema": "Person"}}"#)
                .unwrap();
        let modify: DeltaOperation =
            serde_json::from_str(r#"{"op": "MOD", "entity": {"id": "b", "schema": "Company"}}"#)
                .unwrap();
        let del: DeltaOperation =
            serde_json::from_str(r#"{"op": "DEL", "entity": {"id": "c"}}"#).unwrap();

        assert!(matches!(add, DeltaOperation::Add { .. }));
        assert!(matches!(modify, DeltaOperation::Mod { .. }));
        assert_eq!(del.entity_id(), "c");
    }

    #[test]
    fn test_snapshot_url_sentinel() {
        let meta: DatasetMetadata = serde_json::from_str(
            r#"{
                "version": "20240301",
                "resources": [
                    {"name": "statistics.json", "url": "https://data.example.org/stats.json"},
                    {"name": "entities.ftm.json", "url": "https://data.example.org/entities.ftm.json"}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(
            meta.snapshot_url(),
            Some("https://data.example.org/entities.ftm.json")
        );
        assert!(meta.delta_url.is_none());
    }

    #[test]
    fn test_delta_index_falls_back_to_entries() {
        let index: DeltaIndex = serde_json::from_str(
            r#"{
                "entries": [
                    {"version": "v2", "url": "https://x/v2.json"},
                    {"version": "v1", "url": "https://x/v1.json"}
                ]
            }"#,
        )
        .unwrap();

        let ordered = index.ordered_versions();
        assert_eq!(ordered[0].0, "v2");
        assert_eq!(ordered[1].0, "v1");
    }
}

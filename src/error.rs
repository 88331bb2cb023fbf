//! Error types for snowdrift using snafu.
//!
//! This module defines structured error types with context selectors for
//! all error conditions in the codebase.

use snafu::prelude::*;

// ============ Fetch Errors ============

/// Errors that can occur while reaching a remote resource.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum FetchError {
    /// Transport-level failure (DNS, TLS, connection reset, ...).
    #[snafu(display("Request to {url} failed"))]
    Transport { url: String, source: reqwest::Error },

    /// The server answered with a non-success status.
    #[snafu(display("{url} returned status {status}"))]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    /// The response body could not be read.
    #[snafu(display("Failed to read response body from {url}"))]
    Body { url: String, source: reqwest::Error },
}

// ============ Parse Errors ============

/// Errors that can occur while decoding streamed JSON.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ParseError {
    /// A line of a newline-delimited JSON source is not valid JSON.
    #[snafu(display("Malformed JSON on line {line} of {url}"))]
    Line {
        url: String,
        line: u64,
        source: serde_json::Error,
    },

    /// A whole JSON document (delta index) failed to decode.
    #[snafu(display("Malformed JSON document at {url}"))]
    Document {
        url: String,
        source: serde_json::Error,
    },
}

// ============ Stream Errors ============

/// Terminal failures of a line stream.
///
/// A stream either fails to transfer or fails to decode; either way the
/// iteration ends. Malformed lines abort the stream rather than being
/// skipped, since silent data loss is worse than a hard stop.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StreamError {
    /// The underlying transfer failed.
    #[snafu(display("Transfer failed"))]
    StreamFetch { source: FetchError },

    /// A streamed line could not be decoded.
    #[snafu(display("Decode failed"))]
    StreamParse { source: ParseError },
}

// ============ Destination Errors ============

/// Errors creating a destination collection.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CreateError {
    /// Transport failure while creating the collection.
    #[snafu(display("Failed to reach destination while creating collection {foreign_id}"))]
    CreateTransport {
        foreign_id: String,
        source: reqwest::Error,
    },

    /// The destination rejected the create request.
    #[snafu(display("Destination rejected collection {foreign_id} with status {status}"))]
    CreateRejected {
        foreign_id: String,
        status: reqwest::StatusCode,
    },
}

/// Errors during a bulk entity upsert.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum UpsertError {
    /// Transport failure while sending the batch.
    #[snafu(display("Failed to reach destination while upserting {count} entities"))]
    UpsertTransport {
        count: usize,
        source: reqwest::Error,
    },

    /// The destination rejected the batch.
    #[snafu(display("Destination rejected upsert of {count} entities with status {status}"))]
    UpsertRejected {
        count: usize,
        status: reqwest::StatusCode,
    },
}

/// Errors deleting a single entity.
///
/// Per-id deletions fail soft: the importer logs a warning and continues.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DeleteError {
    /// Transport failure while deleting the entity.
    #[snafu(display("Failed to reach destination while deleting entity {entity_id}"))]
    DeleteTransport {
        entity_id: String,
        source: reqwest::Error,
    },

    /// The destination rejected the deletion.
    #[snafu(display("Destination rejected deletion of {entity_id} with status {status}"))]
    DeleteRejected {
        entity_id: String,
        status: reqwest::StatusCode,
    },
}

// ============ Config Errors ============

/// Errors that can occur during configuration validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Dataset identifier is empty.
    #[snafu(display("Dataset identifier cannot be empty"))]
    EmptyDataset,

    /// Destination host is empty.
    #[snafu(display("Destination host cannot be empty"))]
    EmptyHost,

    /// Dataset base URL is empty.
    #[snafu(display("Dataset base URL cannot be empty"))]
    EmptyDataUrl,

    /// No API key supplied via flag or environment.
    #[snafu(display("No API key supplied (use --api-key or SNOWDRIFT_API_KEY)"))]
    MissingApiKey,

    /// A batch size of zero would never flush.
    #[snafu(display("Batch sizes must be greater than zero"))]
    ZeroBatchSize,
}

// ============ Version Store Errors ============

/// Errors reading or writing the persisted last-applied versions.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum VersionStoreError {
    /// IO failure on the backing file.
    #[snafu(display("Failed to access version cache at {path}"))]
    CacheIo {
        path: String,
        source: std::io::Error,
    },

    /// The backing file holds malformed JSON.
    #[snafu(display("Version cache at {path} is corrupt"))]
    CacheCorrupt {
        path: String,
        source: serde_json::Error,
    },
}

// ============ Sync Error (top-level) ============

/// Top-level sync errors that aggregate all error types.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SyncError {
    /// Dataset metadata could not be fetched.
    #[snafu(display("Failed to fetch metadata for dataset {dataset}"))]
    MetadataFetch { dataset: String, source: FetchError },

    /// The delta index could not be fetched or decoded.
    #[snafu(display("Failed to resolve delta index"))]
    DeltaIndex { source: StreamError },

    /// An entity or operation stream failed.
    #[snafu(display("Entity stream failed"))]
    Stream { source: StreamError },

    /// Collection lookup failed.
    #[snafu(display("Failed to look up collection {foreign_id}"))]
    Lookup {
        foreign_id: String,
        source: FetchError,
    },

    /// The destination collection exists but is read-only.
    #[snafu(display("Collection {foreign_id} is not writeable"))]
    NotWritable { foreign_id: String },

    /// The destination collection could not be created.
    #[snafu(display("Failed to create collection"))]
    Create { source: CreateError },

    /// A bulk upsert was rejected. The run aborts; the next invocation
    /// retries from the same version boundary.
    #[snafu(display("Bulk upsert failed"))]
    Upsert { source: UpsertError },

    /// Neither a full snapshot nor a usable delta chain is available.
    #[snafu(display("Dataset {dataset} offers no full snapshot and no usable delta chain"))]
    NoSource { dataset: String },

    /// Configuration error.
    #[snafu(display("Configuration error"))]
    Config { source: ConfigError },

    /// Version store failure.
    #[snafu(display("Version store failure"))]
    Versions { source: VersionStoreError },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_display() {
        let err = StatusSnafu {
            url: "https://example.org/index.json".to_string(),
            status: reqwest::StatusCode::NOT_FOUND,
        }
        .build();
        assert!(err.to_string().contains("404"));
        assert!(err.to_string().contains("index.json"));
    }

    #[test]
    fn test_not_writable_display() {
        let err: SyncError = NotWritableSnafu {
            foreign_id: "acme-sanctions".to_string(),
        }
        .build();
        assert!(err.to_string().contains("not writeable"));
    }
}

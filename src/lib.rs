//! snowdrift: incremental synchronizer for versioned NDJSON entity datasets.
//!
//! This library resolves whether a dataset needs a full snapshot import or
//! an incremental delta chain, streams newline-delimited JSON records from
//! remote sources, and applies them to a destination collection store in
//! size-bounded batches while tracking the last-applied version per
//! dataset.
//!
//! # Example
//!
//! ```ignore
//! use snowdrift::{Config, run_sync, error::SyncError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), SyncError> {
//!     let config = Config { dataset: "acme-sanctions".into(), ..Config::default() };
//!     let stats = run_sync(&config).await?;
//!     println!("Upserted {} entities", stats.import.entities_upserted);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod import;
pub mod model;
pub mod sink;
pub mod source;
pub mod sync;
pub mod version;

// Re-export main types
pub use config::Config;
pub use sync::{Outcome, SyncStats, Syncer, run_sync};

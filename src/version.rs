//! Last-applied version persistence.
//!
//! One opaque version string per dataset, persisted across runs. The store
//! is injected into the runner rather than reached through a global, so
//! the core stays testable without real persistence. It is only written
//! after a fully successful run; a crashed or aborted run retries from the
//! same starting version.

use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{CacheCorruptSnafu, CacheIoSnafu, VersionStoreError};

/// Trait for persisting the last-applied version per dataset.
pub trait VersionStore: Send {
    /// The last version applied for `dataset`, if any. Absence means
    /// "never imported, must full-import".
    fn get(&self, dataset: &str) -> Result<Option<String>, VersionStoreError>;

    /// Record `version` as applied for `dataset`.
    fn set(&mut self, dataset: &str, version: &str) -> Result<(), VersionStoreError>;
}

/// On-disk serialized shape of the version cache.
#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    #[serde(default)]
    versions: HashMap<String, String>,
}

/// File-backed store keeping all dataset versions in one JSON document.
#[derive(Debug)]
pub struct FileVersionStore {
    path: PathBuf,
    cache: CacheFile,
}

impl FileVersionStore {
    /// Open the cache at `path`, creating an empty one if the file does
    /// not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, VersionStoreError> {
        let path = path.as_ref().to_path_buf();
        let display = path.display().to_string();

        let cache = match std::fs::read(&path) {
            Ok(bytes) => {
                serde_json::from_slice(&bytes).context(CacheCorruptSnafu { path: &display })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => CacheFile::default(),
            Err(e) => return Err(e).context(CacheIoSnafu { path: &display }),
        };

        Ok(Self { path, cache })
    }

    fn persist(&self) -> Result<(), VersionStoreError> {
        let display = self.path.display().to_string();
        let bytes = serde_json::to_vec_pretty(&self.cache)
            .context(CacheCorruptSnafu { path: &display })?;

        // Write-then-rename so a crash mid-write never corrupts the cache
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, bytes).context(CacheIoSnafu { path: &display })?;
        std::fs::rename(&tmp, &self.path).context(CacheIoSnafu { path: &display })
    }
}

impl VersionStore for FileVersionStore {
    fn get(&self, dataset: &str) -> Result<Option<String>, VersionStoreError> {
        Ok(self.cache.versions.get(dataset).cloned())
    }

    fn set(&mut self, dataset: &str, version: &str) -> Result<(), VersionStoreError> {
        debug!("Recording version {} for {}", version, dataset);
        self.cache
            .versions
            .insert(dataset.to_string(), version.to_string());
        self.persist()
    }
}

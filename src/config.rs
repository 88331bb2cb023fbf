//! Run configuration.
//!
//! Assembled from command-line arguments; validated before the run starts.
//! The core never reads flags or environment variables itself.

use snafu::prelude::*;
use std::path::PathBuf;

use crate::error::{
    ConfigError, EmptyDataUrlSnafu, EmptyDatasetSnafu, EmptyHostSnafu, MissingApiKeySnafu,
    ZeroBatchSizeSnafu,
};
use crate::import::{DELTA_BATCH, FULL_UPSERT_BATCH};

/// Configuration for one sync run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Upstream dataset identifier.
    pub dataset: String,
    /// Destination foreign id; defaults to the dataset identifier.
    pub foreign_id: Option<String>,
    /// Base URL of the dataset publication (metadata lives at
    /// `{data_url}/{dataset}/index.json`).
    pub data_url: String,
    /// Base URL of the destination collection store.
    pub host: String,
    /// Destination API key.
    pub api_key: String,
    /// Force a full import even when a delta chain would apply.
    pub full: bool,
    /// Apply additions and modifications but drop removals.
    pub skip_removals: bool,
    /// Upsert flush threshold for full imports.
    pub full_batch_size: usize,
    /// Per-kind flush threshold for delta imports.
    pub delta_batch_size: usize,
    /// Path of the local version cache file.
    pub version_cache: PathBuf,
}

impl Config {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(!self.dataset.is_empty(), EmptyDatasetSnafu);
        ensure!(!self.host.is_empty(), EmptyHostSnafu);
        ensure!(!self.data_url.is_empty(), EmptyDataUrlSnafu);
        ensure!(!self.api_key.is_empty(), MissingApiKeySnafu);
        ensure!(
            self.full_batch_size > 0 && self.delta_batch_size > 0,
            ZeroBatchSizeSnafu
        );
        Ok(())
    }

    /// The destination foreign id for this dataset.
    pub fn foreign_id(&self) -> &str {
        self.foreign_id.as_deref().unwrap_or(&self.dataset)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dataset: String::new(),
            foreign_id: None,
            data_url: String::new(),
            host: String::new(),
            api_key: String::new(),
            full: false,
            skip_removals: false,
            full_batch_size: FULL_UPSERT_BATCH,
            delta_batch_size: DELTA_BATCH,
            version_cache: PathBuf::from("snowdrift-versions.json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        Config {
            dataset: "acme".to_string(),
            data_url: "https://data.example.org/datasets".to_string(),
            host: "https://dest.example.org".to_string(),
            api_key: "secret".to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_empty_dataset_rejected() {
        let config = Config {
            dataset: String::new(),
            ..valid()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptyDataset)
        ));
    }

    #[test]
    fn test_missing_api_key_rejected() {
        let config = Config {
            api_key: String::new(),
            ..valid()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingApiKey)
        ));
    }

    #[test]
    fn test_foreign_id_defaults_to_dataset() {
        let mut config = valid();
        assert_eq!(config.foreign_id(), "acme");
        config.foreign_id = Some("custom-acme".to_string());
        assert_eq!(config.foreign_id(), "custom-acme");
    }
}

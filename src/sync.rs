//! Sync run orchestration.
//!
//! Reconciles the dataset's current version against the last version this
//! destination applied, picks the cheapest usable source (no-op, delta
//! chain, or full snapshot), streams it through the batch importer, and
//! records the new version once everything succeeded.

use indexmap::IndexMap;
use snafu::prelude::*;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{
    CreateSnafu, DeltaIndexSnafu, LookupSnafu, MetadataFetchSnafu, NoSourceSnafu,
    NotWritableSnafu, StreamFetchSnafu, StreamSnafu, SyncError, VersionsSnafu,
};
use crate::import::{BatchImporter, ImportStats};
use crate::model::{DeltaOperation, Entity};
use crate::sink::{Collection, DestinationClient, HttpDestination};
use crate::source::{
    ByteStreamSource, ChainResult, HttpMetadataSource, HttpSource, LineStream, MetadataSource,
    metadata::{self, DatasetSource},
    resolve_chain,
};
use crate::version::{FileVersionStore, VersionStore};

/// How a run advanced the destination.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Nothing to do; no writes were issued.
    UpToDate,
    /// The full snapshot was applied.
    Full,
    /// This many delta versions were applied, in order.
    Delta { versions: usize },
}

/// Statistics about one sync run.
#[derive(Debug, Clone)]
pub struct SyncStats {
    pub outcome: Outcome,
    pub import: ImportStats,
}

impl SyncStats {
    fn up_to_date() -> Self {
        Self {
            outcome: Outcome::UpToDate,
            import: ImportStats::default(),
        }
    }
}

/// The source a run will actually consume.
enum Plan {
    UpToDate,
    Full(String),
    Delta(IndexMap<String, String>),
}

/// One sync run against one dataset.
///
/// All collaborators are injected; the runner owns no transport or
/// persistence of its own.
pub struct Syncer<'a> {
    config: &'a Config,
    metadata: &'a dyn MetadataSource,
    bytes: &'a dyn ByteStreamSource,
    destination: &'a dyn DestinationClient,
    versions: &'a mut dyn VersionStore,
}

impl<'a> Syncer<'a> {
    pub fn new(
        config: &'a Config,
        metadata: &'a dyn MetadataSource,
        bytes: &'a dyn ByteStreamSource,
        destination: &'a dyn DestinationClient,
        versions: &'a mut dyn VersionStore,
    ) -> Self {
        Self {
            config,
            metadata,
            bytes,
            destination,
            versions,
        }
    }

    /// Run the sync to completion.
    ///
    /// The version store is updated as the final action of a successful
    /// run; any aborted run leaves it untouched so the next invocation
    /// retries from the same boundary.
    pub async fn run(&mut self) -> Result<SyncStats, SyncError> {
        let dataset = &self.config.dataset;

        let source = metadata::resolve(self.metadata, dataset)
            .await
            .context(MetadataFetchSnafu { dataset })?;
        let last = self.versions.get(dataset).context(VersionsSnafu)?;

        if !self.config.full && last.as_deref() == Some(source.version.as_str()) {
            info!("Dataset {} already at version {}", dataset, source.version);
            return Ok(SyncStats::up_to_date());
        }

        let plan = self.plan(&source, last.as_deref()).await?;
        if matches!(plan, Plan::UpToDate) {
            info!("Dataset {} has no deltas to apply", dataset);
            return Ok(SyncStats::up_to_date());
        }

        // Collection checks happen before any entity byte stream is opened;
        // a read-only destination must fail fast, not mid-import.
        let collection = self.ensure_collection().await?;

        let (outcome, import) = match plan {
            Plan::UpToDate => unreachable!("handled above"),
            Plan::Full(url) => {
                info!("Running full import of {} from {}", dataset, url);
                (Outcome::Full, self.full_import(&collection, &url).await?)
            }
            Plan::Delta(chain) => {
                info!("Applying {} delta versions to {}", chain.len(), dataset);
                let versions = chain.len();
                let import = self.delta_import(&collection, &chain).await?;
                (Outcome::Delta { versions }, import)
            }
        };

        self.versions
            .set(dataset, &source.version)
            .context(VersionsSnafu)?;
        info!("Dataset {} now at version {}", dataset, source.version);

        Ok(SyncStats { outcome, import })
    }

    /// Decide between the delta chain and the full snapshot.
    async fn plan(&self, source: &DatasetSource, last: Option<&str>) -> Result<Plan, SyncError> {
        // Incremental is eligible only with a delta index, a known last
        // version, and no full-refresh override.
        if !self.config.full
            && let (Some(index_url), Some(last)) = (&source.delta_index_url, last)
        {
            match resolve_chain(self.bytes, index_url, last)
                .await
                .context(DeltaIndexSnafu)?
            {
                ChainResult::UpToDate => return Ok(Plan::UpToDate),
                ChainResult::Chain(chain) => return Ok(Plan::Delta(chain)),
                ChainResult::Unresolvable => {
                    warn!(
                        "Version {} pruned from the delta chain, falling back to full import",
                        last
                    );
                }
            }
        }

        match &source.snapshot_url {
            Some(url) => Ok(Plan::Full(url.clone())),
            None => NoSourceSnafu {
                dataset: &self.config.dataset,
            }
            .fail(),
        }
    }

    /// Find or create the destination collection, refusing read-only ones.
    async fn ensure_collection(&self) -> Result<Collection, SyncError> {
        let foreign_id = self.config.foreign_id();

        match self
            .destination
            .find_collection(foreign_id)
            .await
            .context(LookupSnafu { foreign_id })?
        {
            Some(collection) if !collection.writeable => {
                NotWritableSnafu { foreign_id }.fail()
            }
            Some(collection) => Ok(collection),
            None => {
                info!("Creating collection {}", foreign_id);
                self.destination
                    .create_collection(foreign_id)
                    .await
                    .context(CreateSnafu)
            }
        }
    }

    /// Stream the full snapshot into the destination.
    async fn full_import(
        &self,
        collection: &Collection,
        url: &str,
    ) -> Result<ImportStats, SyncError> {
        let mut importer =
            BatchImporter::for_full(self.destination, collection, self.config.full_batch_size);

        let mut stream: LineStream<Entity> = LineStream::open(self.bytes, url)
            .await
            .context(StreamFetchSnafu)
            .context(StreamSnafu)?;

        while let Some(item) = stream.next().await {
            let entity = item.context(StreamSnafu)?;
            importer.upsert(entity.flatten()).await?;
        }

        importer.finish().await
    }

    /// Apply each delta version strictly in order.
    ///
    /// One importer spans the whole chain: operations stay ordered across
    /// file boundaries, and an error in an earlier delta aborts before any
    /// later one is opened.
    async fn delta_import(
        &self,
        collection: &Collection,
        chain: &IndexMap<String, String>,
    ) -> Result<ImportStats, SyncError> {
        let mut importer = BatchImporter::for_delta(
            self.destination,
            collection,
            self.config.delta_batch_size,
            self.config.skip_removals,
        );

        for (version, url) in chain {
            info!("Applying delta version {}", version);
            let mut stream: LineStream<DeltaOperation> = LineStream::open(self.bytes, url)
                .await
                .context(StreamFetchSnafu)
                .context(StreamSnafu)?;

            while let Some(item) = stream.next().await {
                let op = item.context(StreamSnafu)?;
                importer.apply(op).await?;
            }
        }

        importer.finish().await
    }
}

/// Run one sync with real HTTP collaborators and the file-backed version
/// store described by `config`.
pub async fn run_sync(config: &Config) -> Result<SyncStats, SyncError> {
    use crate::error::ConfigSnafu;

    config.validate().context(ConfigSnafu)?;

    let client = reqwest::Client::new();
    let metadata = HttpMetadataSource::new(client.clone(), &config.data_url);
    let bytes = HttpSource::with_client(client.clone());
    let destination = HttpDestination::new(client, &config.host, &config.api_key);
    let mut versions = FileVersionStore::open(&config.version_cache).context(VersionsSnafu)?;

    Syncer::new(config, &metadata, &bytes, &destination, &mut versions)
        .run()
        .await
}

//! snowdrift: a standalone tool for syncing versioned entity datasets.
//!
//! This tool reads newline-delimited JSON entity snapshots and delta files
//! from a dataset publication and writes them to a collection store,
//! tracking the last-applied version so repeated runs converge to a no-op.

mod config;
mod error;
mod import;
mod model;
mod sink;
mod source;
mod sync;
mod version;

use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Config;
use error::SyncError;
use sync::{Outcome, run_sync};

/// Versioned dataset to collection store sync tool.
#[derive(Parser, Debug)]
#[command(name = "snowdrift")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Dataset identifier to synchronize.
    dataset: String,

    /// Destination foreign id (defaults to the dataset identifier).
    #[arg(long)]
    foreign_id: Option<String>,

    /// Base URL of the dataset publication.
    #[arg(long)]
    data_url: String,

    /// Base URL of the destination collection store.
    #[arg(long)]
    host: String,

    /// Destination API key.
    #[arg(long, env = "SNOWDRIFT_API_KEY", hide_env_values = true, default_value = "")]
    api_key: String,

    /// Force a full import even when deltas are available.
    #[arg(long)]
    full: bool,

    /// Apply additions and modifications but skip removals.
    #[arg(long)]
    skip_removals: bool,

    /// Upsert batch size for full imports.
    #[arg(long, default_value_t = import::FULL_UPSERT_BATCH)]
    full_batch_size: usize,

    /// Per-kind batch size for delta imports.
    #[arg(long, default_value_t = import::DELTA_BATCH)]
    delta_batch_size: usize,

    /// Path of the local version cache file.
    #[arg(long, default_value = "snowdrift-versions.json")]
    version_cache: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), SyncError> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("snowdrift starting");

    let config = Config {
        dataset: args.dataset,
        foreign_id: args.foreign_id,
        data_url: args.data_url,
        host: args.host,
        api_key: args.api_key,
        full: args.full,
        skip_removals: args.skip_removals,
        full_batch_size: args.full_batch_size,
        delta_batch_size: args.delta_batch_size,
        version_cache: args.version_cache,
    };

    let stats = run_sync(&config).await?;

    match stats.outcome {
        Outcome::UpToDate => info!("Already up to date, nothing to apply"),
        Outcome::Full => info!("Full import complete"),
        Outcome::Delta { versions } => info!("Applied {} delta versions", versions),
    }
    info!("  Entities upserted: {}", stats.import.entities_upserted);
    info!("  Entities deleted: {}", stats.import.entities_deleted);
    if stats.import.delete_failures > 0 {
        info!("  Deletions skipped on error: {}", stats.import.delete_failures);
    }
    if stats.import.removals_skipped > 0 {
        info!("  Removals skipped by flag: {}", stats.import.removals_skipped);
    }

    Ok(())
}

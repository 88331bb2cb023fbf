//! Delta chain resolution.
//!
//! Given the published delta index and the last version this destination
//! applied, works out the ordered list of delta files needed to catch up,
//! or signals that the chain is broken and a full import is required.
//!
//! The index stores versions newest-first; deltas apply oldest-first. The
//! inversion is an explicit reversal step so the ordering logic stays in
//! one place.

use indexmap::IndexMap;
use snafu::prelude::*;
use tracing::debug;

use crate::error::{DocumentSnafu, StreamError, StreamFetchSnafu, StreamParseSnafu};
use crate::model::DeltaIndex;
use crate::source::http::{ByteStreamSource, fetch_all};

/// Outcome of resolving the delta chain against a last-applied version.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainResult {
    /// The destination already holds the index's head version.
    UpToDate,
    /// The ordered deltas to apply, oldest first.
    Chain(IndexMap<String, String>),
    /// The last-applied version is no longer in the published list (pruned
    /// by the upstream retention window). Not an error: the caller falls
    /// back to a full import.
    Unresolvable,
}

/// Fetch the delta index at `url` and resolve the chain for `last_version`.
pub async fn resolve_chain(
    source: &dyn ByteStreamSource,
    url: &str,
    last_version: &str,
) -> Result<ChainResult, StreamError> {
    let body = fetch_all(source, url).await.context(StreamFetchSnafu)?;
    let index: DeltaIndex = serde_json::from_slice(&body)
        .context(DocumentSnafu { url })
        .context(StreamParseSnafu)?;

    Ok(chain_from_index(&index, last_version))
}

/// Resolve the chain from an already-fetched index.
///
/// The chain runs from the version immediately after `last_version` up to
/// the head, with no gaps and no duplicates. A missing link resolves to
/// [`ChainResult::Unresolvable`], never a silent skip.
pub fn chain_from_index(index: &DeltaIndex, last_version: &str) -> ChainResult {
    // The current pointer embeds the head version as a path segment; if it
    // already names last_version there is nothing to apply.
    if let Some(current) = &index.current
        && current.split('/').any(|segment| segment == last_version)
    {
        return ChainResult::UpToDate;
    }

    let ordered = index.ordered_versions();
    let Some(position) = ordered.iter().position(|(v, _)| *v == last_version) else {
        debug!("Version {} not in the published chain", last_version);
        return ChainResult::Unresolvable;
    };

    if position == 0 {
        // last_version is the newest known version
        return ChainResult::UpToDate;
    }

    // Everything strictly newer than last_version, reversed to apply order
    let chain: IndexMap<String, String> = ordered[..position]
        .iter()
        .rev()
        .map(|(v, u)| (v.to_string(), u.to_string()))
        .collect();

    debug!("Resolved chain of {} deltas", chain.len());
    ChainResult::Chain(chain)
}

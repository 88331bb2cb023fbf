//! HTTP byte-stream source.
//!
//! Opens remote resources as lazy byte streams. Transfers are issued per
//! call; nothing is cached, so re-opening a URL re-issues the request.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use snafu::prelude::*;
use std::pin::Pin;
use tracing::debug;

use crate::error::{BodySnafu, FetchError, StatusSnafu, TransportSnafu};

/// A lazy stream of body chunks from a remote resource.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, FetchError>> + Send>>;

/// Trait for opening remote resources as byte streams.
///
/// Abstracting the transport keeps the reader and the resolvers testable
/// against in-memory sources.
#[async_trait]
pub trait ByteStreamSource: Send + Sync {
    /// Open the resource at `url`.
    ///
    /// Transport failures and non-success statuses surface here, before any
    /// bytes are produced.
    async fn open(&self, url: &str) -> Result<ByteStream, FetchError>;
}

/// HTTP implementation backed by a shared reqwest client.
#[derive(Debug, Clone, Default)]
pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    /// Create a new source with its own connection pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a source reusing an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ByteStreamSource for HttpSource {
    async fn open(&self, url: &str) -> Result<ByteStream, FetchError> {
        debug!("Opening {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context(TransportSnafu { url })?;

        let status = response.status();
        ensure!(status.is_success(), StatusSnafu { url, status });

        let owned_url = url.to_string();
        let stream = response
            .bytes_stream()
            .map(move |chunk| chunk.context(BodySnafu { url: &owned_url }));

        Ok(Box::pin(stream))
    }
}

/// Read an entire resource into memory.
///
/// Used for small documents (delta indexes); entity data always goes
/// through [`crate::source::LineStream`] instead.
pub async fn fetch_all(source: &dyn ByteStreamSource, url: &str) -> Result<Vec<u8>, FetchError> {
    let mut stream = source.open(url).await?;
    let mut body = Vec::new();
    while let Some(chunk) = stream.next().await {
        body.extend_from_slice(&chunk?);
    }
    Ok(body)
}

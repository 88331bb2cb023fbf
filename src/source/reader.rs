//! Newline-delimited JSON line stream.
//!
//! Turns a remote byte stream into a lazy, forward-only sequence of parsed
//! JSON values, one per non-empty line. Buffering is bounded by one partial
//! line plus the in-flight network chunk; the whole dataset is never held
//! in memory.

use bytes::BytesMut;
use futures::stream::StreamExt;
use serde::de::DeserializeOwned;
use snafu::prelude::*;
use std::marker::PhantomData;
use tracing::trace;

use crate::error::{FetchError, LineSnafu, StreamError, StreamFetchSnafu, StreamParseSnafu};
use crate::source::http::{ByteStream, ByteStreamSource};

/// A pull-based reader over a newline-delimited JSON resource.
///
/// Yields one parsed value per non-empty line in source order. A transport
/// failure or a malformed line is terminal: the stream yields the error once
/// and then only `None`. Not restartable; open the URL again to re-read.
pub struct LineStream<T> {
    url: String,
    inner: ByteStream,
    buf: BytesMut,
    /// 1-based line number of the next line, for error reporting.
    line: u64,
    done: bool,
    _marker: PhantomData<T>,
}

impl<T: DeserializeOwned> LineStream<T> {
    /// Open `url` through `source` and wrap it as a line stream.
    ///
    /// Transfer failures and non-success statuses surface here, before any
    /// item is produced.
    pub async fn open(source: &dyn ByteStreamSource, url: &str) -> Result<Self, FetchError> {
        let inner = source.open(url).await?;
        Ok(Self {
            url: url.to_string(),
            inner,
            buf: BytesMut::new(),
            line: 0,
            done: false,
            _marker: PhantomData,
        })
    }

    /// Pull the next parsed value.
    ///
    /// Returns `None` once the source is exhausted or after a terminal
    /// error has been yielded.
    pub async fn next(&mut self) -> Option<Result<T, StreamError>> {
        if self.done {
            return None;
        }

        loop {
            // Complete lines already buffered take priority over new reads
            if let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
                let raw = self.buf.split_to(pos + 1);
                match self.parse_line(&raw[..pos]) {
                    Some(result) => return Some(result),
                    None => continue,
                }
            }

            match self.inner.next().await {
                Some(Ok(chunk)) => self.buf.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e).context(StreamFetchSnafu));
                }
                None => {
                    // End of transfer; a final line may lack its newline
                    self.done = true;
                    let raw = self.buf.split();
                    return self.parse_line(&raw);
                }
            }
        }
    }

    /// Parse a single raw line, skipping blank ones.
    ///
    /// Returns `None` for a blank line, `Some(Err(_))` for a malformed one.
    /// Malformed input aborts the stream rather than being skipped.
    fn parse_line(&mut self, raw: &[u8]) -> Option<Result<T, StreamError>> {
        self.line += 1;
        let trimmed = raw.trim_ascii();
        if trimmed.is_empty() {
            return None;
        }

        trace!("Parsing line {} of {}", self.line, self.url);
        match serde_json::from_slice(trimmed) {
            Ok(value) => Some(Ok(value)),
            Err(e) => {
                self.done = true;
                Some(
                    Err(e)
                        .context(LineSnafu {
                            url: &self.url,
                            line: self.line,
                        })
                        .context(StreamParseSnafu),
                )
            }
        }
    }
}

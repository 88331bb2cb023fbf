//! Remote dataset sources.
//!
//! Provides the byte-stream abstraction over HTTP, the newline-delimited
//! JSON line reader, the dataset metadata resolver and the delta chain
//! resolver.

pub mod delta;
pub mod http;
pub mod metadata;
pub mod reader;

pub use delta::{ChainResult, resolve_chain};
pub use http::{ByteStream, ByteStreamSource, HttpSource};
pub use metadata::{DatasetSource, HttpMetadataSource, MetadataSource};
pub use reader::LineStream;

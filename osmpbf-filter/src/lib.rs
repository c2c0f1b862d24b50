#![doc = include_str!("../README.md")]

include!(concat!(env!("OUT_DIR"), "/proto/mod.rs"));

/// Decompressed blob cache for high-memory runs
pub mod cache;
pub mod delta;
/// Typed access to decoded primitive blocks
pub mod element;
pub mod error;
/// OSMHeader capability checks
pub mod header;
/// CSV rows and their writer threads
pub mod output;
pub mod ownership;
/// Blob decompression
pub mod parser;
/// Way and node filtering passes
pub mod pass;
/// Worker pool and run coordination
pub mod pipeline;
/// Blob framing over a seekable file
pub mod reader;

#[cfg(test)]
mod testutil;

pub use error::{Error, Result};
pub use header::HeaderSummary;
pub use osmdata::*;
pub use osmformat::*;
pub use pipeline::{FilterConfig, Pipeline, RunSummary, WorkerPool, default_workers};
pub use reader::{BlobKind, BlobReader, RawBlob};

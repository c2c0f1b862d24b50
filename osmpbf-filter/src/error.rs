use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Exit status for a run that could not open its input file.
pub const EXIT_OPEN_INPUT: i32 = 1;
/// Exit status for a malformed or truncated blob frame.
pub const EXIT_FRAMING: i32 = 2;
/// Exit status for an output file that could not be created or written.
pub const EXIT_OUTPUT: i32 = 3;
/// Exit status for a file requiring features this filter cannot interpret.
pub const EXIT_UNSUPPORTED_FEATURE: i32 = 5;
/// Exit status for a blob whose payload could not be decompressed or decoded.
pub const EXIT_DECODE: i32 = 6;
/// Exit status for failures of the worker pipeline itself.
pub const EXIT_PIPELINE: i32 = 7;

/// Every failure the filter can run into. All of them are fatal for the run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("unable to open {}: {source}", path.display())]
    OpenInput {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unable to create {}: {source}", path.display())]
    CreateOutput {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unable to write output: {0}")]
    WriteOutput(#[source] io::Error),

    #[error(transparent)]
    Io(#[from] io::Error),

    // The length of the BlobHeader must be less than 64 KiB.
    // https://wiki.openstreetmap.org/wiki/PBF_Format
    #[error("blob header at offset {offset} declares {size} bytes, limit is 64 KiB")]
    BlobHeaderTooLarge { offset: u64, size: u32 },

    // Blobs must be less than 32 MiB.
    #[error("blob at offset {offset} declares {size} bytes, limit is 32 MiB")]
    BlobDataTooLarge { offset: u64, size: i64 },

    #[error("truncated {what} at offset {offset}: expected {expected} bytes, {available} available")]
    Truncated {
        what: &'static str,
        offset: u64,
        expected: u64,
        available: u64,
    },

    #[error("invalid blob frame at offset {offset}: {reason}")]
    InvalidFrame { offset: u64, reason: String },

    #[error("protobuf decode error: {0}")]
    Decode(#[from] quick_protobuf::Error),

    #[error("unable to decompress blob at offset {offset}: {source}")]
    Decompress {
        offset: u64,
        #[source]
        source: io::Error,
    },

    #[error("the encoding of the blob at offset {offset} is not supported")]
    UnsupportedEncoding { offset: u64 },

    #[error("unsupported feature required in OSM header: {0}")]
    UnsupportedFeature(String),

    #[error("malformed primitive block: {0}")]
    MalformedBlock(String),

    #[error("string table index {index} out of range (table has {len} entries)")]
    StringIndex { index: usize, len: usize },

    #[error("node ownership collector stopped during the way pass")]
    OwnershipLost,

    #[error("pass stalled after {completed} of {total} blobs")]
    Stalled { completed: usize, total: usize },

    #[error("unable to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Process exit status reported for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::OpenInput { .. } => EXIT_OPEN_INPUT,
            Error::Io(_)
            | Error::BlobHeaderTooLarge { .. }
            | Error::BlobDataTooLarge { .. }
            | Error::Truncated { .. }
            | Error::InvalidFrame { .. } => EXIT_FRAMING,
            Error::CreateOutput { .. } | Error::WriteOutput(_) => EXIT_OUTPUT,
            Error::UnsupportedFeature(_) => EXIT_UNSUPPORTED_FEATURE,
            Error::Decode(_)
            | Error::Decompress { .. }
            | Error::UnsupportedEncoding { .. }
            | Error::MalformedBlock(_)
            | Error::StringIndex { .. } => EXIT_DECODE,
            Error::Stalled { .. } | Error::OwnershipLost | Error::ThreadPool(_) => EXIT_PIPELINE,
        }
    }
}

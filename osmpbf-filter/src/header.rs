use std::io::{Read, Seek};

use log::info;
use quick_protobuf::{BytesReader, MessageRead};

use crate::error::{Error, Result};
use crate::parser::BlobDecoder;
use crate::reader::{BlobKind, BlobReader, RawBlob};
use crate::HeaderBlock;

// REQUIRED FEATURES this filter can interpret
pub const OSM_SCHEMA_V06: &str = "OsmSchema-V0.6";
pub const DENSE_NODES: &str = "DenseNodes";

pub const SUPPORTED_FEATURES: [&str; 2] = [OSM_SCHEMA_V06, DENSE_NODES];

/// What the `OSMHeader` blobs of a file declared.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeaderSummary {
    pub header_blobs: usize,
    pub required_features: Vec<String>,
    pub optional_features: Vec<String>,
    pub writing_program: Option<String>,
}

/// Scans the whole file and fails on the first required feature outside
/// [`SUPPORTED_FEATURES`]. Data blobs are skipped without being read.
///
/// Starts at the reader's current position; the caller rewinds.
pub fn validate_capabilities<R: Read + Seek>(
    reader: &mut BlobReader<R>,
    decoder: &BlobDecoder,
) -> Result<HeaderSummary> {
    let mut summary = HeaderSummary::default();

    while let Some(frame) = reader.next_frame()? {
        if frame.kind != BlobKind::OsmHeader {
            reader.skip_payload(&frame)?;
            continue;
        }

        let blob = RawBlob {
            data: reader.read_payload(&frame)?,
            offset: frame.offset,
            kind: frame.kind,
        };
        let bytes = decoder.decode(&blob)?;
        let mut bytes_reader = BytesReader::from_bytes(&bytes);
        let header = HeaderBlock::from_reader(&mut bytes_reader, &bytes)?;

        for feature in &header.required_features {
            if !SUPPORTED_FEATURES.contains(&feature.as_ref()) {
                return Err(Error::UnsupportedFeature(feature.to_string()));
            }
        }

        summary.header_blobs += 1;
        summary
            .required_features
            .extend(header.required_features.iter().map(|f| f.to_string()));
        summary
            .optional_features
            .extend(header.optional_features.iter().map(|f| f.to_string()));
        if let Some(program) = &header.writingprogram {
            summary.writing_program = Some(program.to_string());
        }
    }

    info!(
        header_blobs = summary.header_blobs,
        required_features = summary.required_features.join(",").as_str(),
        optional_features = summary.optional_features.join(",").as_str();
        "OSM header accepted"
    );
    Ok(summary)
}

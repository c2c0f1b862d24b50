use crate::cache::BlobCache;
use crate::error::{Error, Result};
use crate::reader::RawBlob;
use crate::Blob;
use quick_protobuf::{BytesReader, MessageRead};
use std::{io::Read, sync::Arc};

/// Turns a [`RawBlob`] into the bytes of the block it carries.
#[derive(Clone, Debug, Default)]
pub struct BlobDecoder {
    cache: Option<Arc<BlobCache>>,
}

impl BlobDecoder {
    /// A decoder that consults `cache` before decompressing, if given.
    pub fn new(cache: Option<Arc<BlobCache>>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> Option<&BlobCache> {
        self.cache.as_deref()
    }

    /// Decompressed block bytes of `blob`, from the cache when possible.
    pub fn decode(&self, blob: &RawBlob) -> Result<Arc<[u8]>> {
        let Some(cache) = &self.cache else {
            return Ok(Arc::from(decompress(&blob.data, blob.offset)?));
        };
        if let Some(bytes) = cache.get(blob.offset) {
            return Ok(bytes);
        }
        let bytes = Arc::from(decompress(&blob.data, blob.offset)?);
        Ok(cache.insert(blob.offset, bytes))
    }
}

/// Deserializes a `Blob` message and decompresses its payload.
/// `offset` only identifies the blob in errors.
pub fn decompress(blob_slice: &[u8], offset: u64) -> Result<Vec<u8>> {
    let mut reader = BytesReader::from_bytes(blob_slice);
    let blob = Blob::from_reader(&mut reader, blob_slice)?;

    // either take the raw_size if available or use 2 * compressed_size as heuristic
    let size = match blob.raw_size {
        Some(raw_size) if raw_size >= 0 => raw_size as usize,
        _ => blob_slice.len() * 2,
    };
    let mut decompressed: Vec<u8> = Vec::with_capacity(size);
    let inflated = if let Some(raw) = &blob.raw {
        decompressed.extend_from_slice(raw);
        Ok(raw.len())
    } else if let Some(zlib) = &blob.zlib_data {
        flate2::read::ZlibDecoder::new(&zlib[..]).read_to_end(&mut decompressed)
    } else if let Some(lzma) = &blob.lzma_data {
        xz2::read::XzDecoder::new(&lzma[..]).read_to_end(&mut decompressed)
    } else {
        // lz4, zstd and blobs without any data
        return Err(Error::UnsupportedEncoding { offset });
    };
    inflated.map_err(|source| Error::Decompress { offset, source })?;

    if let Some(raw_size) = blob.raw_size {
        if raw_size as i64 != decompressed.len() as i64 {
            return Err(Error::Decompress {
                offset,
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!(
                        "raw_size is {} but payload inflated to {} bytes",
                        raw_size,
                        decompressed.len()
                    ),
                ),
            });
        }
    }

    Ok(decompressed)
}

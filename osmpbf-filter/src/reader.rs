use quick_protobuf::{BytesReader, MessageRead};

use crate::error::{Error, Result};
use crate::BlobHeader;
use std::{
    fs::File,
    io::{self, BufReader, Read, Seek, SeekFrom},
    path::Path,
};

const BUF_SIZE: usize = 1024 * 1024; // 1MB
const MAX_HEADER_SIZE: u32 = 64 * 1024; // 64KB
const MAX_BLOB_SIZE: i64 = 32 * 1024 * 1024; // 32MB
const PREFIX_SIZE: u64 = 4;

/// Type of a blob as declared by its `BlobHeader`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum BlobKind {
    /// `OSMHeader`, the dataset description.
    OsmHeader,
    /// `OSMData`, a `PrimitiveBlock` of nodes, ways and relations.
    OsmData,
    /// Any other type. Readers must skip these.
    Other(String),
}

impl From<&str> for BlobKind {
    fn from(s: &str) -> Self {
        match s {
            "OSMHeader" => Self::OsmHeader,
            "OSMData" => Self::OsmData,
            other => Self::Other(other.to_owned()),
        }
    }
}

/// Header of one frame: where it starts, what it holds and how long its payload is.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// File offset of the 4 byte length prefix. Unique per blob within one file.
    pub offset: u64,
    pub kind: BlobKind,
    pub data_size: u64,
}

/// A still encoded blob as read from the file.
#[derive(Clone, Debug)]
pub struct RawBlob {
    pub offset: u64,
    pub kind: BlobKind,
    pub data: Vec<u8>,
}

/// Sequential reader over the length-prefixed frames of a `.osm.pbf` file.
///
/// Each frame is a big-endian `u32` header length, a `BlobHeader` message of
/// that length and then `datasize` bytes of `Blob` payload.
#[derive(Debug)]
pub struct BlobReader<R> {
    reader: R,
    header: Vec<u8>,
    start: u64,
    position: u64,
    len: u64,
}

impl BlobReader<BufReader<File>> {
    /// Opens a file for reading frames from its start.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| Error::OpenInput {
            path: path.to_path_buf(),
            source,
        })?;
        Self::new(BufReader::with_capacity(BUF_SIZE, file))
    }
}

impl<R: Read + Seek> BlobReader<R> {
    /// Wraps a source that is positioned at a frame boundary.
    pub fn new(mut reader: R) -> Result<Self> {
        let position = reader.stream_position()?;
        let len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(position))?;
        Ok(Self {
            reader,
            header: Vec::with_capacity(MAX_HEADER_SIZE as usize),
            start: position,
            position,
            len,
        })
    }

    /// Moves back to the first frame so another pass can start.
    pub fn rewind(&mut self) -> Result<()> {
        self.reader.seek(SeekFrom::Start(self.start))?;
        self.position = self.start;
        Ok(())
    }

    /// Current offset in the source; always a frame boundary between calls.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Reads the next frame including its payload.
    pub fn next_blob(&mut self) -> Result<Option<RawBlob>> {
        let Some(frame) = self.next_frame()? else {
            return Ok(None);
        };
        let data = self.read_payload(&frame)?;
        Ok(Some(RawBlob {
            offset: frame.offset,
            kind: frame.kind,
            data,
        }))
    }

    /// Reads the next frame header and seeks past its payload without buffering it.
    pub fn skip_blob(&mut self) -> Result<Option<Frame>> {
        let Some(frame) = self.next_frame()? else {
            return Ok(None);
        };
        self.skip_payload(&frame)?;
        Ok(Some(frame))
    }

    /// Counts the remaining frames without reading any payload.
    pub fn count_blobs(&mut self) -> Result<usize> {
        let mut count = 0;
        while self.skip_blob()?.is_some() {
            count += 1;
        }
        Ok(count)
    }

    /// Reads a length prefix and `BlobHeader`. `None` on a clean end of file.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        let offset = self.position;
        let mut prefix = [0u8; PREFIX_SIZE as usize];
        let read = read_up_to(&mut self.reader, &mut prefix)?;
        if read == 0 {
            return Ok(None);
        }
        if read < prefix.len() {
            return Err(Error::Truncated {
                what: "blob header length",
                offset,
                expected: PREFIX_SIZE,
                available: read as u64,
            });
        }
        self.position += PREFIX_SIZE;

        let header_size = u32::from_be_bytes(prefix);
        if header_size > MAX_HEADER_SIZE {
            return Err(Error::BlobHeaderTooLarge {
                offset,
                size: header_size,
            });
        }

        let header_size = header_size as usize;
        self.header.resize(header_size, 0);
        let read = read_up_to(&mut self.reader, &mut self.header[..header_size])?;
        if read < header_size {
            return Err(Error::Truncated {
                what: "blob header",
                offset,
                expected: header_size as u64,
                available: read as u64,
            });
        }
        self.position += header_size as u64;

        let mut bytes = BytesReader::from_bytes(&self.header[..header_size]);
        let header = BlobHeader::from_reader(&mut bytes, &self.header[..header_size])?;

        let data_size = i64::from(header.datasize);
        if data_size < 0 {
            return Err(Error::InvalidFrame {
                offset,
                reason: format!("negative datasize {}", data_size),
            });
        }
        if data_size > MAX_BLOB_SIZE {
            return Err(Error::BlobDataTooLarge {
                offset,
                size: data_size,
            });
        }

        Ok(Some(Frame {
            offset,
            kind: BlobKind::from(header.type_pb.as_ref()),
            data_size: data_size as u64,
        }))
    }

    /// Reads the payload that follows `frame`.
    pub fn read_payload(&mut self, frame: &Frame) -> Result<Vec<u8>> {
        let mut data = vec![0u8; frame.data_size as usize];
        let read = read_up_to(&mut self.reader, &mut data)?;
        if read < data.len() {
            return Err(Error::Truncated {
                what: "blob",
                offset: frame.offset,
                expected: frame.data_size,
                available: read as u64,
            });
        }
        self.position += frame.data_size;
        Ok(data)
    }

    /// Seeks over the payload that follows `frame`.
    pub fn skip_payload(&mut self, frame: &Frame) -> Result<()> {
        // seeking past the end succeeds, so check against the known length
        let available = self.len.saturating_sub(self.position);
        if frame.data_size > available {
            return Err(Error::Truncated {
                what: "blob",
                offset: frame.offset,
                expected: frame.data_size,
                available,
            });
        }
        self.reader.seek(SeekFrom::Current(frame.data_size as i64))?;
        self.position += frame.data_size;
        Ok(())
    }
}

// Like read_exact, but reports how much was available instead of failing on EOF.
fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

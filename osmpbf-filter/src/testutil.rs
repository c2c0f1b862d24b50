//! Builders for small synthetic `.osm.pbf` files used across the unit tests.

use std::borrow::Cow;
use std::io::Write;
use std::path::{Path, PathBuf};

use quick_protobuf::{MessageWrite, Writer};

use crate::delta::delta_encode;
use crate::{
    Blob, BlobHeader, DenseNodes, HeaderBlock, Node, PrimitiveBlock, PrimitiveGroup, StringTable,
    Way,
};

const GRANULARITY: f64 = 100.0;

/// How a data blob is stored in the file.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Compression {
    Raw,
    Zlib,
    Lzma,
}

/// Serializes a message without a length prefix, the way blobs embed them.
pub(crate) fn encode<M: MessageWrite>(msg: &M) -> Vec<u8> {
    let mut out = Vec::new();
    let mut writer = Writer::new(&mut out);
    msg.write_message(&mut writer).unwrap();
    out
}

/// Wraps block bytes into an encoded `Blob` message.
pub(crate) fn encode_blob(block: &[u8], compression: Compression) -> Vec<u8> {
    let mut blob = Blob {
        raw_size: Some(block.len() as i32),
        ..Default::default()
    };
    match compression {
        Compression::Raw => blob.raw = Some(Cow::Owned(block.to_vec())),
        Compression::Zlib => {
            let mut encoder =
                flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(block).unwrap();
            blob.zlib_data = Some(Cow::Owned(encoder.finish().unwrap()));
        }
        Compression::Lzma => {
            let mut encoder = xz2::write::XzEncoder::new(Vec::new(), 6);
            encoder.write_all(block).unwrap();
            blob.lzma_data = Some(Cow::Owned(encoder.finish().unwrap()));
        }
    }
    encode(&blob)
}

fn to_raw(degrees: f64) -> i64 {
    (degrees * 1e9 / GRANULARITY).round() as i64
}

/// Assembles frames into a complete file image.
#[derive(Default)]
pub(crate) struct PbfBuilder {
    bytes: Vec<u8>,
}

impl PbfBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Appends an `OSMHeader` blob declaring `features` as required.
    pub(crate) fn header(self, features: &[&str]) -> Self {
        let header = HeaderBlock {
            required_features: features.iter().map(|f| Cow::Owned(f.to_string())).collect(),
            optional_features: vec![Cow::Borrowed("Sort.Type_then_ID")],
            writingprogram: Some(Cow::Borrowed("osmpbf-filter tests")),
            ..Default::default()
        };
        let payload = encode_blob(&encode(&header), Compression::Raw);
        self.frame("OSMHeader", &payload)
    }

    /// Appends a zlib compressed `OSMData` blob.
    pub(crate) fn data(self, block: PrimitiveBlock<'_>) -> Self {
        self.data_with(block, Compression::Zlib)
    }

    pub(crate) fn data_with(self, block: PrimitiveBlock<'_>, compression: Compression) -> Self {
        let payload = encode_blob(&encode(&block), compression);
        self.frame("OSMData", &payload)
    }

    /// Appends a frame with an arbitrary type and payload.
    pub(crate) fn frame(mut self, kind: &str, payload: &[u8]) -> Self {
        let header = BlobHeader {
            type_pb: Cow::Owned(kind.to_owned()),
            indexdata: None,
            datasize: payload.len() as i32,
        };
        let header = encode(&header);
        self.bytes
            .extend_from_slice(&(header.len() as u32).to_be_bytes());
        self.bytes.extend_from_slice(&header);
        self.bytes.extend_from_slice(payload);
        self
    }

    pub(crate) fn build(self) -> Vec<u8> {
        self.bytes
    }

    /// Writes the file into `dir` and returns its path.
    pub(crate) fn write_to(self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, self.bytes).unwrap();
        path
    }
}

/// Builds a `PrimitiveBlock` with one dense node group, one plain node group
/// and one way group, skipping the groups that stay empty.
#[derive(Default)]
pub(crate) struct BlockBuilder {
    strings: Vec<String>,
    dense: Vec<(i64, f64, f64)>,
    plain: Vec<(i64, f64, f64)>,
    ways: Vec<(i64, Vec<(u32, u32)>, Vec<i64>)>,
}

impl BlockBuilder {
    pub(crate) fn new() -> Self {
        Self {
            // index 0 is reserved as the empty string / dense delimiter
            strings: vec![String::new()],
            ..Default::default()
        }
    }

    fn intern(&mut self, s: &str) -> u32 {
        match self.strings.iter().position(|x| x == s) {
            Some(i) => i as u32,
            None => {
                self.strings.push(s.to_owned());
                (self.strings.len() - 1) as u32
            }
        }
    }

    /// Adds a dense node at `lon`/`lat` degrees.
    pub(crate) fn node(mut self, id: i64, lon: f64, lat: f64) -> Self {
        self.dense.push((id, lon, lat));
        self
    }

    /// Adds a non-dense node at `lon`/`lat` degrees.
    pub(crate) fn plain_node(mut self, id: i64, lon: f64, lat: f64) -> Self {
        self.plain.push((id, lon, lat));
        self
    }

    pub(crate) fn way(mut self, id: i64, tags: &[(&str, &str)], refs: &[i64]) -> Self {
        let tags = tags
            .iter()
            .map(|(k, v)| (self.intern(k), self.intern(v)))
            .collect();
        self.ways.push((id, tags, refs.to_vec()));
        self
    }

    pub(crate) fn build(self) -> PrimitiveBlock<'static> {
        let mut groups = Vec::new();

        if !self.dense.is_empty() {
            let ids: Vec<i64> = self.dense.iter().map(|n| n.0).collect();
            let lons: Vec<i64> = self.dense.iter().map(|n| to_raw(n.1)).collect();
            let lats: Vec<i64> = self.dense.iter().map(|n| to_raw(n.2)).collect();
            groups.push(PrimitiveGroup {
                dense: Some(DenseNodes {
                    id: delta_encode(&ids),
                    lat: delta_encode(&lats),
                    lon: delta_encode(&lons),
                    ..Default::default()
                }),
                ..Default::default()
            });
        }

        if !self.plain.is_empty() {
            groups.push(PrimitiveGroup {
                nodes: self
                    .plain
                    .iter()
                    .map(|&(id, lon, lat)| Node {
                        id,
                        lat: to_raw(lat),
                        lon: to_raw(lon),
                        ..Default::default()
                    })
                    .collect(),
                ..Default::default()
            });
        }

        if !self.ways.is_empty() {
            groups.push(PrimitiveGroup {
                ways: self
                    .ways
                    .into_iter()
                    .map(|(id, tags, refs)| Way {
                        id,
                        keys: tags.iter().map(|t| t.0).collect(),
                        vals: tags.iter().map(|t| t.1).collect(),
                        refs: delta_encode(&refs),
                        ..Default::default()
                    })
                    .collect(),
                ..Default::default()
            });
        }

        PrimitiveBlock {
            stringtable: StringTable {
                s: self
                    .strings
                    .into_iter()
                    .map(|s| Cow::Owned(s.into_bytes()))
                    .collect(),
            },
            primitivegroup: groups,
            // the derived Default leaves these at 0 instead of the schema defaults
            granularity: GRANULARITY as i32,
            date_granularity: 1000,
            ..Default::default()
        }
    }
}

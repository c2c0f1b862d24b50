use crate::delta::delta_decode;
use crate::error::{Error, Result};
use crate::{DenseNodes, Node, PrimitiveBlock, Way};
use quick_protobuf::{BytesReader, MessageRead};
use std::borrow::Cow;

/// A decoded `PrimitiveBlock` borrowing the decompressed blob bytes.
///
/// Only ways and nodes are exposed; relations and changesets are parsed by
/// the protobuf layer and then ignored.
#[derive(Debug)]
pub struct OsmBlock<'a> {
    block: PrimitiveBlock<'a>,
}

impl<'a> OsmBlock<'a> {
    /// Parses block bytes and checks that parallel arrays line up.
    pub fn parse(bytes: &'a [u8]) -> Result<Self> {
        let mut reader = BytesReader::from_bytes(bytes);
        let block = PrimitiveBlock::from_reader(&mut reader, bytes)?;
        let block = Self { block };
        block.validate()?;
        Ok(block)
    }

    fn validate(&self) -> Result<()> {
        for group in &self.block.primitivegroup {
            if let Some(dense) = &group.dense {
                let len = dense.id.len();
                if dense.lat.len() != len || dense.lon.len() != len {
                    return Err(Error::MalformedBlock(format!(
                        "dense nodes with {} ids, {} lats and {} lons",
                        len,
                        dense.lat.len(),
                        dense.lon.len()
                    )));
                }
            }
            for way in &group.ways {
                if way.keys.len() != way.vals.len() {
                    return Err(Error::MalformedBlock(format!(
                        "way {} has {} keys but {} values",
                        way.id,
                        way.keys.len(),
                        way.vals.len()
                    )));
                }
            }
        }
        Ok(())
    }

    /// The block's string table; index 0 is always the empty string.
    pub fn string_table(&self) -> &[Cow<'a, [u8]>] {
        &self.block.stringtable.s
    }

    /// Looks up a string table entry.
    pub fn string(&self, index: u32) -> Result<&[u8]> {
        let table = self.string_table();
        table
            .get(index as usize)
            .map(|s| s.as_ref())
            .ok_or(Error::StringIndex {
                index: index as usize,
                len: table.len(),
            })
    }

    /// All string table indices whose entry equals `key`.
    ///
    /// Tags are compared by index afterwards, so the key bytes are only
    /// compared once per block instead of once per tag.
    pub fn string_ids(&self, key: &str) -> Vec<u32> {
        self.string_table()
            .iter()
            .enumerate()
            .filter(|(_, s)| s.as_ref() == key.as_bytes())
            .map(|(i, _)| i as u32)
            .collect()
    }

    /// Iterates over every way of every group.
    pub fn ways(&self) -> impl Iterator<Item = WayRef<'_>> {
        self.block
            .primitivegroup
            .iter()
            .flat_map(|group| group.ways.iter())
            .map(|way| WayRef { way })
    }

    /// Iterates over every node of every group, dense and plain, with
    /// coordinates converted to degrees.
    pub fn nodes(&self) -> impl Iterator<Item = NodeRecord> + '_ {
        let coords = Coordinates {
            granularity: i64::from(self.block.granularity),
            lat_offset: self.block.lat_offset,
            lon_offset: self.block.lon_offset,
        };
        self.block.primitivegroup.iter().flat_map(move |group| {
            let dense = group
                .dense
                .iter()
                .flat_map(move |dense| DenseNodeIter::new(dense, coords));
            let plain = group
                .nodes
                .iter()
                .map(move |node: &Node| coords.record(node.id, node.lat, node.lon));
            dense.chain(plain)
        })
    }
}

/// A node with absolute id and coordinates in degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodeRecord {
    pub id: i64,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Clone, Copy, Debug)]
struct Coordinates {
    granularity: i64,
    lat_offset: i64,
    lon_offset: i64,
}

impl Coordinates {
    #[inline]
    fn record(&self, id: i64, lat: i64, lon: i64) -> NodeRecord {
        NodeRecord {
            id,
            lat: Self::degrees(lat, self.granularity, self.lat_offset),
            lon: Self::degrees(lon, self.granularity, self.lon_offset),
        }
    }

    #[inline]
    fn degrees(raw: i64, granularity: i64, offset: i64) -> f64 {
        (raw.wrapping_mul(granularity).wrapping_add(offset) as f64) * 1e-9
    }
}

// id, lat and lon are running sums, so dense nodes decode strictly in order
struct DenseNodeIter<'b> {
    nodes: &'b DenseNodes,
    coords: Coordinates,
    index: usize,
    prev_id: i64,
    prev_lat: i64,
    prev_lon: i64,
}

impl<'b> DenseNodeIter<'b> {
    fn new(nodes: &'b DenseNodes, coords: Coordinates) -> Self {
        Self {
            nodes,
            coords,
            index: 0,
            prev_id: 0,
            prev_lat: 0,
            prev_lon: 0,
        }
    }
}

impl Iterator for DenseNodeIter<'_> {
    type Item = NodeRecord;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let i = self.index;
        let id = *self.nodes.id.get(i)?;
        self.prev_id = self.prev_id.wrapping_add(id);
        self.prev_lat = self.prev_lat.wrapping_add(self.nodes.lat[i]);
        self.prev_lon = self.prev_lon.wrapping_add(self.nodes.lon[i]);
        self.index += 1;
        Some(self.coords.record(self.prev_id, self.prev_lat, self.prev_lon))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.nodes.id.len() - self.index;
        (len, Some(len))
    }
}

/// A Reference to a [`Way`]
#[derive(Debug, Clone, Copy)]
pub struct WayRef<'b> {
    way: &'b Way,
}

impl<'b> WayRef<'b> {
    /// Get ID
    #[inline]
    pub fn id(&self) -> i64 {
        self.way.id
    }

    /// (key, value) string table indices in stored order.
    #[inline]
    pub fn tags(&self) -> impl Iterator<Item = (u32, u32)> + 'b {
        self.way
            .keys
            .iter()
            .copied()
            .zip(self.way.vals.iter().copied())
    }

    /// Absolute node ids in the order the way lists them.
    #[inline]
    pub fn node_ids(&self) -> Vec<i64> {
        delta_decode(&self.way.refs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{BlockBuilder, encode};
    use crate::{PrimitiveGroup, StringTable};

    #[test]
    fn dense_and_plain_nodes_decode_to_degrees() {
        let bytes = encode(
            &BlockBuilder::new()
                .node(1, 10.0, 20.0)
                .node(2, 11.0, 21.0)
                .node(5, -0.5, 51.25)
                .plain_node(9, 13.4, 52.5)
                .build(),
        );
        let block = OsmBlock::parse(&bytes).unwrap();
        let nodes: Vec<NodeRecord> = block.nodes().collect();

        let ids: Vec<i64> = nodes.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![1, 2, 5, 9]);
        let expected = [(20.0, 10.0), (21.0, 11.0), (51.25, -0.5), (52.5, 13.4)];
        for (node, (lat, lon)) in nodes.iter().zip(expected) {
            assert!((node.lat - lat).abs() < 1e-7, "{:?}", node);
            assert!((node.lon - lon).abs() < 1e-7, "{:?}", node);
        }
    }

    #[test]
    fn built_blocks_round_trip_their_granularity() {
        let block = BlockBuilder::new().node(1, 10.0, 20.0).build();
        assert_eq!(block.granularity, 100);

        let bytes = encode(&block);
        let parsed = OsmBlock::parse(&bytes).unwrap();
        assert_eq!(parsed.block.granularity, 100);
        let node = parsed.nodes().next().unwrap();
        assert!((node.lat - 20.0).abs() < 1e-7 && (node.lon - 10.0).abs() < 1e-7);
    }

    #[test]
    fn offsets_and_granularity_apply() {
        let block = crate::PrimitiveBlock {
            stringtable: StringTable { s: vec![Cow::Borrowed(&b""[..])] },
            primitivegroup: vec![PrimitiveGroup {
                dense: Some(DenseNodes {
                    id: vec![3],
                    lat: vec![2],
                    lon: vec![-1],
                    ..Default::default()
                }),
                ..Default::default()
            }],
            granularity: 1000,
            lat_offset: 5_000_000_000,
            lon_offset: 1_000,
            ..Default::default()
        };
        let bytes = encode(&block);
        let parsed = OsmBlock::parse(&bytes).unwrap();
        let node = parsed.nodes().next().unwrap();
        assert_eq!(node.id, 3);
        assert!((node.lat - 5.000002).abs() < 1e-12);
        assert!((node.lon - 0.0).abs() < 1e-12);
    }

    #[test]
    fn ways_expose_tags_and_absolute_refs() {
        let bytes = encode(
            &BlockBuilder::new()
                .way(10, &[("highway", "residential"), ("name", "Main")], &[1, 2, 3])
                .way(11, &[("landuse", "forest")], &[3, 2])
                .build(),
        );
        let block = OsmBlock::parse(&bytes).unwrap();
        let highway = block.string_ids("highway");
        assert_eq!(highway.len(), 1);

        let ways: Vec<WayRef<'_>> = block.ways().collect();
        assert_eq!(ways.len(), 2);
        assert_eq!(ways[0].id(), 10);
        assert_eq!(ways[0].node_ids(), vec![1, 2, 3]);
        assert_eq!(ways[1].node_ids(), vec![3, 2]);

        let (k, v) = ways[0].tags().next().unwrap();
        assert_eq!(k, highway[0]);
        assert_eq!(block.string(v).unwrap(), b"residential");
    }

    #[test]
    fn unknown_key_has_no_ids() {
        let bytes = encode(&BlockBuilder::new().way(1, &[("a", "b")], &[1]).build());
        let block = OsmBlock::parse(&bytes).unwrap();
        assert!(block.string_ids("highway").is_empty());
    }

    #[test]
    fn out_of_range_string_index_is_an_error() {
        let bytes = encode(&BlockBuilder::new().build());
        let block = OsmBlock::parse(&bytes).unwrap();
        assert!(matches!(
            block.string(42),
            Err(Error::StringIndex { index: 42, len: 1 })
        ));
    }

    #[test]
    fn mismatched_dense_arrays_are_rejected() {
        let block = crate::PrimitiveBlock {
            stringtable: StringTable::default(),
            primitivegroup: vec![PrimitiveGroup {
                dense: Some(DenseNodes {
                    id: vec![1, 1],
                    lat: vec![0],
                    lon: vec![0, 0],
                    ..Default::default()
                }),
                ..Default::default()
            }],
            ..Default::default()
        };
        let bytes = encode(&block);
        assert!(matches!(
            OsmBlock::parse(&bytes),
            Err(Error::MalformedBlock(_))
        ));
    }
}

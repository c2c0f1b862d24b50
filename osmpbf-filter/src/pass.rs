//! The two filtering passes run on top of [`WorkerPool`].

use std::io::{self, Read, Seek};
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::Sender;
use log::info;

use crate::element::OsmBlock;
use crate::error::{Error, Result};
use crate::output::{NodeRow, WayRow};
use crate::ownership::{EXPECTED_WAYS, NodeOwnership, OwnershipCollector};
use crate::parser::BlobDecoder;
use crate::pipeline::WorkerPool;
use crate::reader::{BlobKind, BlobReader, RawBlob};

/// Result of [`filter_ways`].
#[derive(Debug)]
pub struct WayPass {
    /// Node ids of every emitted way.
    pub ownership: NodeOwnership,
    pub matched_ways: u64,
    pub blobs: usize,
}

/// Result of [`filter_nodes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodePass {
    pub matched_nodes: u64,
    pub blobs: usize,
}

fn sink_closed() -> Error {
    Error::WriteOutput(io::Error::new(
        io::ErrorKind::BrokenPipe,
        "row writer stopped",
    ))
}

// The owner only hangs up early if it panicked.
fn record_owned(owners: &Sender<Vec<i64>>, node_ids: Vec<i64>) -> Result<()> {
    owners.send(node_ids).map_err(|_| Error::OwnershipLost)
}

/// Emits one [`WayRow`] per (way, tag) pair whose key is `key` and collects
/// the node ids of those ways.
///
/// A way that lists `key` twice is emitted twice; node order is kept as
/// stored.
pub fn filter_ways<R: Read + Seek + Send>(
    pool: &WorkerPool,
    reader: &mut BlobReader<R>,
    decoder: &BlobDecoder,
    key: &str,
    total_blobs: usize,
    sink: Sender<WayRow>,
) -> Result<WayPass> {
    let collector = OwnershipCollector::spawn(EXPECTED_WAYS);
    let owners = collector.sender();
    let matched = AtomicU64::new(0);

    let handle_blob = |blob: RawBlob| -> Result<()> {
        if blob.kind != BlobKind::OsmData {
            return Ok(());
        }
        let bytes = decoder.decode(&blob)?;
        let block = OsmBlock::parse(&bytes)?;

        let key_ids = block.string_ids(key);
        if key_ids.is_empty() {
            return Ok(());
        }

        for way in block.ways() {
            for (k, v) in way.tags() {
                if !key_ids.contains(&k) {
                    continue;
                }
                let node_ids = way.node_ids();
                let tag_value = String::from_utf8_lossy(block.string(v)?).into_owned();
                record_owned(&owners, node_ids.clone())?;
                sink.send(WayRow {
                    id: way.id(),
                    tag_value,
                    node_ids,
                })
                .map_err(|_| sink_closed())?;
                matched.fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(())
    };

    let counted = pool.run_pass("ways", reader, total_blobs, handle_blob);
    // the handler and its sender clone are gone, this cannot wait forever
    drop(owners);
    let (ownership, ways) = collector.finish();
    let blobs = counted?;

    let matched_ways = matched.into_inner();
    debug_assert_eq!(matched_ways, ways as u64);
    info!(
        matched_ways = matched_ways,
        owned_nodes = ownership.len(),
        blobs = blobs;
        "Way pass finished"
    );
    Ok(WayPass {
        ownership,
        matched_ways,
        blobs,
    })
}

/// Emits one [`NodeRow`] for every node whose id is in `ownership`.
/// Ids without a node in the file are silently absent from the output.
pub fn filter_nodes<R: Read + Seek + Send>(
    pool: &WorkerPool,
    reader: &mut BlobReader<R>,
    decoder: &BlobDecoder,
    ownership: &NodeOwnership,
    total_blobs: usize,
    sink: Sender<NodeRow>,
) -> Result<NodePass> {
    let matched = AtomicU64::new(0);

    let handle_blob = |blob: RawBlob| -> Result<()> {
        if blob.kind != BlobKind::OsmData || ownership.is_empty() {
            return Ok(());
        }
        let bytes = decoder.decode(&blob)?;
        let block = OsmBlock::parse(&bytes)?;

        for node in block.nodes().filter(|n| ownership.contains(n.id)) {
            sink.send(NodeRow {
                id: node.id,
                lat: node.lat,
                lon: node.lon,
            })
            .map_err(|_| sink_closed())?;
            matched.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    };

    let blobs = pool.run_pass("nodes", reader, total_blobs, handle_blob)?;
    let matched_nodes = matched.into_inner();
    info!(matched_nodes = matched_nodes, blobs = blobs; "Node pass finished");
    Ok(NodePass {
        matched_nodes,
        blobs,
    })
}

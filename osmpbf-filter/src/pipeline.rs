use std::fs::File;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crossbeam_channel::{bounded, unbounded};
use log::info;

use crate::cache::BlobCache;
use crate::error::{Error, Result};
use crate::header::validate_capabilities;
use crate::output::RowWriter;
use crate::parser::BlobDecoder;
use crate::pass::{filter_nodes, filter_ways};
use crate::reader::{BlobReader, RawBlob};

/// Progress is logged every this many completed blobs.
pub const PROGRESS_EVERY: usize = 500;

/// Default number of decode workers: two per thread rayon would use.
pub fn default_workers() -> usize {
    rayon::current_num_threads() * 2
}

/// Everything a run needs to know.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterConfig {
    pub input: PathBuf,
    /// Ways are kept when one of their tags has this key.
    pub tag: String,
    /// Cache decompressed blobs so the node pass skips inflating them again.
    pub high_memory: bool,
    pub ways_output: PathBuf,
    pub nodes_output: PathBuf,
    pub workers: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("input.pbf.osm"),
            tag: "highway".to_owned(),
            high_memory: false,
            ways_output: PathBuf::from("ways.csv"),
            nodes_output: PathBuf::from("nodes.csv"),
            workers: default_workers(),
        }
    }
}

/// Counts reported by a finished run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub blobs: usize,
    pub way_rows: u64,
    pub owned_nodes: usize,
    pub node_rows: u64,
}

/// A fixed pool of decode workers fed from one shared blob intake.
///
/// Every pass follows the same shape: one reader thread walks the frames and
/// pushes each blob once into a bounded channel, `workers` tasks pull from it,
/// and every worker reports one completion event per blob whatever the
/// outcome. The pass is over when the number of events reaches the total from
/// the pre-scan.
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    workers: usize,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Result<Self> {
        let workers = workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("osmpbf-worker-{}", i))
            .build()?;
        Ok(Self { pool, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Runs `handler` once for each of the `total` blobs read from `reader`.
    ///
    /// Returns the number of completion events counted, which equals `total`
    /// on success. The first handler or framing error ends the pass.
    pub fn run_pass<R, F>(
        &self,
        pass: &'static str,
        reader: &mut BlobReader<R>,
        total: usize,
        handler: F,
    ) -> Result<usize>
    where
        R: Read + Seek + Send,
        F: Fn(RawBlob) -> Result<()> + Sync,
    {
        let (blob_tx, blob_rx) = bounded::<RawBlob>(self.workers);
        let (event_tx, event_rx) = unbounded::<Result<()>>();
        let handler = &handler;

        std::thread::scope(|s| {
            let reader_events = event_tx.clone();
            s.spawn(move || {
                loop {
                    match reader.next_blob() {
                        Ok(Some(blob)) => {
                            if blob_tx.send(blob).is_err() {
                                break;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            let _ = reader_events.send(Err(e));
                            break;
                        }
                    }
                }
            });

            self.pool.in_place_scope(|scope| {
                for _ in 0..self.workers {
                    let blob_rx = blob_rx.clone();
                    let event_tx = event_tx.clone();
                    scope.spawn(move |_| {
                        for blob in blob_rx {
                            if event_tx.send(handler(blob)).is_err() {
                                // coordinator gave up, stop pulling
                                break;
                            }
                        }
                    });
                }
                drop(event_tx);
                drop(blob_rx);

                let counted = count_completions(pass, total, &event_rx);
                // unblocks every worker and the reader if the pass failed
                drop(event_rx);
                counted
            })
        })
    }
}

fn count_completions(
    pass: &'static str,
    total: usize,
    events: &crossbeam_channel::Receiver<Result<()>>,
) -> Result<usize> {
    let mut completed = 0;
    while completed < total {
        match events.recv() {
            Ok(Ok(())) => {
                completed += 1;
                if completed % PROGRESS_EVERY == 0 {
                    info!(
                        pass = pass,
                        completed = completed,
                        remaining = total - completed;
                        "progress"
                    );
                }
            }
            Ok(Err(e)) => return Err(e),
            // every worker and the reader are gone but blobs are missing
            Err(_) => return Err(Error::Stalled { completed, total }),
        }
    }
    Ok(completed)
}

/// The three pass run over one input file.
pub struct Pipeline {
    config: FilterConfig,
}

impl Pipeline {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Counts blobs, validates the header, then writes matched ways and
    /// their nodes to the configured CSV files.
    pub fn run(&self) -> Result<RunSummary> {
        let config = &self.config;
        let mut reader = BlobReader::from_path(&config.input)?;

        let blobs = reader.count_blobs()?;
        info!(blobs = blobs; "Counted blobs");

        let cache = config
            .high_memory
            .then(|| Arc::new(BlobCache::with_capacity(blobs)));
        let decoder = BlobDecoder::new(cache);

        info!("Pass 1/3: validating OSM header");
        reader.rewind()?;
        validate_capabilities(&mut reader, &decoder)?;

        let pool = WorkerPool::new(config.workers)?;

        info!(tag = config.tag.as_str(), workers = pool.workers(); "Pass 2/3: finding matching ways");
        let ways = RowWriter::spawn(create_output(&config.ways_output)?);
        reader.rewind()?;
        let way_pass = filter_ways(&pool, &mut reader, &decoder, &config.tag, blobs, ways.sender());
        let way_rows = ways.finish()?;
        let way_pass = way_pass?;
        info!(
            way_rows = way_rows,
            owned_nodes = way_pass.ownership.len();
            "Pass 2/3 complete"
        );

        info!("Pass 3/3: finding referenced nodes");
        let nodes = RowWriter::spawn(create_output(&config.nodes_output)?);
        reader.rewind()?;
        let ownership = way_pass.ownership;
        let node_pass = filter_nodes(&pool, &mut reader, &decoder, &ownership, blobs, nodes.sender());
        let node_rows = nodes.finish()?;
        node_pass?;
        info!(node_rows = node_rows; "Pass 3/3 complete");

        Ok(RunSummary {
            blobs,
            way_rows,
            owned_nodes: ownership.len(),
            node_rows,
        })
    }
}

fn create_output(path: &Path) -> Result<File> {
    File::create(path).map_err(|source| Error::CreateOutput {
        path: path.to_path_buf(),
        source,
    })
}

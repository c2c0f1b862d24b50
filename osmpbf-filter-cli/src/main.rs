use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use log::{error, info};
use structured_logger::Builder;
use structured_logger::json::new_writer;

use osmpbf_filter::{FilterConfig, Pipeline, default_workers};

/// Extract tagged ways and their nodes from an .osm.pbf file into CSV.
#[derive(Parser, Debug, Clone)]
#[command(name = "osmpbf-filter", version)]
struct Args {
    /// Input .osm.pbf file
    #[arg(short, long, default_value = "input.pbf.osm")]
    input: PathBuf,

    /// Keep ways with a tag of this key
    #[arg(short, long, default_value = "highway")]
    tag: String,

    /// Cache decompressed blobs between the way and node passes
    #[arg(long, default_value_t = false)]
    high_memory: bool,

    #[arg(long, default_value = "ways.csv")]
    ways_output: PathBuf,

    #[arg(long, default_value = "nodes.csv")]
    nodes_output: PathBuf,

    /// Decode workers; defaults to twice the available parallelism
    #[arg(short = 'j', long)]
    workers: Option<usize>,

    #[arg(long, default_value = "info")]
    log_level: String,
}

impl From<Args> for FilterConfig {
    fn from(args: Args) -> Self {
        FilterConfig {
            input: args.input,
            tag: args.tag,
            high_memory: args.high_memory,
            ways_output: args.ways_output,
            nodes_output: args.nodes_output,
            workers: args.workers.unwrap_or_else(default_workers),
        }
    }
}

fn setup_logging(level: &str) {
    // stdout is left alone so the tool can sit in a shell pipeline
    Builder::with_level(level)
        .with_target_writer("*", new_writer(io::stderr()))
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    setup_logging(&args.log_level);

    let config = FilterConfig::from(args);
    info!(
        input = config.input.display().to_string().as_str(),
        tag = config.tag.as_str(),
        high_memory = config.high_memory,
        workers = config.workers;
        "Starting"
    );

    let started = Instant::now();
    match Pipeline::new(config).run() {
        Ok(summary) => {
            info!(
                blobs = summary.blobs,
                way_rows = summary.way_rows,
                owned_nodes = summary.owned_nodes,
                node_rows = summary.node_rows,
                elapsed_ms = started.elapsed().as_millis() as u64;
                "Done"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(exit_code = err.exit_code(); "{}", err);
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

use std::io::{self, BufWriter, Write};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Sender, bounded};

use crate::error::{Error, Result};

/// Rows are flushed to the underlying writer every this many rows.
pub const FLUSH_EVERY: u64 = 1_000;
const MAX_Q_ROWS: usize = 10_000;

/// A result row that knows how to print itself as one CSV line.
pub trait CsvRow: Send + 'static {
    fn write_csv<W: Write>(&self, out: &mut W) -> io::Result<()>;
}

/// A way whose tags contain the filter key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct WayRow {
    pub id: i64,
    pub tag_value: String,
    /// Node ids in way order.
    pub node_ids: Vec<i64>,
}

impl CsvRow for WayRow {
    fn write_csv<W: Write>(&self, out: &mut W) -> io::Result<()> {
        write!(out, "{},", self.id)?;
        write_field(out, &self.tag_value)?;
        for id in &self.node_ids {
            write!(out, ",{}", id)?;
        }
        out.write_all(b"\n")
    }
}

/// A node referenced by a matched way.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodeRow {
    pub id: i64,
    pub lat: f64,
    pub lon: f64,
}

impl CsvRow for NodeRow {
    fn write_csv<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "{},{:.6},{:.6}", self.id, self.lat, self.lon)
    }
}

// Tag values are free text; quote them when they would break the columns.
fn write_field<W: Write>(out: &mut W, value: &str) -> io::Result<()> {
    if value.contains([',', '"', '\n', '\r']) {
        write!(out, "\"{}\"", value.replace('"', "\"\""))
    } else {
        out.write_all(value.as_bytes())
    }
}

/// Writer thread draining rows from a channel into a buffered output.
pub struct RowWriter<T> {
    tx: Sender<T>,
    handle: JoinHandle<Result<u64>>,
}

impl<T: CsvRow> RowWriter<T> {
    pub fn spawn<W: Write + Send + 'static>(out: W) -> Self {
        let (tx, rx) = bounded::<T>(MAX_Q_ROWS);
        let handle = thread::spawn(move || {
            let mut out = BufWriter::new(out);
            let mut rows = 0u64;
            for row in rx {
                row.write_csv(&mut out).map_err(Error::WriteOutput)?;
                rows += 1;
                if rows % FLUSH_EVERY == 0 {
                    out.flush().map_err(Error::WriteOutput)?;
                }
            }
            out.flush().map_err(Error::WriteOutput)?;
            Ok(rows)
        });
        Self { tx, handle }
    }

    pub fn sender(&self) -> Sender<T> {
        self.tx.clone()
    }

    /// Waits for every sender to be dropped, flushes and returns the row count.
    pub fn finish(self) -> Result<u64> {
        drop(self.tx);
        match self.handle.join() {
            Ok(written) => written,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

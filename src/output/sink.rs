//! Record sinks
//!
//! The scheduler's control loop is the only writer, so sinks need no internal
//! locking of their own. Records arrive in page-completion order, not page order.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Destination for extracted records
pub trait RecordSink: Send {
    /// Appends one page's records
    fn write_records(&mut self, page: u32, records: &[String]) -> std::io::Result<()>;

    /// Flushes anything still buffered at the end of a run
    fn finish(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Writes one record per line to a file
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl FileSink {
    /// Creates the output file, truncating any previous content
    pub fn create(path: &Path) -> std::io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    /// Path of the output file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSink for FileSink {
    fn write_records(&mut self, _page: u32, records: &[String]) -> std::io::Result<()> {
        for record in records {
            writeln!(self.writer, "{}", record)?;
        }
        // Flush per page so an interrupted run keeps everything it reported
        self.writer.flush()
    }

    fn finish(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

/// Keeps records in memory; clones share the same buffer
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<(u32, String)>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records written so far, in arrival order
    pub fn records(&self) -> Vec<String> {
        self.entries().into_iter().map(|(_, record)| record).collect()
    }

    /// All records written so far, tagged with their page
    pub fn entries(&self) -> Vec<(u32, String)> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Distinct pages that produced records
    pub fn pages(&self) -> Vec<u32> {
        let mut pages: Vec<u32> = self.entries().into_iter().map(|(page, _)| page).collect();
        pages.sort_unstable();
        pages.dedup();
        pages
    }
}

impl RecordSink for MemorySink {
    fn write_records(&mut self, page: u32, records: &[String]) -> std::io::Result<()> {
        let mut guard = match self.records.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.extend(records.iter().map(|record| (page, record.clone())));
        Ok(())
    }
}

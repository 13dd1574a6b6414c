//! Output module for extracted records and run reports
//!
//! This module handles:
//! - Writing extracted records to the output sink
//! - Summarizing a finished run
//! - Printing actionable messages for run-ending failures

mod sink;
mod summary;

pub use sink::{FileSink, MemorySink, RecordSink};
pub use summary::{print_failure, print_summary, rate_limit_advice, RunSummary};

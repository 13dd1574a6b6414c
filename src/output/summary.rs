//! Run summaries and operator-facing messages

use crate::PipelineError;
use chrono::{DateTime, Utc};

/// Totals for one finished run
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Records written to the sink
    pub total_records: usize,

    /// Fetch attempts handed to workers (retries included)
    pub pages_dispatched: u64,

    /// Pages that produced records
    pub pages_completed: u64,

    /// Empty pages observed
    pub pages_empty: u64,

    /// Pages given up on, in the order they were abandoned
    pub pages_abandoned: Vec<u32>,

    /// Successful credential renewals
    pub renewals: u32,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    /// Wall-clock duration of the run in seconds
    pub fn duration_seconds(&self) -> i64 {
        (self.finished_at - self.started_at).num_seconds()
    }
}

/// Prints the end-of-run summary to stdout
pub fn print_summary(summary: &RunSummary) {
    println!();
    println!("Pages fetched: {}", summary.pages_completed);
    println!("Fetch attempts: {}", summary.pages_dispatched);
    if summary.renewals > 0 {
        println!("Session renewals: {}", summary.renewals);
    }
    if !summary.pages_abandoned.is_empty() {
        println!(
            "Pages skipped after retries ({}): {:?}",
            summary.pages_abandoned.len(),
            summary.pages_abandoned
        );
    }
    println!("Elapsed: {}s", summary.duration_seconds());
    println!("Scraping complete! Total domains: {}", summary.total_records);
}

/// Returns the advice shown when the source rate-limits this IP
pub fn rate_limit_advice(workers: u32) -> Vec<String> {
    let mut advice = vec![
        "1. Use a proxy or VPN to change your IP address".to_string(),
        "2. If using mobile internet, turn airplane mode on/off to get a new IP".to_string(),
        "3. Wait some time before trying again".to_string(),
        "4. Try reducing the scraping speed or page count".to_string(),
    ];
    if workers > 1 {
        advice.push("5. Reduce the number of workers with --workers flag".to_string());
    }
    advice
}

/// Prints an actionable message for a run-ending failure
pub fn print_failure(error: &PipelineError, workers: u32) {
    eprintln!("Error during scraping: {}", error);

    match error {
        PipelineError::RateLimited { .. } => {
            eprintln!("IP address has been rate limited. Please:");
            for line in rate_limit_advice(workers) {
                eprintln!("{}", line);
            }
        }
        PipelineError::RenewalFailed { .. } => {
            eprintln!("Please restart the program and try again.");
        }
        PipelineError::SinkUnavailable(_) | PipelineError::SinkWrite { .. } => {
            eprintln!("Check that the output path is writable.");
        }
    }

    let written = error.records_written();
    if written > 0 {
        eprintln!("{} domains were saved before the run stopped.", written);
    }
}

use std::collections::{HashMap, HashSet};

/// Aggregate bookkeeping for one scrape run
///
/// Only the scheduler's control loop touches this structure. Workers never see
/// it, so no lock guards it.
#[derive(Debug, Clone, Default)]
pub struct RunState {
    /// Number of fetch attempts handed to workers (retries included)
    pub pages_dispatched: u64,

    /// Number of pages that produced records
    pub pages_completed: u64,

    /// Number of empty pages observed
    pub pages_empty: u64,

    /// Total records written to the sink
    pub total_records: usize,

    /// Successful credential renewals
    pub renewals: u32,

    /// Pages given up on after exhausting their retries
    pub abandoned: Vec<u32>,

    /// Requeue count per page
    retry_counts: HashMap<u32, u32>,

    /// Pages dispatched and not yet resulted
    in_flight: HashSet<u32>,
}

impl RunState {
    /// Creates an empty run state
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that a page was handed to a worker
    ///
    /// Returns false (and records nothing) if the page is already in flight.
    pub fn mark_dispatched(&mut self, page: u32) -> bool {
        if !self.in_flight.insert(page) {
            return false;
        }
        self.pages_dispatched += 1;
        true
    }

    /// Records that a worker returned a result for a page
    pub fn mark_resulted(&mut self, page: u32) {
        self.in_flight.remove(&page);
    }

    /// Returns the number of pages currently held by workers
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Adds a successful page's records and returns the running total
    pub fn record_success(&mut self, records: usize) -> usize {
        self.pages_completed += 1;
        self.total_records += records;
        self.total_records
    }

    /// Records an empty page
    pub fn record_empty(&mut self) {
        self.pages_empty += 1;
    }

    /// Bumps a page's requeue count and returns the new value
    pub fn record_retry(&mut self, page: u32) -> u32 {
        let count = self.retry_counts.entry(page).or_insert(0);
        *count += 1;
        *count
    }

    /// Returns how many times a page has been requeued
    pub fn retries_for(&self, page: u32) -> u32 {
        self.retry_counts.get(&page).copied().unwrap_or(0)
    }

    /// Records that a page was given up on
    pub fn abandon(&mut self, page: u32) {
        self.abandoned.push(page);
    }
}

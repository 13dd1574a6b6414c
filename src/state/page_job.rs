/// Page job and fetch outcome definitions
///
/// This module defines the unit of work handed to workers and the classified
/// result they hand back.
use std::fmt;

/// A single page waiting to be fetched
///
/// The retry counter starts at 0 and is bumped every time the page is requeued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageJob {
    /// Page index (1-based)
    pub page: u32,

    /// How many times this page has been requeued
    pub retry: u32,
}

impl PageJob {
    /// Creates a fresh job for a page that has never been attempted
    pub fn new(page: u32) -> Self {
        Self { page, retry: 0 }
    }

    /// Returns the job for the next attempt of the same page
    pub fn retried(self, retry: u32) -> Self {
        debug_assert!(retry > self.retry, "retry counter must increase");
        Self {
            page: self.page,
            retry,
        }
    }
}

/// Classified result of one page fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    // ===== Content =====
    /// The page held at least one record
    Success(Vec<String>),

    /// The page held no records and no failure marker (end of results)
    Empty,

    // ===== Failures =====
    /// The session needs a human-solved challenge before fetching resumes
    SessionExpired,

    /// The source refuses further requests from this IP
    RateLimited,

    /// Network or server hiccup; the page can be retried
    TransientError(String),
}

impl FetchOutcome {
    /// Number of records carried by this outcome
    pub fn record_count(&self) -> usize {
        match self {
            Self::Success(records) => records.len(),
            _ => 0,
        }
    }

    /// Short label used in log lines
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::Empty => "empty",
            Self::SessionExpired => "session_expired",
            Self::RateLimited => "rate_limited",
            Self::TransientError(_) => "transient_error",
        }
    }
}

impl fmt::Display for FetchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(records) => write!(f, "{} records", records.len()),
            Self::TransientError(detail) => write!(f, "transient error: {}", detail),
            other => write!(f, "{}", other.label()),
        }
    }
}

/// A fetch outcome tagged with the job that produced it
#[derive(Debug, Clone)]
pub struct PageResult {
    /// The job as it was dispatched
    pub job: PageJob,

    /// What the fetch returned
    pub outcome: FetchOutcome,

    /// Which worker ran the fetch
    pub worker_id: usize,

    /// Generation of the session the fetch used
    pub credentials_generation: u32,
}

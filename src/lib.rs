//! Domain-Trawler: an adaptive paginated listing scraper
//!
//! This crate walks a paginated remote listing with a bounded pool of workers,
//! writes every extracted record to an output file, and survives the source's
//! anti-automation defenses: expired sessions are renewed through a captcha
//! challenge while the pipeline pauses, and IP rate limiting ends the run cleanly.

pub mod config;
pub mod crawler;
pub mod output;
pub mod state;

use thiserror::Error;

/// Main error type for Domain-Trawler operations
#[derive(Debug, Error)]
pub enum TrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Run-ending failures of the page-fetch pipeline
///
/// Page-local failures (expired sessions, transient errors) are resolved inside
/// the scheduler and never surface here unless they escalate.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("IP rate limit hit on page {page} after {records} records")]
    RateLimited { page: u32, records: usize },

    #[error("Credential renewal failed after {records} records: {reason}")]
    RenewalFailed { reason: String, records: usize },

    #[error("Output sink unavailable: {0}")]
    SinkUnavailable(std::io::Error),

    #[error("Failed writing records for page {page}: {source}")]
    SinkWrite { page: u32, source: std::io::Error },
}

impl PipelineError {
    /// Number of records already written when the run ended
    pub fn records_written(&self) -> usize {
        match self {
            Self::RateLimited { records, .. } | Self::RenewalFailed { records, .. } => *records,
            Self::SinkUnavailable(_) | Self::SinkWrite { .. } => 0,
        }
    }
}

/// Errors raised while renewing session credentials
#[derive(Debug, Error)]
pub enum RenewalError {
    #[error("HTTP error during renewal: {0}")]
    Http(#[from] reqwest::Error),

    #[error("No captcha image URL or token found")]
    MissingChallenge,

    #[error("No captcha response provided")]
    NoAnswer,

    #[error("Captcha rejected after {attempts} attempts")]
    Rejected { attempts: u32 },

    #[error("Renewal timed out after {0:?}")]
    TimedOut(std::time::Duration),

    #[error("IO error during renewal: {0}")]
    Io(#[from] std::io::Error),

    #[error("Renewal task aborted: {0}")]
    Aborted(String),
}

/// Result type alias for Domain-Trawler operations
pub type Result<T> = std::result::Result<T, TrawlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Coordinator, Scheduler};
pub use output::RunSummary;
pub use state::{Credentials, FetchOutcome, PageJob};

//! State module for tracking scrape progress
//!
//! This module provides the values that flow through the page-fetch pipeline.
//!
//! # Components
//!
//! - `PageJob` / `FetchOutcome`: one page fetch attempt and what came back from it
//! - `Credentials`: the renewable session bundle handed to every fetch
//! - `RunState`: aggregate counters and per-page retry bookkeeping for one run

mod credentials;
mod page_job;
mod run_state;

// Re-export main types
pub use credentials::{default_cookies, Credentials};
pub use page_job::{FetchOutcome, PageJob, PageResult};
pub use run_state::RunState;

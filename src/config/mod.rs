//! Configuration module for Domain-Trawler
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every key has a default, so the scraper also runs without a file.
//!
//! # Example
//!
//! ```no_run
//! use domain_trawler::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("trawler.toml")).unwrap();
//! println!("Scraping with {} workers", config.scrape.workers);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    page_url, Config, FilterConfig, IpFilter, OutputConfig, RangeFilter, RenewalConfig,
    RequestConfig, ScrapeConfig, PAGE_PLACEHOLDER,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, read_config};
pub use validation::{validate, MAX_WORKERS};

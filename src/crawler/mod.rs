//! Crawler module for the page-fetch pipeline
//!
//! This module contains the core pipeline logic, including:
//! - HTTP page fetching and response classification
//! - Credential renewal through the source's captcha
//! - Retry policy, worker pool and job scheduling
//! - Overall run coordination

mod coordinator;
mod fetcher;
mod parser;
mod renewal;
mod retry;
mod scheduler;
mod worker;

pub use coordinator::{run_blocking, run_pipeline, Coordinator};
pub use fetcher::{build_http_client, HttpPageFetcher, PageFetcher};
pub use parser::{
    classify_page, extract_captcha_image, extract_captcha_token, extract_records,
    has_captcha_challenge, RATE_LIMIT_MARKER, SESSION_EXPIRED_MARKER,
};
pub use renewal::{
    CaptchaPrompt, CaptchaRenewer, CredentialRenewer, ScriptedPrompt, TerminalPrompt,
};
pub use retry::{RetryDecision, RetryPolicy};
pub use scheduler::{PipelineSettings, Scheduler};

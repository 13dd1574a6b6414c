//! Integration tests for Domain-Trawler
//!
//! `pipeline_tests` drive the scheduler with in-process stub fetchers and
//! renewers; `http_tests` run the real HTTP fetcher and captcha renewer
//! against wiremock servers.

mod http_tests;
mod pipeline_tests;

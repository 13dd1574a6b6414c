//! Run controller - wires configuration into a pipeline run
//!
//! This module builds the production pieces of a run from a validated
//! configuration:
//! - The HTTP client and page fetcher
//! - The captcha-based credential renewer
//! - The output file sink
//!
//! and hands them to the scheduler together with the initial session.

use crate::config::Config;
use crate::crawler::fetcher::{build_http_client, HttpPageFetcher};
use crate::crawler::renewal::{CaptchaRenewer, TerminalPrompt};
use crate::crawler::scheduler::{PipelineSettings, Scheduler};
use crate::output::{FileSink, RunSummary};
use crate::{ConfigError, PipelineError, TrawlError};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// How long leftover blocking tasks may hold up process exit
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Main run controller
pub struct Coordinator {
    config: Config,
    fetcher: HttpPageFetcher,
    renewer: CaptchaRenewer<TerminalPrompt>,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// # Arguments
    ///
    /// * `config` - A validated configuration
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - HTTP client and renewer are ready
    /// * `Err(TrawlError)` - The client could not be built or the base URL is invalid
    pub fn new(config: Config) -> Result<Self, TrawlError> {
        let client = build_http_client(&config.request)?;

        let fetcher = HttpPageFetcher::new(
            client.clone(),
            config.url_template(),
            &config.request.base_url,
        );

        let renewer = CaptchaRenewer::new(client, &config.request, &config.renewal, TerminalPrompt)
            .map_err(|e| {
                ConfigError::InvalidUrl(format!("{}: {}", config.request.base_url, e))
            })?;

        Ok(Self {
            config,
            fetcher,
            renewer,
        })
    }

    /// Runs the pipeline to completion
    ///
    /// The output file is created (and truncated) before the first request so
    /// an unwritable path fails the run before any traffic is sent.
    pub async fn run(self) -> Result<RunSummary, PipelineError> {
        let sink = FileSink::create(Path::new(&self.config.output.path))
            .map_err(PipelineError::SinkUnavailable)?;
        tracing::info!("Writing domains to {}", sink.path().display());

        for filter in self.config.filter.describe() {
            tracing::info!("Filter {}", filter);
        }

        let settings = PipelineSettings::from_config(&self.config);
        match settings.max_pages {
            0 => tracing::info!(
                "Starting scrape from page {} until no more results",
                settings.start_page
            ),
            pages => tracing::info!(
                "Starting scrape from page {} for {} pages",
                settings.start_page,
                pages
            ),
        }

        let credentials = self.config.initial_credentials();
        Scheduler::new(settings, Arc::new(self.fetcher), Arc::new(self.renewer), sink)
            .run(credentials)
            .await
    }
}

/// Builds a coordinator from `config` and runs it
///
/// # Example
///
/// ```no_run
/// use domain_trawler::config::load_config;
/// use domain_trawler::crawler::run_pipeline;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("trawler.toml"))?;
/// let summary = run_pipeline(config).await?;
/// println!("{} domains", summary.total_records);
/// # Ok(())
/// # }
/// ```
pub async fn run_pipeline(config: Config) -> Result<RunSummary, TrawlError> {
    let coordinator = Coordinator::new(config)?;
    Ok(coordinator.run().await?)
}

/// Drives `future` on a fresh multi-threaded runtime and tears it down
///
/// A timed-out captcha prompt leaves a blocking stdin read behind that never
/// finishes on its own. Dropping a runtime waits for such tasks, so the
/// runtime is shut down with a short grace period instead.
pub fn run_blocking<F: Future>(future: F) -> std::io::Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let output = runtime.block_on(future);
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    Ok(output)
}

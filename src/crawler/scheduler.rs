//! Job scheduler for the page-fetch pipeline
//!
//! This module handles:
//! - Turning the page cursor into jobs for a bounded worker pool
//! - Applying the retry policy to page-local failures
//! - Pausing dispatch while an expired session is renewed, without losing results
//! - Deciding when a run is complete and which error, if any, ends it
//!
//! All run state lives in the control loop. Workers receive a page plus an
//! immutable session snapshot and hand back a tagged outcome; nothing else is
//! shared with them.

use crate::config::Config;
use crate::crawler::fetcher::PageFetcher;
use crate::crawler::renewal::CredentialRenewer;
use crate::crawler::retry::{RetryDecision, RetryPolicy};
use crate::crawler::worker::{run_worker, Dispatch};
use crate::output::{RecordSink, RunSummary};
use crate::state::{Credentials, FetchOutcome, PageJob, PageResult, RunState};
use crate::{PipelineError, RenewalError};
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// Knobs for one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// First page to fetch (1-based)
    pub start_page: u32,

    /// Number of pages to fetch (0 = until an empty page is seen)
    pub max_pages: u32,

    /// Number of concurrent workers
    pub workers: usize,

    /// Delay each worker waits before every request
    pub delay: Duration,

    /// Policy for page-local failures
    pub retry: RetryPolicy,

    /// Upper bound on a single credential renewal
    pub renewal_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            start_page: 1,
            max_pages: 0,
            workers: 3,
            delay: Duration::from_millis(500),
            retry: RetryPolicy::default(),
            renewal_timeout: Duration::from_secs(600),
        }
    }
}

impl PipelineSettings {
    /// Derives pipeline settings from a validated configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            start_page: config.scrape.start_page,
            max_pages: config.scrape.max_pages,
            workers: config.scrape.workers as usize,
            delay: config.scrape.delay(),
            retry: RetryPolicy::new(config.scrape.max_retries, config.scrape.retry_backoff()),
            renewal_timeout: config.renewal.timeout(),
        }
    }
}

/// Why dispatch stopped for good
#[derive(Debug)]
enum Halt {
    RateLimited { page: u32 },
    RenewalFailed { reason: String },
    SinkWrite { page: u32, source: std::io::Error },
}

/// What woke the control loop
enum LoopEvent {
    Result(Option<PageResult>),
    Renewal(Result<Credentials, RenewalError>),
}

type RenewalTask = JoinHandle<Result<Credentials, RenewalError>>;

/// Scheduler drives the worker pool over a page range
///
/// The scheduler coordinates:
/// - Dispatch: at most `workers` pages in flight, each page at most once at a time
/// - Recovery: transient errors are retried with backoff, expired sessions are renewed
/// - Termination: end of results, end of range, or a run-ending failure
pub struct Scheduler<F, R, S> {
    settings: PipelineSettings,
    fetcher: Arc<F>,
    renewer: Arc<R>,
    sink: S,
}

impl<F, R, S> Scheduler<F, R, S>
where
    F: PageFetcher,
    R: CredentialRenewer,
    S: RecordSink,
{
    /// Creates a new scheduler
    ///
    /// # Arguments
    ///
    /// * `settings` - Page range, pool size, delays and retry policy
    /// * `fetcher` - Performs single page fetches
    /// * `renewer` - Replaces expired sessions
    /// * `sink` - Receives extracted records
    pub fn new(settings: PipelineSettings, fetcher: Arc<F>, renewer: Arc<R>, sink: S) -> Self {
        Self {
            settings,
            fetcher,
            renewer,
            sink,
        }
    }

    /// Runs the pipeline to completion
    ///
    /// # Returns
    ///
    /// * `Ok(RunSummary)` - The range was exhausted or the end of results was reached
    /// * `Err(PipelineError)` - The source rate-limited us, renewal failed, or the sink broke
    pub async fn run(self, credentials: Credentials) -> Result<RunSummary, PipelineError> {
        let started_at = Utc::now();
        let workers = self.settings.workers.max(1);
        let capacity = workers * 2;

        let (jobs_tx, jobs_rx) = mpsc::channel::<Dispatch>(capacity);
        let (results_tx, mut results_rx) = mpsc::channel::<PageResult>(capacity);
        let jobs_rx = Arc::new(Mutex::new(jobs_rx));

        let handles: Vec<JoinHandle<()>> = (1..=workers)
            .map(|id| {
                tokio::spawn(run_worker(
                    id,
                    Arc::clone(&self.fetcher),
                    self.settings.delay,
                    Arc::clone(&jobs_rx),
                    results_tx.clone(),
                ))
            })
            .collect();
        drop(results_tx);

        if workers == 1 {
            tracing::info!("Using sequential scraping (single worker)");
        } else {
            tracing::info!(
                "Started {} concurrent workers with {}ms delay between requests",
                workers,
                self.settings.delay.as_millis()
            );
        }

        let mut control = ControlLoop::new(
            self.settings,
            workers,
            self.renewer,
            self.sink,
            Arc::new(credentials),
            jobs_tx,
        );

        control.top_up();

        loop {
            if control.is_finished() {
                break;
            }

            let renewing = control.renewal.is_some();
            let event = tokio::select! {
                result = results_rx.recv() => LoopEvent::Result(result),
                renewed = await_renewal(&mut control.renewal), if renewing => {
                    LoopEvent::Renewal(renewed)
                }
            };

            match event {
                LoopEvent::Result(Some(result)) => control.handle_result(result),
                LoopEvent::Result(None) => {
                    tracing::error!(
                        "All workers exited with {} pages still in flight",
                        control.state.in_flight_count()
                    );
                    break;
                }
                LoopEvent::Renewal(outcome) => {
                    control.renewal = None;
                    control.handle_renewal(outcome);
                }
            }

            control.top_up();
        }

        // Closing the job queue is the only stop signal workers get
        control.jobs_tx = None;
        if let Some(task) = control.renewal.take() {
            task.abort();
        }
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!("Worker task ended abnormally: {}", e);
            }
        }

        control.finish(started_at)
    }
}

/// Waits for the outstanding renewal, or forever if there is none
async fn await_renewal(task: &mut Option<RenewalTask>) -> Result<Credentials, RenewalError> {
    match task {
        Some(handle) => match handle.await {
            Ok(outcome) => outcome,
            Err(e) => Err(RenewalError::Aborted(e.to_string())),
        },
        None => std::future::pending().await,
    }
}

/// State owned by the scheduler's control loop
struct ControlLoop<R, S> {
    settings: PipelineSettings,
    workers: usize,
    renewer: Arc<R>,
    sink: S,
    state: RunState,

    /// Session handed to newly dispatched jobs
    credentials: Arc<Credentials>,

    /// None once the queue has been closed
    jobs_tx: Option<mpsc::Sender<Dispatch>>,

    /// Next never-dispatched page
    cursor: u32,

    /// One past the last page of a bounded run
    end: Option<u32>,

    /// Requeued jobs waiting for a dispatch slot, with their backoff
    ready: VecDeque<(PageJob, Duration)>,

    /// Expired pages waiting for the outstanding renewal
    awaiting_renewal: Vec<PageJob>,

    renewal: Option<RenewalTask>,

    /// Set by an empty page; retries still owed are dispatched
    no_more_pages: bool,

    /// Set by a run-ending failure; nothing more is dispatched
    halt: Option<Halt>,
}

impl<R, S> ControlLoop<R, S>
where
    R: CredentialRenewer,
    S: RecordSink,
{
    fn new(
        settings: PipelineSettings,
        workers: usize,
        renewer: Arc<R>,
        sink: S,
        credentials: Arc<Credentials>,
        jobs_tx: mpsc::Sender<Dispatch>,
    ) -> Self {
        let cursor = settings.start_page.max(1);
        let end = match settings.max_pages {
            0 => None,
            pages => Some(cursor.saturating_add(pages)),
        };

        Self {
            settings,
            workers,
            renewer,
            sink,
            state: RunState::new(),
            credentials,
            jobs_tx: Some(jobs_tx),
            cursor,
            end,
            ready: VecDeque::new(),
            awaiting_renewal: Vec::new(),
            renewal: None,
            no_more_pages: false,
            halt: None,
        }
    }

    fn range_exhausted(&self) -> bool {
        self.end.is_some_and(|end| self.cursor >= end)
    }

    /// Returns true once nothing is in flight and nothing more will be dispatched
    fn is_finished(&self) -> bool {
        if self.state.in_flight_count() > 0 {
            return false;
        }
        if self.halt.is_some() {
            return true;
        }
        if self.renewal.is_some() {
            return false;
        }
        self.ready.is_empty() && (self.no_more_pages || self.range_exhausted())
    }

    /// Fills free worker slots with requeued pages first, then new pages
    fn top_up(&mut self) {
        if self.halt.is_some() || self.renewal.is_some() {
            return;
        }

        while self.state.in_flight_count() < self.workers {
            let (job, backoff) = if let Some(next) = self.ready.pop_front() {
                next
            } else if !self.no_more_pages && !self.range_exhausted() {
                let job = PageJob::new(self.cursor);
                match self.cursor.checked_add(1) {
                    Some(next) => self.cursor = next,
                    None => self.no_more_pages = true,
                }
                (job, Duration::ZERO)
            } else {
                break;
            };

            if !self.dispatch(job, backoff) {
                break;
            }
        }
    }

    /// Hands one job to the pool with the current session snapshot
    fn dispatch(&mut self, job: PageJob, backoff: Duration) -> bool {
        if !self.state.mark_dispatched(job.page) {
            tracing::warn!("Page {} is already in flight, holding it back", job.page);
            self.ready.push_back((job, backoff));
            return false;
        }

        let Some(jobs_tx) = &self.jobs_tx else {
            self.state.mark_resulted(job.page);
            return false;
        };

        let dispatch = Dispatch {
            job,
            credentials: Arc::clone(&self.credentials),
            backoff,
        };

        // In-flight jobs never exceed the worker count, so the queue has room
        if let Err(e) = jobs_tx.try_send(dispatch) {
            tracing::error!("Could not dispatch page {}: {}", job.page, e);
            self.state.mark_resulted(job.page);
            self.state.abandon(job.page);
            return false;
        }

        tracing::debug!("Dispatched page {} (retry {})", job.page, job.retry);
        true
    }

    fn handle_result(&mut self, result: PageResult) {
        let PageResult {
            job,
            outcome,
            worker_id,
            credentials_generation,
        } = result;
        let page = job.page;
        self.state.mark_resulted(page);

        tracing::trace!("Worker {} returned page {}: {}", worker_id, page, outcome.label());

        match outcome {
            FetchOutcome::Success(records) => {
                if let Err(source) = self.sink.write_records(page, &records) {
                    tracing::error!("Failed writing records for page {}: {}", page, source);
                    self.halt(Halt::SinkWrite { page, source });
                    return;
                }
                let total = self.state.record_success(records.len());
                tracing::info!(
                    "Page {}: Found {} domains (Total: {})",
                    page,
                    records.len(),
                    total
                );
            }

            FetchOutcome::Empty => {
                self.state.record_empty();
                if !self.no_more_pages {
                    tracing::info!("Page {}: No domains found, assuming end of results", page);
                }
                self.no_more_pages = true;
            }

            FetchOutcome::SessionExpired => {
                self.handle_session_expired(job, credentials_generation);
            }

            FetchOutcome::RateLimited => {
                tracing::error!("Page {}: IP address has been rate limited", page);
                self.halt(Halt::RateLimited { page });
            }

            FetchOutcome::TransientError(detail) => {
                tracing::warn!("Page {}: {}", page, detail);
                self.requeue(job, true);
            }
        }
    }

    fn handle_session_expired(&mut self, job: PageJob, generation: u32) {
        if self.halt.is_some() {
            self.state.abandon(job.page);
            return;
        }

        // Fetched with a session that has already been replaced
        if generation < self.credentials.generation {
            tracing::debug!(
                "Page {} used a stale session (generation {}), retrying with the current one",
                job.page,
                generation
            );
            self.requeue(job, false);
            return;
        }

        self.awaiting_renewal.push(job);

        if self.renewal.is_some() {
            tracing::debug!("Page {} is waiting on the renewal in progress", job.page);
            return;
        }

        tracing::info!(
            "Page {}: Cookies have expired. Attempting to solve captcha...",
            job.page
        );
        self.renewal = Some(self.spawn_renewal());
    }

    /// Starts a renewal in the background so results keep draining meanwhile
    fn spawn_renewal(&self) -> RenewalTask {
        let renewer = Arc::clone(&self.renewer);
        let current = Arc::clone(&self.credentials);
        let timeout = self.settings.renewal_timeout;

        tokio::spawn(async move {
            match tokio::time::timeout(timeout, renewer.renew(&current)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(RenewalError::TimedOut(timeout)),
            }
        })
    }

    fn handle_renewal(&mut self, outcome: Result<Credentials, RenewalError>) {
        let waiting = std::mem::take(&mut self.awaiting_renewal);

        match outcome {
            Ok(credentials) => {
                self.state.renewals += 1;
                tracing::info!(
                    "Retrying with fresh cookies (session generation {})",
                    credentials.generation
                );
                self.credentials = Arc::new(credentials);
                for job in waiting {
                    self.requeue(job, false);
                }
            }
            Err(e) => {
                tracing::error!("Failed to solve captcha: {}", e);
                for job in waiting {
                    self.state.abandon(job.page);
                }
                self.halt(Halt::RenewalFailed {
                    reason: e.to_string(),
                });
            }
        }
    }

    /// Applies the retry policy to a failed page
    fn requeue(&mut self, job: PageJob, with_backoff: bool) {
        let page = job.page;

        if self.halt.is_some() {
            self.state.abandon(page);
            return;
        }

        let max = self.settings.retry.max_retries();
        match self.settings.retry.decide(page, self.state.retries_for(page)) {
            RetryDecision::Requeue { retry, delay } => {
                self.state.record_retry(page);
                let backoff = if with_backoff { delay } else { Duration::ZERO };
                tracing::warn!("Retrying page {} (attempt {}/{})", page, retry, max);
                self.ready.push_back((job.retried(retry), backoff));
            }
            RetryDecision::GiveUp => {
                tracing::warn!("Giving up on page {} after {} retries", page, max);
                self.state.abandon(page);
            }
        }
    }

    /// Stops all further dispatch; the first halt reason wins
    fn halt(&mut self, reason: Halt) {
        if self.halt.is_none() {
            self.halt = Some(reason);
        }
        for (job, _) in std::mem::take(&mut self.ready) {
            self.state.abandon(job.page);
        }
    }

    fn finish(mut self, started_at: chrono::DateTime<Utc>) -> Result<RunSummary, PipelineError> {
        if let Err(e) = self.sink.finish() {
            tracing::warn!("Failed to flush output: {}", e);
        }

        let records = self.state.total_records;
        tracing::info!(
            "Run finished: {} records from {} pages ({} attempts)",
            records,
            self.state.pages_completed,
            self.state.pages_dispatched
        );

        match self.halt {
            None => Ok(RunSummary {
                total_records: records,
                pages_dispatched: self.state.pages_dispatched,
                pages_completed: self.state.pages_completed,
                pages_empty: self.state.pages_empty,
                pages_abandoned: self.state.abandoned,
                renewals: self.state.renewals,
                started_at,
                finished_at: Utc::now(),
            }),
            Some(Halt::RateLimited { page }) => Err(PipelineError::RateLimited { page, records }),
            Some(Halt::RenewalFailed { reason }) => {
                Err(PipelineError::RenewalFailed { reason, records })
            }
            Some(Halt::SinkWrite { page, source }) => {
                Err(PipelineError::SinkWrite { page, source })
            }
        }
    }
}

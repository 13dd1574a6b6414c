//! Fetch workers
//!
//! Each worker repeatedly takes a job from the shared job queue, waits out its
//! backoff and the configured request delay, fetches the page with the session
//! snapshot the job was dispatched with, and publishes the tagged outcome. A
//! worker never touches run state; it exits once the job queue is closed and
//! drained.

use crate::crawler::fetcher::PageFetcher;
use crate::state::{Credentials, PageJob, PageResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// A job as handed to a worker
#[derive(Debug, Clone)]
pub struct Dispatch {
    /// The page and its retry counter
    pub job: PageJob,

    /// Session current at dispatch time
    pub credentials: Arc<Credentials>,

    /// Extra wait before this attempt (transient-error backoff)
    pub backoff: Duration,
}

/// Job queue receiver shared by every worker
pub type SharedJobReceiver = Arc<Mutex<mpsc::Receiver<Dispatch>>>;

/// Runs one worker until the job queue is closed
pub async fn run_worker<F: PageFetcher>(
    id: usize,
    fetcher: Arc<F>,
    delay: Duration,
    jobs: SharedJobReceiver,
    results: mpsc::Sender<PageResult>,
) {
    tracing::debug!("Worker {} started", id);

    loop {
        let next = {
            let mut receiver = jobs.lock().await;
            receiver.recv().await
        };

        let Some(dispatch) = next else {
            break;
        };

        let wait = dispatch.backoff + delay;
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }

        tracing::debug!(
            "Worker {} fetching page {} (attempt {})",
            id,
            dispatch.job.page,
            dispatch.job.retry + 1
        );

        let outcome = fetcher
            .fetch(dispatch.job.page, &dispatch.credentials)
            .await;
        tracing::debug!(
            "Worker {} finished page {}: {} ({} records)",
            id,
            dispatch.job.page,
            outcome.label(),
            outcome.record_count()
        );

        let result = PageResult {
            job: dispatch.job,
            outcome,
            worker_id: id,
            credentials_generation: dispatch.credentials.generation,
        };

        if results.send(result).await.is_err() {
            tracing::debug!("Worker {} found the result queue closed", id);
            break;
        }
    }

    tracing::debug!("Worker {} stopped", id);
}

//! Scheduler behavior against deterministic stub fetchers

use domain_trawler::crawler::{
    CredentialRenewer, PageFetcher, PipelineSettings, RetryPolicy, Scheduler,
};
use domain_trawler::output::MemorySink;
use domain_trawler::{Credentials, FetchOutcome, PipelineError, RenewalError};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

fn settings(start_page: u32, max_pages: u32, workers: usize) -> PipelineSettings {
    PipelineSettings {
        start_page,
        max_pages,
        workers,
        delay: Duration::ZERO,
        retry: RetryPolicy::new(3, Duration::from_millis(1)),
        renewal_timeout: Duration::from_secs(5),
    }
}

fn records_for(page: u32) -> Vec<String> {
    (0..(page % 3 + 1))
        .map(|i| format!("site-{}-{}.com", page, i))
        .collect()
}

/// Serves `records_for(page)` up to `last_page`, then empty pages
///
/// Also tracks which pages are being fetched right now so overlapping fetches
/// of the same page can be detected.
#[derive(Default)]
struct ListingStub {
    last_page: u32,
    failing: HashMap<u32, u32>,
    attempts: Mutex<HashMap<u32, u32>>,
    fetching: Mutex<HashSet<u32>>,
    overlapped: AtomicBool,
    latency: Duration,
}

impl ListingStub {
    fn new(last_page: u32) -> Self {
        Self {
            last_page,
            ..Self::default()
        }
    }

    /// Makes `page` fail transiently on its first `times` attempts
    fn failing(mut self, page: u32, times: u32) -> Self {
        self.failing.insert(page, times);
        self
    }

    fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn attempts(&self, page: u32) -> u32 {
        self.attempts.lock().unwrap().get(&page).copied().unwrap_or(0)
    }

    fn total_attempts(&self) -> u32 {
        self.attempts.lock().unwrap().values().sum()
    }
}

impl PageFetcher for ListingStub {
    async fn fetch(&self, page: u32, _credentials: &Credentials) -> FetchOutcome {
        if !self.fetching.lock().unwrap().insert(page) {
            self.overlapped.store(true, Ordering::SeqCst);
        }

        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let count = attempts.entry(page).or_insert(0);
            *count += 1;
            *count
        };

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let outcome = match self.failing.get(&page) {
            Some(&times) if attempt <= times => {
                FetchOutcome::TransientError("HTTP 503".to_string())
            }
            _ if page <= self.last_page => FetchOutcome::Success(records_for(page)),
            _ => FetchOutcome::Empty,
        };

        self.fetching.lock().unwrap().remove(&page);
        outcome
    }
}

/// Renewer handing out a new session every call, or failing when told to
#[derive(Default)]
struct StubRenewer {
    calls: AtomicU32,
    fail: bool,
}

impl CredentialRenewer for StubRenewer {
    async fn renew(&self, current: &Credentials) -> Result<Credentials, RenewalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(RenewalError::Rejected { attempts: 3 });
        }
        Ok(current.renewed([("PHPSESSID".to_string(), "fresh".to_string())]))
    }
}

fn expected_records(pages: impl IntoIterator<Item = u32>) -> HashSet<String> {
    pages.into_iter().flat_map(records_for).collect()
}

#[tokio::test]
async fn test_bounded_range_fetches_each_page_once() {
    let fetcher = Arc::new(ListingStub::new(100));
    let sink = MemorySink::new();

    let summary = Scheduler::new(
        settings(1, 5, 3),
        fetcher.clone(),
        Arc::new(StubRenewer::default()),
        sink.clone(),
    )
    .run(Credentials::default())
    .await
    .unwrap();

    assert_eq!(summary.pages_completed, 5);
    assert_eq!(summary.pages_dispatched, 5);
    for page in 1..=5 {
        assert_eq!(fetcher.attempts(page), 1, "page {} attempts", page);
    }
    assert_eq!(fetcher.attempts(6), 0);
    assert_eq!(sink.pages(), vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn test_unbounded_run_stops_at_first_empty_page() {
    let fetcher = Arc::new(ListingStub::new(3));
    let sink = MemorySink::new();

    let summary = Scheduler::new(
        settings(1, 0, 1),
        fetcher.clone(),
        Arc::new(StubRenewer::default()),
        sink.clone(),
    )
    .run(Credentials::default())
    .await
    .unwrap();

    let written: HashSet<String> = sink.records().into_iter().collect();
    assert_eq!(written, expected_records(1..=3));
    assert_eq!(sink.records().len(), written.len());
    assert_eq!(summary.total_records, written.len());
    assert_eq!(summary.pages_empty, 1);
    assert_eq!(fetcher.attempts(4), 1);
    assert_eq!(fetcher.attempts(5), 0);
}

#[tokio::test]
async fn test_record_set_independent_of_worker_count() {
    let mut totals = Vec::new();

    for workers in [1, 3, 10] {
        let sink = MemorySink::new();
        let fetcher = ListingStub::new(12).failing(4, 1).failing(9, 2);

        let summary = Scheduler::new(
            settings(1, 0, workers),
            Arc::new(fetcher),
            Arc::new(StubRenewer::default()),
            sink.clone(),
        )
        .run(Credentials::default())
        .await
        .unwrap();

        let written: HashSet<String> = sink.records().into_iter().collect();
        assert_eq!(written, expected_records(1..=12), "workers = {}", workers);
        totals.push(summary.total_records);
    }

    assert!(totals.windows(2).all(|pair| pair[0] == pair[1]), "{:?}", totals);
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let fetcher = Arc::new(ListingStub::new(6).failing(2, 1).failing(5, u32::MAX));
    let sink = MemorySink::new();

    let summary = Scheduler::new(
        settings(1, 6, 2),
        fetcher.clone(),
        Arc::new(StubRenewer::default()),
        sink.clone(),
    )
    .run(Credentials::default())
    .await
    .unwrap();

    assert_eq!(fetcher.attempts(2), 2);
    assert_eq!(fetcher.total_attempts(), 10);
    // One original attempt plus at most three requeues
    assert_eq!(fetcher.attempts(5), 4);
    assert_eq!(summary.pages_abandoned, vec![5]);
    assert_eq!(sink.pages(), vec![1, 2, 3, 4, 6]);
}

#[tokio::test]
async fn test_no_page_fetched_twice_concurrently() {
    let fetcher = Arc::new(
        ListingStub::new(30)
            .failing(3, 2)
            .failing(7, 1)
            .failing(11, 3)
            .with_latency(Duration::from_millis(2)),
    );

    Scheduler::new(
        settings(1, 0, 10),
        fetcher.clone(),
        Arc::new(StubRenewer::default()),
        MemorySink::new(),
    )
    .run(Credentials::default())
    .await
    .unwrap();

    assert!(!fetcher.overlapped.load(Ordering::SeqCst));
}

/// Expires page 2 for the initial session only
struct ExpiringStub {
    attempts: Mutex<Vec<(u32, u32)>>,
}

impl PageFetcher for ExpiringStub {
    async fn fetch(&self, page: u32, credentials: &Credentials) -> FetchOutcome {
        self.attempts.lock().unwrap().push((page, credentials.generation));
        if page == 2 && credentials.generation == 0 {
            FetchOutcome::SessionExpired
        } else if page <= 4 {
            FetchOutcome::Success(records_for(page))
        } else {
            FetchOutcome::Empty
        }
    }
}

#[tokio::test]
async fn test_session_renewal_round_trip() {
    let fetcher = Arc::new(ExpiringStub {
        attempts: Mutex::new(Vec::new()),
    });
    let renewer = Arc::new(StubRenewer::default());
    let sink = MemorySink::new();

    let summary = Scheduler::new(settings(1, 4, 2), fetcher.clone(), renewer.clone(), sink.clone())
        .run(Credentials::default())
        .await
        .unwrap();

    assert_eq!(renewer.calls.load(Ordering::SeqCst), 1);
    assert_eq!(summary.renewals, 1);

    let page_two: Vec<String> = sink
        .entries()
        .into_iter()
        .filter(|(page, _)| *page == 2)
        .map(|(_, record)| record)
        .collect();
    assert_eq!(page_two, records_for(2));

    let attempts = fetcher.attempts.lock().unwrap().clone();
    assert!(attempts.contains(&(2, 0)));
    assert!(attempts.contains(&(2, 1)));
    assert_eq!(summary.total_records, expected_records(1..=4).len());
}

#[tokio::test]
async fn test_failed_renewal_ends_run() {
    let fetcher = ExpiringStub {
        attempts: Mutex::new(Vec::new()),
    };
    let renewer = StubRenewer {
        fail: true,
        ..StubRenewer::default()
    };

    let err = Scheduler::new(
        settings(1, 0, 1),
        Arc::new(fetcher),
        Arc::new(renewer),
        MemorySink::new(),
    )
    .run(Credentials::default())
    .await
    .unwrap_err();

    match err {
        PipelineError::RenewalFailed { reason, records } => {
            assert!(reason.contains("rejected"), "{}", reason);
            assert_eq!(records, records_for(1).len());
        }
        other => panic!("unexpected error: {}", other),
    }
}

/// Rate-limits page 1 at once; every other page answers slowly
struct RateLimitStub {
    calls: Mutex<Vec<u32>>,
}

impl PageFetcher for RateLimitStub {
    async fn fetch(&self, page: u32, _credentials: &Credentials) -> FetchOutcome {
        self.calls.lock().unwrap().push(page);
        if page == 1 {
            return FetchOutcome::RateLimited;
        }
        tokio::time::sleep(Duration::from_millis(150)).await;
        FetchOutcome::Success(vec![format!("page{}.net", page)])
    }
}

#[tokio::test]
async fn test_rate_limit_is_fatal_but_in_flight_pages_finish() {
    let fetcher = Arc::new(RateLimitStub {
        calls: Mutex::new(Vec::new()),
    });
    let sink = MemorySink::new();

    let err = Scheduler::new(
        settings(1, 0, 3),
        fetcher.clone(),
        Arc::new(StubRenewer::default()),
        sink.clone(),
    )
    .run(Credentials::default())
    .await
    .unwrap_err();

    assert!(matches!(err, PipelineError::RateLimited { page: 1, records: 2 }));

    let mut calls = fetcher.calls.lock().unwrap().clone();
    calls.sort_unstable();
    assert_eq!(calls, vec![1, 2, 3]);
    assert_eq!(sink.pages(), vec![2, 3]);
}

/// Renewer that takes `delay` to answer and notes what had been written by then
struct SlowRenewer {
    delay: Duration,
    sink: MemorySink,
    resolved_at: Mutex<Option<Instant>>,
    pages_written_before: Mutex<Vec<u32>>,
}

impl SlowRenewer {
    fn new(delay: Duration, sink: MemorySink) -> Self {
        Self {
            delay,
            sink,
            resolved_at: Mutex::new(None),
            pages_written_before: Mutex::new(Vec::new()),
        }
    }
}

impl CredentialRenewer for SlowRenewer {
    async fn renew(&self, current: &Credentials) -> Result<Credentials, RenewalError> {
        tokio::time::sleep(self.delay).await;
        *self.pages_written_before.lock().unwrap() = self.sink.pages();
        *self.resolved_at.lock().unwrap() = Some(Instant::now());
        Ok(current.renewed([("PHPSESSID".to_string(), "fresh".to_string())]))
    }
}

#[tokio::test]
async fn test_renewal_timeout_ends_run() {
    let fetcher = ExpiringStub {
        attempts: Mutex::new(Vec::new()),
    };
    let renewer = SlowRenewer::new(Duration::from_secs(10), MemorySink::new());
    let mut settings = settings(1, 0, 1);
    settings.renewal_timeout = Duration::from_millis(200);

    let started = Instant::now();
    let err = Scheduler::new(settings, Arc::new(fetcher), Arc::new(renewer), MemorySink::new())
        .run(Credentials::default())
        .await
        .unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(3), "{:?}", started.elapsed());
    match err {
        PipelineError::RenewalFailed { reason, records } => {
            assert!(reason.contains("timed out"), "{}", reason);
            assert_eq!(records, records_for(1).len());
        }
        other => panic!("unexpected error: {}", other),
    }
}

/// Expires page 1 at once for the initial session; pages 2 and 3 answer slowly
struct PauseStub {
    starts: Mutex<Vec<(u32, u32, Instant)>>,
}

impl PageFetcher for PauseStub {
    async fn fetch(&self, page: u32, credentials: &Credentials) -> FetchOutcome {
        self.starts
            .lock()
            .unwrap()
            .push((page, credentials.generation, Instant::now()));
        if page == 1 && credentials.generation == 0 {
            return FetchOutcome::SessionExpired;
        }
        if page <= 3 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        FetchOutcome::Success(records_for(page))
    }
}

#[tokio::test]
async fn test_dispatch_pauses_while_renewing_but_results_drain() {
    let fetcher = Arc::new(PauseStub {
        starts: Mutex::new(Vec::new()),
    });
    let sink = MemorySink::new();
    let renewer = Arc::new(SlowRenewer::new(Duration::from_millis(200), sink.clone()));

    let summary = Scheduler::new(settings(1, 6, 3), fetcher.clone(), renewer.clone(), sink.clone())
        .run(Credentials::default())
        .await
        .unwrap();

    assert_eq!(summary.renewals, 1);
    assert_eq!(sink.pages(), vec![1, 2, 3, 4, 5, 6]);

    // Pages already in flight were recorded while the renewal was pending
    assert_eq!(*renewer.pages_written_before.lock().unwrap(), vec![2, 3]);

    let resolved_at = renewer.resolved_at.lock().unwrap().unwrap();
    let starts = fetcher.starts.lock().unwrap().clone();

    let page_one: Vec<u32> = starts
        .iter()
        .filter(|(page, _, _)| *page == 1)
        .map(|(_, generation, _)| *generation)
        .collect();
    assert_eq!(page_one, vec![0, 1]);

    for (page, generation, started) in &starts {
        if *page > 3 || *generation > 0 {
            assert!(
                *started >= resolved_at,
                "page {} (generation {}) dispatched during renewal",
                page,
                generation
            );
        }
    }
}

//! End-to-end runs against a mock listing site
//!
//! These tests use wiremock to stand in for the listing site and run the real
//! HTTP fetcher, captcha renewer and file sink.

use domain_trawler::config::{Config, RenewalConfig, RequestConfig};
use domain_trawler::crawler::{
    build_http_client, run_pipeline, CaptchaRenewer, HttpPageFetcher, PipelineSettings,
    RetryPolicy, Scheduler, ScriptedPrompt,
};
use domain_trawler::output::FileSink;
use domain_trawler::{Credentials, PipelineError, TrawlError};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Renders listing rows the way the site's AJAX endpoint does
fn listing_rows(domains: &[&str]) -> String {
    domains
        .iter()
        .enumerate()
        .map(|(i, domain)| {
            format!(
                r#"<tr><td>{}</td><td class="row_name"><a href="/view/{}">{}</a></td></tr>"#,
                i + 1,
                domain,
                domain
            )
        })
        .collect()
}

fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| line.to_string())
        .collect()
}

/// Configuration pointing at the mock server with fast timings
fn test_config(server: &MockServer, output: &Path) -> Config {
    let mut config = Config::default();
    config.request.base_url = server.uri();
    config.request.url_template = Some(format!("{}/ajax_table/sites/{{page}}", server.uri()));
    config.request.timeout_secs = 5;
    config.scrape.delay_ms = 0;
    config.scrape.retry_backoff_ms = 10;
    config.output.path = output.display().to_string();
    config
}

async fn mount_listing(server: &MockServer, page: u32, body: String) {
    Mock::given(method("POST"))
        .and(path(format!("/ajax_table/sites/{}", page)))
        .and(body_string_contains("getpage=yes"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_full_run_until_empty_page() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("domains.txt");
    std::fs::write(&output, "left-over.com\n").unwrap();

    mount_listing(&server, 1, listing_rows(&["alpha.com", "beta.org"])).await;
    mount_listing(&server, 2, listing_rows(&["gamma.net"])).await;
    mount_listing(&server, 3, "<html><body></body></html>".to_string()).await;
    mount_listing(&server, 4, String::new()).await;
    mount_listing(&server, 5, String::new()).await;

    let mut config = test_config(&server, &output);
    config.scrape.workers = 3;

    let summary = run_pipeline(config).await.unwrap();

    assert_eq!(summary.total_records, 3);
    let written: HashSet<String> = read_lines(&output).into_iter().collect();
    let expected: HashSet<String> = ["alpha.com", "beta.org", "gamma.net"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    assert_eq!(written, expected);
    assert_eq!(read_lines(&output).len(), 3);
}

#[tokio::test]
async fn test_bounded_run_with_server_errors() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("domains.txt");

    // First request for page 2 fails, the retry succeeds
    Mock::given(method("POST"))
        .and(path("/ajax_table/sites/2"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_listing(&server, 1, listing_rows(&["one.io"])).await;
    mount_listing(&server, 2, listing_rows(&["two.io"])).await;

    let mut config = test_config(&server, &output);
    config.scrape.max_pages = 2;
    config.scrape.workers = 2;

    let summary = run_pipeline(config).await.unwrap();

    assert_eq!(summary.total_records, 2);
    assert_eq!(summary.pages_dispatched, 3);
    assert!(summary.pages_abandoned.is_empty());

    let mut written = read_lines(&output);
    written.sort();
    assert_eq!(written, vec!["one.io", "two.io"]);
}

#[tokio::test]
async fn test_rate_limit_ends_run_with_error() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("domains.txt");

    mount_listing(&server, 1, listing_rows(&["kept.com"])).await;
    mount_listing(
        &server,
        2,
        "<div>You have exceeded page visit limit for today</div>".to_string(),
    )
    .await;

    let mut config = test_config(&server, &output);
    config.scrape.workers = 1;

    let err = run_pipeline(config).await.unwrap_err();

    match err {
        TrawlError::Pipeline(PipelineError::RateLimited { page, records }) => {
            assert_eq!(page, 2);
            assert_eq!(records, 1);
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(read_lines(&output), vec!["kept.com"]);

    // Nothing past the rate-limited page was requested
    let requested: Vec<String> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|request| request.url.path().to_string())
        .collect();
    assert!(!requested.contains(&"/ajax_table/sites/3".to_string()));
}

#[tokio::test]
async fn test_unwritable_output_is_sink_unavailable() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("missing").join("domains.txt");

    let err = run_pipeline(test_config(&server, &output)).await.unwrap_err();

    assert!(matches!(
        err,
        TrawlError::Pipeline(PipelineError::SinkUnavailable(_))
    ));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_expired_session_renewed_through_captcha() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("domains.txt");

    // Listing answers depend on the session cookie
    Mock::given(method("POST"))
        .and(path("/ajax_table/sites/1"))
        .and(body_string_contains("getpage=yes"))
        .and(header("cookie", "sid=old"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("<h1>Human Verification</h1>"),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/ajax_table/sites/1"))
        .and(body_string_contains("getpage=yes"))
        .and(header("cookie", "sid=new"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(listing_rows(&["after.com", "renewal.org"])),
        )
        .mount(&server)
        .await;
    mount_listing(&server, 2, String::new()).await;

    // Captcha challenge, image and submission
    Mock::given(method("POST"))
        .and(path("/ajax_table/sites/1"))
        .and(body_string_contains("g_recaptcha_loaded=no"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<h1>Human Verification</h1><form>
               <input type="hidden" name="captcha_token" value="tok-9">
               <img src="/captcha.php?sid=9"></form>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/captcha.php"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x89, 0x50, 0x4e, 0x47]))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/browse/sites/1"))
        .and(body_string_contains("p_captcha_response=r7q2"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "sid=new; path=/")
                .set_body_string("<html>Listing</html>"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let request = RequestConfig {
        base_url: server.uri(),
        timeout_secs: 5,
        ..RequestConfig::default()
    };
    let renewal = RenewalConfig {
        image_path: dir.path().join("captcha.png").display().to_string(),
        ..RenewalConfig::default()
    };
    let client = build_http_client(&request).unwrap();

    let fetcher = HttpPageFetcher::new(
        client.clone(),
        format!("{}/ajax_table/sites/{{page}}", server.uri()),
        &server.uri(),
    );
    let renewer =
        CaptchaRenewer::new(client, &request, &renewal, ScriptedPrompt::new(["r7q2"])).unwrap();
    let sink = FileSink::create(&output).unwrap();

    let settings = PipelineSettings {
        start_page: 1,
        max_pages: 0,
        workers: 1,
        delay: Duration::ZERO,
        retry: RetryPolicy::new(3, Duration::from_millis(10)),
        renewal_timeout: Duration::from_secs(10),
    };

    let mut cookies = BTreeMap::new();
    cookies.insert("sid".to_string(), "old".to_string());

    let summary = Scheduler::new(settings, Arc::new(fetcher), Arc::new(renewer), sink)
        .run(Credentials::initial(cookies))
        .await
        .unwrap();

    assert_eq!(summary.renewals, 1);
    assert_eq!(summary.total_records, 2);
    assert_eq!(read_lines(&output), vec!["after.com", "renewal.org"]);
    assert!(dir.path().join("captcha.png").exists());
}

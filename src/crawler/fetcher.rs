//! HTTP page fetcher implementation
//!
//! This module handles the network side of a page fetch:
//! - Building HTTP clients with the browser-like headers the source expects
//! - Optional proxy routing (http, https, socks5) with basic auth
//! - One POST per page, carrying the current session cookies
//! - Mapping transport and status failures onto `FetchOutcome`
//!
//! The fetcher never retries. All retry policy lives in the scheduler.

use crate::config::{page_url, RequestConfig};
use crate::crawler::parser::classify_page;
use crate::state::{Credentials, FetchOutcome};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, COOKIE, ORIGIN, REFERER};
use reqwest::{Client, Proxy};
use std::future::Future;
use std::time::Duration;

/// Form body sent with every listing request
const PAGE_FORM: [(&str, &str); 2] = [("getpage", "yes"), ("lang", "en")];

/// Fetches one listing page with the given session
///
/// Implementations perform a single attempt and classify what came back.
pub trait PageFetcher: Send + Sync + 'static {
    fn fetch(
        &self,
        page: u32,
        credentials: &Credentials,
    ) -> impl Future<Output = FetchOutcome> + Send;
}

/// Builds an HTTP client from the request configuration
///
/// # Arguments
///
/// * `config` - The request configuration (user agent, timeout, proxy)
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client (e.g. unusable proxy URL)
///
/// # Example
///
/// ```no_run
/// use domain_trawler::config::RequestConfig;
/// use domain_trawler::crawler::build_http_client;
///
/// let client = build_http_client(&RequestConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &RequestConfig) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(config.timeout())
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true);

    if let Some(proxy_url) = &config.proxy {
        let mut proxy = Proxy::all(proxy_url.as_str())?;
        if let (Some(user), Some(pass)) = (&config.proxy_user, &config.proxy_pass) {
            proxy = proxy.basic_auth(user, pass);
        }
        tracing::info!("Using proxy: {}", proxy_url);
        builder = builder.proxy(proxy);
    }

    builder.build()
}

/// Builds the fixed AJAX headers sent with listing requests
fn listing_headers(base_url: &str) -> HeaderMap {
    let base = base_url.trim_end_matches('/');
    let mut headers = HeaderMap::new();

    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    headers.insert("X-Requested-With", HeaderValue::from_static("XMLHttpRequest"));
    if let Ok(origin) = HeaderValue::from_str(base) {
        headers.insert(ORIGIN, origin);
    }
    if let Ok(referer) = HeaderValue::from_str(&format!("{}/browse/sites/1", base)) {
        headers.insert(REFERER, referer);
    }

    headers
}

/// Fetches listing pages over HTTP
#[derive(Debug, Clone)]
pub struct HttpPageFetcher {
    client: Client,
    url_template: String,
    headers: HeaderMap,
}

impl HttpPageFetcher {
    /// Creates a fetcher for a URL template containing `{page}`
    pub fn new(client: Client, url_template: impl Into<String>, base_url: &str) -> Self {
        Self {
            client,
            url_template: url_template.into(),
            headers: listing_headers(base_url),
        }
    }

    /// Returns the URL that will be requested for a page
    pub fn page_url(&self, page: u32) -> String {
        page_url(&self.url_template, page)
    }
}

impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, page: u32, credentials: &Credentials) -> FetchOutcome {
        let url = self.page_url(page);
        tracing::trace!("POST {} (session generation {})", url, credentials.generation);

        let response = match self
            .client
            .post(&url)
            .headers(self.headers.clone())
            .header(COOKIE, credentials.cookie_header())
            .form(&PAGE_FORM[..])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return FetchOutcome::TransientError(describe_error(&e)),
        };

        let status = response.status();
        if !status.is_success() {
            return FetchOutcome::TransientError(format!("HTTP {}", status.as_u16()));
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return FetchOutcome::TransientError(describe_error(&e)),
        };

        let outcome = classify_page(&body);
        if outcome == FetchOutcome::Empty {
            tracing::debug!("Page {} returned no records. Response content:\n{}", page, body);
        }
        outcome
    }
}

/// Describes a transport error the way it is reported in retry logs
fn describe_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        "Request timeout".to_string()
    } else if error.is_connect() {
        "Connection refused".to_string()
    } else {
        error.to_string()
    }
}

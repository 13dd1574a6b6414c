use crate::state::{default_cookies, Credentials};
use ipnetwork::IpNetwork;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::time::Duration;

/// Placeholder substituted with the page number in the URL template
pub const PAGE_PLACEHOLDER: &str = "{page}";

/// Main configuration structure for Domain-Trawler
///
/// Every section is optional; missing keys fall back to the defaults below.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scrape: ScrapeConfig,
    pub request: RequestConfig,
    pub filter: FilterConfig,
    pub renewal: RenewalConfig,
    pub output: OutputConfig,
}

/// Pipeline behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ScrapeConfig {
    /// First page to fetch (1-based)
    pub start_page: u32,

    /// Number of pages to fetch (0 = until an empty page is seen)
    pub max_pages: u32,

    /// Number of concurrent workers
    pub workers: u32,

    /// Delay each worker waits before a request (milliseconds)
    pub delay_ms: u64,

    /// How many times a failing page is requeued
    pub max_retries: u32,

    /// Backoff step for transient errors (milliseconds, multiplied by attempt)
    pub retry_backoff_ms: u64,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            start_page: 1,
            max_pages: 0,
            workers: 3,
            delay_ms: 500,
            max_retries: 3,
            retry_backoff_ms: 1000,
        }
    }
}

impl ScrapeConfig {
    /// Inter-request delay as a duration
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Transient-error backoff step as a duration
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Outbound request configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RequestConfig {
    /// Scheme and host of the listing site
    pub base_url: String,

    /// Explicit page URL template; built from `base_url` and filters when unset
    pub url_template: Option<String>,

    /// Per-request timeout (seconds)
    pub timeout_secs: u64,

    /// User-Agent header value
    pub user_agent: String,

    /// Proxy URL (http, https or socks5)
    pub proxy: Option<String>,

    /// Proxy basic-auth user
    pub proxy_user: Option<String>,

    /// Proxy basic-auth password
    pub proxy_pass: Option<String>,

    /// Initial session cookies (built-in table when empty)
    pub cookies: BTreeMap<String, String>,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            base_url: "https://myip.ms".to_string(),
            url_template: None,
            timeout_secs: 30,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36"
                .to_string(),
            proxy: None,
            proxy_user: None,
            proxy_pass: None,
            cookies: BTreeMap::new(),
        }
    }
}

impl RequestConfig {
    /// Request timeout as a duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Inclusive numeric range filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RangeFilter {
    pub from: u64,
    pub to: u64,
}

/// Hosting IP filter
///
/// Written either as a table (`ip = { from = "..", to = ".." }`) or as a
/// single string in CIDR (`"192.168.0.0/24"`) or `from-to` notation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum IpFilter {
    Range { from: String, to: String },
    Notation(String),
}

impl IpFilter {
    /// Resolves the filter to its first and last address
    pub fn bounds(&self) -> Result<(IpAddr, IpAddr), String> {
        match self {
            Self::Range { from, to } => Ok((parse_ip("from", from)?, parse_ip("to", to)?)),
            Self::Notation(value) => {
                let value = value.trim();
                if value.contains('/') {
                    let network: IpNetwork = value
                        .parse()
                        .map_err(|e| format!("invalid CIDR notation '{}': {}", value, e))?;
                    Ok((network.network(), network.broadcast()))
                } else if let Some((from, to)) = value.split_once('-') {
                    Ok((parse_ip("from", from)?, parse_ip("to", to)?))
                } else {
                    Err(format!(
                        "invalid IP range '{}', expected 'from-to' or CIDR notation",
                        value
                    ))
                }
            }
        }
    }
}

fn parse_ip(label: &str, value: &str) -> Result<IpAddr, String> {
    value
        .trim()
        .parse()
        .map_err(|_| format!("invalid IP address format for '{}': {}", label, value))
}

/// Listing filters rendered into the URL template path
///
/// IDs are the source's own numeric identifiers.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FilterConfig {
    /// Only sites whose URL contains this text
    pub url: Option<String>,

    /// Country code
    pub country: Option<String>,

    /// Popularity rank range
    pub rank: Option<RangeFilter>,

    /// Hosting IP range
    pub ip: Option<IpFilter>,

    /// Owner (hosting company) ID
    pub owner_id: Option<u32>,

    /// Host ID
    pub host_id: Option<u32>,

    /// DNS record ID
    pub dns_id: Option<u32>,

    /// Daily visitor count range
    pub visitors: Option<RangeFilter>,
}

impl FilterConfig {
    /// Renders the filters as path segments, in the order the source expects
    pub fn path_segments(&self) -> String {
        let mut path = String::new();

        if let Some(url) = self.url.as_deref().filter(|u| !u.is_empty()) {
            path.push_str(&format!("/url/{}", url));
        }
        if let Some(country) = self.country.as_deref().filter(|c| !c.is_empty()) {
            path.push_str(&format!("/countryID/{}", country));
        }
        if let Some(rank) = self.rank {
            path.push_str(&format!("/rank/{}/rankii/{}", rank.from, rank.to));
        }
        if let Some(Ok((from, to))) = self.ip.as_ref().map(IpFilter::bounds) {
            path.push_str(&format!("/ipID/{}/ipIDii/{}", from, to));
        }
        if let Some(owner) = self.owner_id {
            path.push_str(&format!("/own/{}", owner));
        }
        if let Some(host) = self.host_id {
            path.push_str(&format!("/hostID/{}", host));
        }
        if let Some(dns) = self.dns_id {
            path.push_str(&format!("/dns/{}", dns));
        }
        if let Some(visitors) = self.visitors {
            path.push_str(&format!(
                "/cntVisitors/{}/cntVisitorsii/{}",
                visitors.from, visitors.to
            ));
        }

        path
    }

    /// Human-readable lines for every active filter, in path order
    pub fn describe(&self) -> Vec<String> {
        let mut lines = Vec::new();

        if let Some(url) = self.url.as_deref().filter(|u| !u.is_empty()) {
            lines.push(format!("URL contains: {}", url));
        }
        if let Some(country) = self.country.as_deref().filter(|c| !c.is_empty()) {
            lines.push(format!("Country: {}", country));
        }
        if let Some(rank) = self.rank {
            lines.push(format!("Rank: {}-{}", rank.from, rank.to));
        }
        if let Some(Ok((from, to))) = self.ip.as_ref().map(IpFilter::bounds) {
            lines.push(format!("IP: {}-{}", from, to));
        }
        if let Some(owner) = self.owner_id {
            lines.push(format!("Owner ID: {}", owner));
        }
        if let Some(host) = self.host_id {
            lines.push(format!("Host ID: {}", host));
        }
        if let Some(dns) = self.dns_id {
            lines.push(format!("DNS ID: {}", dns));
        }
        if let Some(visitors) = self.visitors {
            lines.push(format!("Visitors: {}-{}", visitors.from, visitors.to));
        }

        lines
    }
}

/// Credential renewal configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RenewalConfig {
    /// Upper bound on a single renewal, human interaction included (seconds)
    pub timeout_secs: u64,

    /// Captcha answers accepted per renewal before giving up
    pub max_attempts: u32,

    /// Where the captcha image is saved for the operator
    pub image_path: String,
}

impl Default for RenewalConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 600,
            max_attempts: 3,
            image_path: "captcha_image.png".to_string(),
        }
    }
}

impl RenewalConfig {
    /// Renewal timeout as a duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// File receiving one record per line
    pub path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: "domains.txt".to_string(),
        }
    }
}

impl Config {
    /// Returns the page URL template, building it from the filters if needed
    pub fn url_template(&self) -> String {
        match &self.request.url_template {
            Some(template) => template.clone(),
            None => format!(
                "{}/ajax_table/sites/{}{}",
                self.request.base_url.trim_end_matches('/'),
                PAGE_PLACEHOLDER,
                self.filter.path_segments()
            ),
        }
    }

    /// Returns the session the run starts with
    pub fn initial_credentials(&self) -> Credentials {
        if self.request.cookies.is_empty() {
            Credentials::initial(default_cookies())
        } else {
            Credentials::initial(self.request.cookies.clone())
        }
    }
}

/// Substitutes a page number into a URL template
pub fn page_url(template: &str, page: u32) -> String {
    template.replace(PAGE_PLACEHOLDER, &page.to_string())
}

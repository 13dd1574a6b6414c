use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Session cookies the source accepts before any challenge has been solved
const DEFAULT_COOKIES: &[(&str, &str)] = &[
    ("PHPSESSID", "le6doi5fo94hv5k2ouqmopd47k"),
    ("s2_csrf_cookie_name", "cf0b4574d2c27713afd4b26879597e5d"),
    ("s2_theme_ui", "red"),
    ("s2_uGoo", "w6a162dd67b1968e6349944bcff010fdd63ee724"),
    ("s2_uLang", "en"),
    ("sh", "72"),
    ("sw", "95.4"),
];

/// Returns the built-in session cookie table
pub fn default_cookies() -> BTreeMap<String, String> {
    DEFAULT_COOKIES
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

/// Opaque session bundle consumed by the page fetcher
///
/// A `Credentials` value is never mutated once it has been handed out. Renewal
/// produces a new value with a higher generation and the scheduler swaps it in
/// for jobs dispatched afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Session cookies sent with every request
    pub cookies: BTreeMap<String, String>,

    /// 0 for the initial session, bumped on each renewal
    pub generation: u32,

    /// When this session was issued
    pub issued_at: DateTime<Utc>,
}

impl Credentials {
    /// Creates the initial session from a cookie table
    pub fn initial(cookies: BTreeMap<String, String>) -> Self {
        Self {
            cookies,
            generation: 0,
            issued_at: Utc::now(),
        }
    }

    /// Builds the successor session, overlaying cookies the server handed out
    pub fn renewed<I>(&self, updates: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut cookies = self.cookies.clone();
        cookies.extend(updates);
        Self {
            cookies,
            generation: self.generation + 1,
            issued_at: Utc::now(),
        }
    }

    /// Renders the cookies as a `Cookie` request header value
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self::initial(default_cookies())
    }
}

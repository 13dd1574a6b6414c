//! HTML parser for listing pages and captcha challenges
//!
//! This module handles:
//! - Classifying a listing response (records, session expiry, rate limit, end of results)
//! - Extracting domain records from listing rows
//! - Extracting the captcha token and image URL from a challenge page

use crate::state::FetchOutcome;
use scraper::{Html, Selector};
use url::Url;

/// Text shown instead of the listing when the session needs a captcha
pub const SESSION_EXPIRED_MARKER: &str = "Human Verification";

/// Text shown when the IP has used up its page quota
pub const RATE_LIMIT_MARKER: &str = "You have exceeded page visit limit";

/// Field name that identifies a captcha challenge form
pub const CAPTCHA_TOKEN_FIELD: &str = "captcha_token";

/// Classifies a listing response body
///
/// Records win over markers: a page that lists domains is a success even if a
/// marker string happens to appear in it.
///
/// # Example
///
/// ```
/// use domain_trawler::crawler::classify_page;
/// use domain_trawler::state::FetchOutcome;
///
/// let body = r#"<tr><td class="row_name"><a href="/view/sites/1/a.com">a.com</a></td></tr>"#;
/// assert_eq!(classify_page(body), FetchOutcome::Success(vec!["a.com".to_string()]));
/// assert_eq!(classify_page("<p>Human Verification</p>"), FetchOutcome::SessionExpired);
/// ```
pub fn classify_page(body: &str) -> FetchOutcome {
    let records = extract_records(body);
    if !records.is_empty() {
        return FetchOutcome::Success(records);
    }

    if body.contains(SESSION_EXPIRED_MARKER) {
        FetchOutcome::SessionExpired
    } else if body.contains(RATE_LIMIT_MARKER) {
        FetchOutcome::RateLimited
    } else {
        FetchOutcome::Empty
    }
}

/// Extracts the domain names listed in `td.row_name` cells
///
/// The listing endpoint returns bare `<tr>` rows, which an HTML parser drops
/// outside a table, so fragments are wrapped in one first.
pub fn extract_records(body: &str) -> Vec<String> {
    let document = if body.contains("<table") {
        Html::parse_document(body)
    } else {
        Html::parse_document(&format!("<table>{}</table>", body))
    };

    let selector = match Selector::parse("td.row_name > a") {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };

    document
        .select(&selector)
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|domain| !domain.is_empty())
        .collect()
}

/// Extracts the captcha token from a challenge page
pub fn extract_captcha_token(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("input[name='captcha_token']").ok()?;

    document
        .select(&selector)
        .filter_map(|element| element.value().attr("value"))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

/// Extracts the captcha image URL from a challenge page
///
/// Relative sources are resolved against `base_url`.
pub fn extract_captcha_image(html: &str, base_url: &Url) -> Option<Url> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("img[src*='captcha.php']").ok()?;

    let src = document
        .select(&selector)
        .filter_map(|element| element.value().attr("src"))
        .next()?;

    base_url.join(src.trim()).ok()
}

/// Returns true if a response still carries a captcha challenge
pub fn has_captcha_challenge(html: &str) -> bool {
    html.contains(CAPTCHA_TOKEN_FIELD)
}

use crate::config::types::{
    page_url, Config, FilterConfig, OutputConfig, RangeFilter, RenewalConfig, RequestConfig,
    ScrapeConfig, PAGE_PLACEHOLDER,
};
use crate::ConfigError;
use url::Url;

/// Upper bound on concurrent workers
pub const MAX_WORKERS: u32 = 10;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_scrape_config(&config.scrape)?;
    validate_request_config(&config.request)?;
    validate_url_template(&config.url_template())?;
    validate_filters(&config.filter)?;
    validate_renewal_config(&config.renewal)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates pipeline configuration
fn validate_scrape_config(config: &ScrapeConfig) -> Result<(), ConfigError> {
    if config.start_page < 1 {
        return Err(ConfigError::Validation(format!(
            "start_page must be >= 1, got {}",
            config.start_page
        )));
    }

    if config.workers < 1 || config.workers > MAX_WORKERS {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and {}, got {}",
            MAX_WORKERS, config.workers
        )));
    }

    if config.start_page.checked_add(config.max_pages).is_none() {
        return Err(ConfigError::Validation(format!(
            "start_page + max_pages overflows: {} + {}",
            config.start_page, config.max_pages
        )));
    }

    Ok(())
}

/// Validates request configuration
fn validate_request_config(config: &RequestConfig) -> Result<(), ConfigError> {
    let base = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base_url: {}", e)))?;

    if !matches!(base.scheme(), "http" | "https") {
        return Err(ConfigError::Validation(format!(
            "base_url must use http or https, got '{}'",
            config.base_url
        )));
    }

    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeout_secs must be > 0".to_string(),
        ));
    }

    if let Some(proxy) = &config.proxy {
        let parsed = Url::parse(proxy)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid proxy '{}': {}", proxy, e)))?;

        if !matches!(parsed.scheme(), "http" | "https" | "socks5" | "socks5h") {
            return Err(ConfigError::Validation(format!(
                "Unsupported proxy scheme '{}', expected http, https or socks5",
                parsed.scheme()
            )));
        }
    }

    if config.proxy_user.is_some() != config.proxy_pass.is_some() {
        return Err(ConfigError::Validation(
            "proxy_user and proxy_pass must be given together".to_string(),
        ));
    }

    Ok(())
}

/// Validates that the template carries the page placeholder and yields a URL
fn validate_url_template(template: &str) -> Result<(), ConfigError> {
    if !template.contains(PAGE_PLACEHOLDER) {
        return Err(ConfigError::Validation(format!(
            "url_template must contain {}, got '{}'",
            PAGE_PLACEHOLDER, template
        )));
    }

    Url::parse(&page_url(template, 1))
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid url_template: {}", e)))?;

    Ok(())
}

/// Validates filter values
fn validate_filters(filter: &FilterConfig) -> Result<(), ConfigError> {
    if let Some(rank) = filter.rank {
        validate_range("rank", rank)?;
    }

    if let Some(visitors) = filter.visitors {
        validate_range("visitors", visitors)?;
    }

    if let Some(ip) = &filter.ip {
        let (from, to) = ip.bounds().map_err(ConfigError::Validation)?;
        if from.is_ipv4() != to.is_ipv4() || from > to {
            return Err(ConfigError::Validation(format!(
                "ip range must run from low to high within one family, got {}-{}",
                from, to
            )));
        }
    }

    Ok(())
}

/// Validates a from-to range: both positive, from <= to
fn validate_range(name: &str, range: RangeFilter) -> Result<(), ConfigError> {
    if range.from == 0 || range.to == 0 {
        return Err(ConfigError::Validation(format!(
            "{} range values must be positive integers",
            name
        )));
    }

    if range.from > range.to {
        return Err(ConfigError::Validation(format!(
            "{} 'from' value ({}) cannot be greater than 'to' value ({})",
            name, range.from, range.to
        )));
    }

    Ok(())
}

/// Validates renewal configuration
fn validate_renewal_config(config: &RenewalConfig) -> Result<(), ConfigError> {
    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "renewal timeout_secs must be > 0".to_string(),
        ));
    }

    if config.max_attempts == 0 {
        return Err(ConfigError::Validation(
            "renewal max_attempts must be >= 1".to_string(),
        ));
    }

    if config.image_path.is_empty() {
        return Err(ConfigError::Validation(
            "renewal image_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.path.is_empty() {
        return Err(ConfigError::Validation(
            "output path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

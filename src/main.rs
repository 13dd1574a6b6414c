//! Domain-Trawler main entry point
//!
//! This is the command-line interface for the Domain-Trawler listing scraper.

use anyhow::{Context, Result};
use clap::Parser;
use domain_trawler::config::{compute_config_hash, page_url, read_config, validate, Config};
use domain_trawler::crawler::{run_blocking, Coordinator};
use domain_trawler::output::{print_failure, print_summary};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Domain-Trawler: an adaptive paginated listing scraper
///
/// Domain-Trawler walks the site listing page by page with a small pool of
/// workers, writes every domain it finds to the output file, asks for a
/// captcha answer when the session expires, and stops cleanly when the
/// source rate-limits the current IP.
#[derive(Parser, Debug)]
#[command(name = "domain-trawler")]
#[command(version = "1.0.0")]
#[command(about = "An adaptive paginated listing scraper", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (defaults are used when omitted)
    #[arg(value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// First page to fetch
    #[arg(long, value_name = "PAGE")]
    start: Option<u32>,

    /// Number of pages to fetch (0 = until no more results)
    #[arg(long, value_name = "COUNT")]
    pages: Option<u32>,

    /// Number of concurrent workers (1-10)
    #[arg(short, long, value_name = "N")]
    workers: Option<u32>,

    /// Delay between requests per worker, in milliseconds
    #[arg(long, value_name = "MS")]
    delay: Option<u64>,

    /// Output file for domains
    #[arg(short, long, value_name = "FILE")]
    output: Option<String>,

    /// Proxy URL (http, https or socks5)
    #[arg(long, value_name = "URL")]
    proxy: Option<String>,

    /// Page URL template containing {page}
    #[arg(long, value_name = "TEMPLATE")]
    url_template: Option<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show the first page URL without scraping
    #[arg(long)]
    dry_run: bool,
}

impl Cli {
    /// Applies command-line overrides on top of the file configuration
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(start) = self.start {
            config.scrape.start_page = start;
        }
        if let Some(pages) = self.pages {
            config.scrape.max_pages = pages;
        }
        if let Some(workers) = self.workers {
            config.scrape.workers = workers;
        }
        if let Some(delay) = self.delay {
            config.scrape.delay_ms = delay;
        }
        if let Some(output) = &self.output {
            config.output.path = output.clone();
        }
        if let Some(proxy) = &self.proxy {
            config.request.proxy = Some(proxy.clone());
        }
        if let Some(template) = &self.url_template {
            config.request.url_template = Some(template.clone());
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    match run_blocking(run(cli)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: failed to start the async runtime: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ExitCode {
    let config = match load_effective_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {:#}", e);
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    if cli.dry_run {
        handle_dry_run(&config);
        return ExitCode::SUCCESS;
    }

    match handle_scrape(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!("Run failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("domain_trawler=info,warn"),
            1 => EnvFilter::new("domain_trawler=debug,info"),
            2 => EnvFilter::new("domain_trawler=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Reads the config file (if any), applies overrides, then validates
fn load_effective_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let config = read_config(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let hash = compute_config_hash(path)
                .with_context(|| format!("hashing {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            config
        }
        None => {
            tracing::debug!("No configuration file given, using defaults");
            Config::default()
        }
    };

    cli.apply_overrides(&mut config);
    validate(&config).context("invalid configuration")?;

    Ok(config)
}

/// Handles the --dry-run mode: shows the effective configuration
fn handle_dry_run(config: &Config) {
    println!("=== Domain-Trawler Dry Run ===\n");

    println!("Scrape:");
    println!("  Start page: {}", config.scrape.start_page);
    match config.scrape.max_pages {
        0 => println!("  Pages: until no more results"),
        pages => println!("  Pages: {}", pages),
    }
    println!("  Workers: {}", config.scrape.workers);
    println!("  Delay: {}ms", config.scrape.delay_ms);
    println!(
        "  Retries: {} (backoff step {}ms)",
        config.scrape.max_retries, config.scrape.retry_backoff_ms
    );

    println!("\nRequest:");
    println!("  Base URL: {}", config.request.base_url);
    println!("  Timeout: {}s", config.request.timeout_secs);
    match &config.request.proxy {
        Some(proxy) => println!("  Proxy: {}", proxy),
        None => println!("  Proxy: none"),
    }
    println!("  Cookies: {}", config.initial_credentials().cookies.len());

    println!("\nFilters:");
    let filters = config.filter.describe();
    if filters.is_empty() {
        println!("  none");
    }
    for filter in &filters {
        println!("  {}", filter);
    }

    println!("\nRenewal:");
    println!("  Timeout: {}s", config.renewal.timeout_secs);
    println!("  Attempts: {}", config.renewal.max_attempts);
    println!("  Captcha image: {}", config.renewal.image_path);

    println!("\nOutput: {}", config.output.path);

    println!("\n✓ Configuration is valid");
    println!(
        "✓ First page URL: {}",
        page_url(&config.url_template(), config.scrape.start_page)
    );
}

/// Handles the main scrape operation
async fn handle_scrape(config: Config) -> Result<()> {
    let workers = config.scrape.workers;

    let coordinator = match Coordinator::new(config).context("setting up the scraper") {
        Ok(coordinator) => coordinator,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return Err(e);
        }
    };

    match coordinator.run().await {
        Ok(summary) => {
            print_summary(&summary);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Scrape failed: {}", e);
            print_failure(&e, workers);
            Err(e.into())
        }
    }
}

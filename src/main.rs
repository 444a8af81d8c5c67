//! Listing-Harvest main entry point
//!
//! This is the command-line interface for the Listing-Harvest property harvester.

use clap::Parser;
use listing_harvest::config::{load_config_with_hash, validate, Config, SearchOverrides};
use listing_harvest::crawler::harvest;
use listing_harvest::output::print_run_summary;
use listing_harvest::url::build_search_url;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Listing-Harvest: a property listing harvester
///
/// Listing-Harvest opens a search-results page in a headless browser, keeps
/// loading more results until they run out or the result cap is reached, and
/// writes one CSV row per property detail page.
#[derive(Parser, Debug)]
#[command(name = "listing-harvest")]
#[command(version = "0.1.0")]
#[command(about = "A property listing harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (built-in defaults when omitted)
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Search keyword (destination or property name)
    #[arg(short, long)]
    keyword: Option<String>,

    /// Check-in date, YYYY-MM-DD (default: today)
    #[arg(long)]
    checkin: Option<String>,

    /// Check-out date, YYYY-MM-DD (default: the day after check-in)
    #[arg(long)]
    checkout: Option<String>,

    /// Number of adults
    #[arg(long)]
    adults: Option<u32>,

    /// Number of children
    #[arg(long)]
    children: Option<u32>,

    /// Maximum number of records to write
    #[arg(short = 'n', long)]
    max_results: Option<u32>,

    /// Path of the CSV output file
    #[arg(short, long, value_name = "CSV")]
    output: Option<String>,

    /// Append logs to this file instead of stderr
    #[arg(long, value_name = "FILE")]
    log_file: Option<String>,

    /// Show the browser window
    #[arg(long)]
    headful: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be harvested without opening a browser
    #[arg(long)]
    dry_run: bool,
}

impl Cli {
    fn overrides(&self) -> SearchOverrides {
        SearchOverrides {
            keyword: self.keyword.clone(),
            checkin: self.checkin.clone(),
            checkout: self.checkout.clone(),
            adults: self.adults,
            children: self.children,
            max_results: self.max_results,
            csv_path: self.output.clone(),
            log_file: self.log_file.clone(),
            headful: self.headful,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration before logging so the log file setting applies
    let (mut config, config_hash) = match &cli.config {
        Some(path) => {
            let (config, hash) = load_config_with_hash(path)?;
            (config, Some(hash))
        }
        None => (Config::default(), None),
    };
    config.apply_overrides(cli.overrides());

    setup_logging(cli.verbose, cli.quiet, config.output.log_file.as_deref())?;

    match (&cli.config, &config_hash) {
        (Some(path), Some(hash)) => tracing::info!(
            "Configuration loaded from {} (hash: {})",
            path.display(),
            hash
        ),
        _ => tracing::info!("Using built-in configuration"),
    }

    if let Err(e) = validate(&config) {
        tracing::error!("Invalid configuration: {}", e);
        return Err(e.into());
    }

    if cli.dry_run {
        handle_dry_run(&config)?;
    } else {
        handle_harvest(config).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(
    verbose: u8,
    quiet: bool,
    log_file: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("listing_harvest=info,warn"),
            1 => EnvFilter::new("listing_harvest=debug,info"),
            2 => EnvFilter::new("listing_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false);

    match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }

    Ok(())
}

/// Handles the --dry-run mode: validates config and shows what would be harvested
fn handle_dry_run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let today = chrono::Local::now().date_naive();
    let search_url = build_search_url(config, today)?;

    println!("=== Listing-Harvest Dry Run ===\n");

    println!("Search:");
    println!("  Keyword: {}", config.search.keyword);
    println!(
        "  Occupants: {} adults, {} children",
        config.search.adults, config.search.children
    );
    println!("  Max results: {}", config.search.max_results);
    println!("  URL: {}", search_url);

    println!("\nCrawler Configuration:");
    println!(
        "  Max concurrent detail pages: {}",
        config.crawler.max_concurrent_details
    );
    println!("  Card wait timeout: {}ms", config.crawler.card_wait_timeout);
    println!("  Page load timeout: {}ms", config.crawler.page_load_timeout);
    println!("  Headless: {}", config.crawler.headless);
    println!("  User agents: {}", config.identity.user_agents.len());

    println!("\nOutput:");
    println!("  CSV: {}", config.output.csv_path);
    if let Some(log_file) = &config.output.log_file {
        println!("  Log file: {}", log_file);
    }

    println!("\n✓ Configuration is valid");

    Ok(())
}

/// Handles the main harvest operation
async fn handle_harvest(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(
        "Harvesting '{}' into {}",
        config.search.keyword,
        config.output.csv_path
    );

    let summary = match harvest(config).await {
        Ok(summary) => summary,
        Err(e) => {
            tracing::error!("Harvest failed: {}", e);
            return Err(e.into());
        }
    };

    print_run_summary(&summary);

    if summary.is_fatal() {
        let cause = summary
            .fatal_error
            .unwrap_or_else(|| "unknown error".to_string());
        return Err(format!("harvest ended with a fatal error: {}", cause).into());
    }

    Ok(())
}

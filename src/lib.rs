//! Listing-Harvest: a property listing harvester for dynamically rendered search sites
//!
//! This crate drives a headless browser through a paginated search-results page,
//! follows "load more" pagination until the results are exhausted or a result cap
//! is reached, and visits each listing's detail page to build a structured record.

pub mod config;
pub mod crawler;
pub mod driver;
pub mod output;
pub mod state;
pub mod url;

use thiserror::Error;

/// Main error type for Listing-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("No result cards rendered on {url} within {timeout_ms}ms")]
    RenderTimeout { url: String, timeout_ms: u64 },

    #[error("Detail page {url} did not load within {timeout_ms}ms")]
    PageLoadTimeout { url: String, timeout_ms: u64 },

    #[error("Browser driver error: {0}")]
    Driver(#[from] driver::DriverError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("Invalid phase transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::CrawlPhase,
        to: state::CrawlPhase,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid date: {0}")]
    InvalidDate(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,
}

/// Result type alias for Listing-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Coordinator, ListingReference, PropertyRecord};
pub use state::{CrawlPhase, TerminationReason};

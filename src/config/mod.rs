//! Configuration module for Listing-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files,
//! and applying command-line overrides on top of them.
//!
//! # Example
//!
//! ```no_run
//! use listing_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Searching for: {}", config.search.keyword);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, CrawlerConfig, IdentityConfig, OutputConfig, SearchConfig, SelectorConfig, SiteConfig,
};

// Re-export parser and validation functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::{stay_dates, validate, DATE_FORMAT};

/// Search parameters supplied on the command line
///
/// Every `Some` field replaces the corresponding configuration value.
#[derive(Debug, Clone, Default)]
pub struct SearchOverrides {
    pub keyword: Option<String>,
    pub checkin: Option<String>,
    pub checkout: Option<String>,
    pub adults: Option<u32>,
    pub children: Option<u32>,
    pub max_results: Option<u32>,
    pub csv_path: Option<String>,
    pub log_file: Option<String>,
    pub headful: bool,
}

impl Config {
    /// Applies command-line overrides; the result still has to be validated
    pub fn apply_overrides(&mut self, overrides: SearchOverrides) {
        if let Some(keyword) = overrides.keyword {
            self.search.keyword = keyword;
        }
        if let Some(checkin) = overrides.checkin {
            self.search.checkin = Some(checkin);
        }
        if let Some(checkout) = overrides.checkout {
            self.search.checkout = Some(checkout);
        }
        if let Some(adults) = overrides.adults {
            self.search.adults = adults;
        }
        if let Some(children) = overrides.children {
            self.search.children = children;
        }
        if let Some(max_results) = overrides.max_results {
            self.search.max_results = max_results;
        }
        if let Some(csv_path) = overrides.csv_path {
            self.output.csv_path = csv_path;
        }
        if let Some(log_file) = overrides.log_file {
            self.output.log_file = Some(log_file);
        }
        if overrides.headful {
            self.crawler.headless = false;
        }
    }
}

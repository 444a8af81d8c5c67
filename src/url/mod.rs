//! URL handling module for Listing-Harvest
//!
//! This module builds the search-results URL from the configured search and
//! resolves listing links found on result cards.

mod normalize;

use crate::config::{stay_dates, Config, DATE_FORMAT};
use crate::{ConfigError, HarvestError};
use chrono::NaiveDate;
use url::Url;

pub use normalize::resolve_listing_url;

/// Parses the configured site base URL
pub fn site_base_url(config: &Config) -> Result<Url, ConfigError> {
    Url::parse(&config.site.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base_url: {}", e)))
}

/// Builds the search-results URL for a crawl run
///
/// The query carries the keyword (`ss`), the stay dates and the occupant
/// counts, in that order.
///
/// # Examples
///
/// ```
/// use listing_harvest::config::Config;
/// use listing_harvest::url::build_search_url;
/// use chrono::NaiveDate;
///
/// let config = Config::default();
/// let today = NaiveDate::from_ymd_opt(2025, 5, 1).unwrap();
/// let url = build_search_url(&config, today).unwrap();
/// assert_eq!(
///     url.as_str(),
///     "https://www.booking.com/searchresults.es.html?ss=Spain&checkin=2025-05-01&checkout=2025-05-02&group_adults=1&group_children=0"
/// );
/// ```
pub fn build_search_url(config: &Config, today: NaiveDate) -> Result<Url, HarvestError> {
    let (checkin, checkout) = stay_dates(&config.search, today)?;

    let mut url = site_base_url(config)?.join(&config.site.search_path)?;
    url.set_fragment(None);
    url.query_pairs_mut()
        .clear()
        .append_pair("ss", config.search.keyword.trim())
        .append_pair("checkin", &checkin.format(DATE_FORMAT).to_string())
        .append_pair("checkout", &checkout.format(DATE_FORMAT).to_string())
        .append_pair("group_adults", &config.search.adults.to_string())
        .append_pair("group_children", &config.search.children.to_string());

    Ok(url)
}

use crate::config::types::{
    Config, CrawlerConfig, IdentityConfig, OutputConfig, SearchConfig, SelectorConfig, SiteConfig,
};
use crate::ConfigError;
use chrono::{Duration, Local, NaiveDate};
use url::Url;

/// Date format accepted for check-in and check-out
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_search_config(&config.search, Local::now().date_naive())?;
    validate_site_config(&config.site)?;
    validate_selector_config(&config.selectors)?;
    validate_crawler_config(&config.crawler)?;
    validate_identity_config(&config.identity)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Resolves the check-in and check-out dates of a search
///
/// A missing check-in defaults to `today`; a missing check-out defaults to the
/// day after check-in. Check-out must be strictly after check-in.
pub fn stay_dates(
    search: &SearchConfig,
    today: NaiveDate,
) -> Result<(NaiveDate, NaiveDate), ConfigError> {
    let checkin = match &search.checkin {
        Some(raw) => parse_date("checkin", raw)?,
        None => today,
    };

    let checkout = match &search.checkout {
        Some(raw) => parse_date("checkout", raw)?,
        None => checkin + Duration::days(1),
    };

    if checkout <= checkin {
        return Err(ConfigError::InvalidDate(format!(
            "checkout {} must be after checkin {}",
            checkout.format(DATE_FORMAT),
            checkin.format(DATE_FORMAT)
        )));
    }

    Ok((checkin, checkout))
}

fn parse_date(field: &str, raw: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).map_err(|e| {
        ConfigError::InvalidDate(format!(
            "{} '{}' is not a YYYY-MM-DD date: {}",
            field, raw, e
        ))
    })
}

/// Validates search parameters
fn validate_search_config(config: &SearchConfig, today: NaiveDate) -> Result<(), ConfigError> {
    if config.keyword.trim().is_empty() {
        return Err(ConfigError::Validation(
            "search keyword cannot be empty".to_string(),
        ));
    }

    stay_dates(config, today)?;

    if config.adults < 1 {
        return Err(ConfigError::Validation(format!(
            "adults must be >= 1, got {}",
            config.adults
        )));
    }

    if config.max_results < 1 {
        return Err(ConfigError::Validation(format!(
            "max_results must be >= 1, got {}",
            config.max_results
        )));
    }

    Ok(())
}

/// Validates the site location
fn validate_site_config(config: &SiteConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base_url: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "base_url '{}' must use http or https",
            config.base_url
        )));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "base_url '{}' has no host",
            config.base_url
        )));
    }

    if !config.search_path.starts_with('/') {
        return Err(ConfigError::Validation(format!(
            "search_path must start with '/', got '{}'",
            config.search_path
        )));
    }

    Ok(())
}

/// Validates that no selector or attribute name is blank
fn validate_selector_config(config: &SelectorConfig) -> Result<(), ConfigError> {
    let entries = [
        ("card", &config.card),
        ("card-link", &config.card_link),
        ("card-price", &config.card_price),
        ("load-more", &config.load_more),
        ("load-more-fallback", &config.load_more_fallback),
        ("load-more-text", &config.load_more_text),
        ("title", &config.title),
        ("coordinates", &config.coordinates),
        ("coordinates-attribute", &config.coordinates_attribute),
        ("address", &config.address),
        ("rating", &config.rating),
        ("rating-attribute", &config.rating_attribute),
    ];

    for (name, value) in entries {
        if value.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "selector '{}' cannot be empty",
                name
            )));
        }
    }

    Ok(())
}

/// Validates crawler timing and concurrency
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_concurrent_details < 1 || config.max_concurrent_details > 32 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_details must be between 1 and 32, got {}",
            config.max_concurrent_details
        )));
    }

    if config.card_wait_timeout == 0 {
        return Err(ConfigError::Validation(
            "card_wait_timeout must be > 0ms".to_string(),
        ));
    }

    if config.page_load_timeout == 0 {
        return Err(ConfigError::Validation(
            "page_load_timeout must be > 0ms".to_string(),
        ));
    }

    Ok(())
}

/// Validates the user-agent pool
fn validate_identity_config(config: &IdentityConfig) -> Result<(), ConfigError> {
    if config.user_agents.is_empty() {
        return Err(ConfigError::Validation(
            "user_agents must contain at least one entry".to_string(),
        ));
    }

    if config.user_agents.iter().any(|ua| ua.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "user_agents cannot contain empty entries".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.csv_path.is_empty() {
        return Err(ConfigError::Validation(
            "csv_path cannot be empty".to_string(),
        ));
    }

    if matches!(&config.log_file, Some(path) if path.is_empty()) {
        return Err(ConfigError::Validation(
            "log_file cannot be empty when set".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    fn search(checkin: Option<&str>, checkout: Option<&str>) -> SearchConfig {
        SearchConfig {
            checkin: checkin.map(str::to_string),
            checkout: checkout.map(str::to_string),
            ..SearchConfig::default()
        }
    }

    #[test]
    fn test_stay_dates_defaults() {
        let today = date("2025-03-10");
        let (checkin, checkout) = stay_dates(&search(None, None), today).unwrap();
        assert_eq!(checkin, today);
        assert_eq!(checkout, date("2025-03-11"));
    }

    #[test]
    fn test_stay_dates_explicit() {
        let today = date("2025-03-10");
        let (checkin, checkout) =
            stay_dates(&search(Some("2025-05-01"), Some("2025-05-04")), today).unwrap();
        assert_eq!(checkin, date("2025-05-01"));
        assert_eq!(checkout, date("2025-05-04"));
    }

    #[test]
    fn test_stay_dates_rejects_bad_format() {
        let today = date("2025-03-10");
        let err = stay_dates(&search(Some("01/05/2025"), None), today).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDate(_)));

        let err = stay_dates(&search(None, Some("2025-02-30")), today).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDate(_)));
    }

    #[test]
    fn test_stay_dates_rejects_checkout_not_after_checkin() {
        let today = date("2025-03-10");
        assert!(stay_dates(&search(Some("2025-05-01"), Some("2025-05-01")), today).is_err());
        assert!(stay_dates(&search(Some("2025-05-04"), Some("2025-05-01")), today).is_err());
        // Checkout defaults against today when checkin is absent
        assert!(stay_dates(&search(None, Some("2025-03-09")), today).is_err());
    }

    #[test]
    fn test_validate_search_config() {
        let today = date("2025-03-10");
        assert!(validate_search_config(&SearchConfig::default(), today).is_ok());

        let zero_cap = SearchConfig {
            max_results: 0,
            ..SearchConfig::default()
        };
        assert!(matches!(
            validate_search_config(&zero_cap, today),
            Err(ConfigError::Validation(_))
        ));

        let no_adults = SearchConfig {
            adults: 0,
            ..SearchConfig::default()
        };
        assert!(validate_search_config(&no_adults, today).is_err());

        let blank = SearchConfig {
            keyword: "   ".to_string(),
            ..SearchConfig::default()
        };
        assert!(validate_search_config(&blank, today).is_err());
    }

    #[test]
    fn test_validate_site_config() {
        assert!(validate_site_config(&SiteConfig::default()).is_ok());

        let ftp = SiteConfig {
            base_url: "ftp://example.com".to_string(),
            ..SiteConfig::default()
        };
        assert!(matches!(
            validate_site_config(&ftp),
            Err(ConfigError::InvalidUrl(_))
        ));

        let relative_path = SiteConfig {
            search_path: "searchresults.html".to_string(),
            ..SiteConfig::default()
        };
        assert!(validate_site_config(&relative_path).is_err());
    }

    #[test]
    fn test_validate_selectors_and_identity() {
        assert!(validate_selector_config(&SelectorConfig::default()).is_ok());
        let blank = SelectorConfig {
            card: String::new(),
            ..SelectorConfig::default()
        };
        assert!(validate_selector_config(&blank).is_err());

        assert!(validate_identity_config(&IdentityConfig::default()).is_ok());
        let empty = IdentityConfig {
            user_agents: vec![],
        };
        assert!(validate_identity_config(&empty).is_err());
    }

    #[test]
    fn test_validate_crawler_config() {
        assert!(validate_crawler_config(&CrawlerConfig::default()).is_ok());
        let too_many = CrawlerConfig {
            max_concurrent_details: 64,
            ..CrawlerConfig::default()
        };
        assert!(validate_crawler_config(&too_many).is_err());
    }
}

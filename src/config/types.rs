use serde::Deserialize;

/// Main configuration structure for Listing-Harvest
///
/// Every section is optional in the TOML file; missing keys fall back to the
/// values used for the default search site.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub search: SearchConfig,
    pub site: SiteConfig,
    pub selectors: SelectorConfig,
    pub crawler: CrawlerConfig,
    pub identity: IdentityConfig,
    pub output: OutputConfig,
}

/// Search parameters for one crawl run
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Free-text destination or property keyword
    pub keyword: String,

    /// Check-in date (YYYY-MM-DD); today when absent
    pub checkin: Option<String>,

    /// Check-out date (YYYY-MM-DD); the day after check-in when absent
    pub checkout: Option<String>,

    /// Number of adult occupants
    pub adults: u32,

    /// Number of child occupants
    pub children: u32,

    /// Maximum number of records to emit
    #[serde(rename = "max-results")]
    pub max_results: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            keyword: "Spain".to_string(),
            checkin: None,
            checkout: None,
            adults: 1,
            children: 0,
            max_results: 200,
        }
    }
}

/// Target site location
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Base URL used to build the search URL and resolve relative links
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Path of the search-results page
    #[serde(rename = "search-path")]
    pub search_path: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.booking.com".to_string(),
            search_path: "/searchresults.es.html".to_string(),
        }
    }
}

/// CSS selectors and attribute names for the search and detail pages
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// One result card on the search page
    pub card: String,

    /// Detail link inside a card (its `href` is read)
    #[serde(rename = "card-link")]
    pub card_link: String,

    /// Listed price inside a card
    #[serde(rename = "card-price")]
    pub card_price: String,

    /// Structural selector of the "load more" control
    #[serde(rename = "load-more")]
    pub load_more: String,

    /// Element type searched by the text fallback for "load more"
    #[serde(rename = "load-more-fallback")]
    pub load_more_fallback: String,

    /// Text the fallback "load more" element must contain
    #[serde(rename = "load-more-text")]
    pub load_more_text: String,

    /// Property title on the detail page
    pub title: String,

    /// Element carrying the coordinate pair
    pub coordinates: String,

    /// Attribute holding "lat,lng"
    #[serde(rename = "coordinates-attribute")]
    pub coordinates_attribute: String,

    /// Address block on the detail page
    pub address: String,

    /// Element carrying the review score
    pub rating: String,

    /// Attribute holding the review score
    #[serde(rename = "rating-attribute")]
    pub rating_attribute: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            card: r#"[data-testid="property-card"]"#.to_string(),
            card_link: r#"[data-testid="property-card-desktop-single-image"]"#.to_string(),
            card_price: r#"span[data-testid="price-and-discounted-price"]"#.to_string(),
            load_more: "div.c82435a4b8 button.a83ed08757.c0e0affd09 span.e4adce92df".to_string(),
            load_more_fallback: "button".to_string(),
            load_more_text: "Load more results".to_string(),
            title: "h2.d2fee87262.pp-header__title".to_string(),
            coordinates: "a#map_trigger_header_pin".to_string(),
            coordinates_attribute: "data-atlas-latlng".to_string(),
            address: "div.a53cbfa6de.f17adf7576".to_string(),
            rating: "div#js--hp-gallery-scorecard".to_string(),
            rating_attribute: "data-review-score".to_string(),
        }
    }
}

/// Crawler timing and concurrency configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Maximum number of detail pages open at once
    #[serde(rename = "max-concurrent-details")]
    pub max_concurrent_details: u32,

    /// How long to wait for the first result card (milliseconds)
    #[serde(rename = "card-wait-timeout")]
    pub card_wait_timeout: u64,

    /// How long to wait for a page to load (milliseconds)
    #[serde(rename = "page-load-timeout")]
    pub page_load_timeout: u64,

    /// Pause after scrolling to the bottom of the results (milliseconds)
    #[serde(rename = "scroll-settle")]
    pub scroll_settle: u64,

    /// Pause after clicking "load more" (milliseconds)
    #[serde(rename = "load-more-settle")]
    pub load_more_settle: u64,

    /// Run the browser without a visible window
    pub headless: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_details: 4,
            card_wait_timeout: 10_000,
            page_load_timeout: 30_000,
            scroll_settle: 2_000,
            load_more_settle: 3_000,
            headless: true,
        }
    }
}

/// Browser identity configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Pool of user agents; one is picked for every opened page
    #[serde(rename = "user-agents")]
    pub user_agents: Vec<String>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        let user_agents = [
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/58.0.3029.110 Safari/537.36",
            "Mozilla/5.0 (Windows NT 6.1; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/70.0.3538.110 Safari/537.36",
            "Mozilla/5.0 (Windows NT 6.1; WOW64; rv:40.0) Gecko/20100101 Firefox/40.0",
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_3) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/79.0.3945.88 Safari/537.36",
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_14_6) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/79.0.3945.88 Safari/537.36",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/58.0.3029.110 Safari/537.36 OPR/45.0.2552.888",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/68.0.3440.106 Safari/537.36 Edge/17.17134",
        ];

        Self {
            user_agents: user_agents.iter().map(|ua| ua.to_string()).collect(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Path of the CSV feed
    #[serde(rename = "csv-path")]
    pub csv_path: String,

    /// Optional log file; logs go to stderr when absent
    #[serde(rename = "log-file")]
    pub log_file: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            csv_path: "booking_properties_output.csv".to_string(),
            log_file: None,
        }
    }
}

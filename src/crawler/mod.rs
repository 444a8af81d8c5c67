//! Crawler module for search pagination and detail extraction
//!
//! This module contains the core harvesting logic, including:
//! - The listing data model (`ListingReference`, `PropertyRecord`)
//! - "Load more" pagination of the search-results page
//! - Per-listing detail page extraction
//! - Overall run coordination

mod coordinator;
mod extractor;
mod listing;
mod pagination;

pub use coordinator::{run_crawl, Coordinator};
pub use extractor::{fetch_detail, parse_coordinates, DetailExtractor, Extraction, FieldWarning};
pub use listing::{
    clean_price, GeoPoint, ListingReference, PropertyRecord, RecordRow, NO_PRICE, RECORD_COLUMNS,
};
pub use pagination::{CardDisposition, CardHandler, PaginationEngine};

use crate::config::Config;
use crate::output::RunSummary;
use crate::HarvestError;

/// Runs a complete harvest operation
///
/// This is the main entry point for starting a harvest. It will:
/// 1. Launch a headless browser
/// 2. Open the search-results page for the configured search
/// 3. Paginate it and fetch every new listing's detail page
/// 4. Stream records to the configured CSV file until the cap or the end
///
/// # Arguments
///
/// * `config` - The harvest configuration
///
/// # Returns
///
/// * `Ok(RunSummary)` - The run ended; check `termination` for the outcome
/// * `Err(HarvestError)` - The run could not be started
pub async fn harvest(config: Config) -> Result<RunSummary, HarvestError> {
    run_crawl(config).await
}

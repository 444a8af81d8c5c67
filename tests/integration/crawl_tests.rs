//! Integration tests for the harvester
//!
//! These tests replay fixture sites through the in-memory rendering driver
//! and run the full pagination and detail cycle end-to-end.

use listing_harvest::config::{Config, SelectorConfig};
use listing_harvest::crawler::Coordinator;
use listing_harvest::driver::{MemoryCard, MemoryDetail, MemoryDriver, MemorySite};
use listing_harvest::output::{CollectingFeed, CsvFeed, RunSummary};
use listing_harvest::{CrawlPhase, PropertyRecord, TerminationReason};
use std::collections::HashSet;
use std::sync::Arc;

const BASE: &str = "https://www.example.test";
const SEARCH: &str = "https://www.example.test/search";

/// Creates a test configuration pointing at the fixture site
fn create_test_config(max_results: u32) -> Config {
    let mut config = Config::default();
    config.site.base_url = BASE.to_string();
    config.site.search_path = "/search".to_string();
    config.search.keyword = "Barcelona".to_string();
    config.search.checkin = Some("2030-06-01".to_string());
    config.search.checkout = Some("2030-06-03".to_string());
    config.search.max_results = max_results;
    config.crawler.card_wait_timeout = 50;
    config.crawler.page_load_timeout = 50;
    config.crawler.scroll_settle = 0;
    config.crawler.load_more_settle = 0;
    config
}

fn hotel_url(n: usize) -> String {
    format!("{}/hotel/{}.html", BASE, n)
}

fn hotel_detail(n: usize) -> MemoryDetail {
    MemoryDetail::listing(
        &format!("Hotel {}", n),
        "41.3851,2.1734",
        &format!("Carrer {}, Barcelona", n),
        "8,5",
    )
}

/// A site whose search page shows `cycles` batches of `per_cycle` cards
fn paged_site(cycles: usize, per_cycle: usize) -> MemorySite {
    let mut site = MemorySite::new(SEARCH);
    for cycle in 0..cycles {
        let batch = (0..per_cycle)
            .map(|i| {
                let n = cycle * per_cycle + i + 1;
                MemoryCard::listing(&format!("/hotel/{}.html", n), &format!("€\u{a0}{}", n * 10))
            })
            .collect();
        site = site.with_batch(batch);
    }
    for n in 1..=cycles * per_cycle {
        site = site.with_detail(&hotel_url(n), hotel_detail(n));
    }
    site
}

async fn harvest(
    site: MemorySite,
    config: Config,
) -> (RunSummary, Vec<PropertyRecord>, Arc<MemoryDriver>) {
    let driver = Arc::new(MemoryDriver::new(site, SelectorConfig::default()));
    let feed = CollectingFeed::new();

    let mut coordinator =
        Coordinator::new(config, Arc::clone(&driver)).expect("Failed to create coordinator");
    let summary = coordinator
        .run(Box::new(feed.clone()))
        .await
        .expect("Harvest should produce a summary");
    assert_eq!(coordinator.phase(), CrawlPhase::Closed);

    (summary, feed.records(), driver)
}

fn assert_unique_urls(records: &[PropertyRecord]) {
    let urls: HashSet<&str> = records.iter().map(|r| r.url.as_str()).collect();
    assert_eq!(urls.len(), records.len(), "Record URLs must be distinct");
}

#[tokio::test]
async fn test_single_page_exhausts() {
    let (summary, records, driver) = harvest(paged_site(1, 3), create_test_config(10)).await;

    assert_eq!(summary.termination, TerminationReason::Exhausted);
    assert_eq!(summary.records_emitted, 3);
    assert_eq!(records.len(), 3);
    assert_unique_urls(&records);

    let record = records
        .iter()
        .find(|r| r.url == hotel_url(2))
        .expect("Hotel 2 should be emitted");
    assert_eq!(record.name, "Hotel 2");
    assert_eq!(record.price, "€20");
    assert_eq!(record.address, "Carrer 2, Barcelona");
    assert_eq!(record.rating, "8,5");
    assert_eq!(record.latitude(), Some(41.3851));
    assert_eq!(record.longitude(), Some(2.1734));

    assert_eq!(driver.pages_still_open(), 0);
    assert_eq!(driver.load_more_clicks(), 0);
}

#[tokio::test]
async fn test_cap_stops_dispatch() {
    let (summary, records, driver) = harvest(paged_site(3, 5), create_test_config(7)).await;

    assert_eq!(summary.termination, TerminationReason::MaxResultsReached);
    assert_eq!(summary.records_emitted, 7);
    assert_eq!(records.len(), 7);
    assert_unique_urls(&records);

    // No detail page beyond the 7th accepted card is ever opened
    assert_eq!(driver.detail_attempts().len(), 7);
    assert_eq!(summary.cards_dispatched, 7);
    assert_eq!(driver.load_more_clicks(), 1);
    assert_eq!(driver.pages_still_open(), 0);
}

#[tokio::test]
async fn test_cap_equal_to_results_is_cap_reached() {
    let (summary, records, _) = harvest(paged_site(1, 3), create_test_config(3)).await;

    assert_eq!(summary.termination, TerminationReason::MaxResultsReached);
    assert_eq!(records.len(), 3);
}

#[tokio::test]
async fn test_detail_timeout_skips_listing() {
    let site = paged_site(1, 3).with_detail(&hotel_url(2), MemoryDetail::Timeout);

    let (summary, records, driver) = harvest(site, create_test_config(10)).await;

    assert_eq!(summary.termination, TerminationReason::Exhausted);
    assert_eq!(summary.records_emitted, 2);
    assert_eq!(summary.detail_failures, 1);
    assert!(records.iter().all(|r| r.url != hotel_url(2)));

    // The timed-out listing is attempted once and never retried
    let attempts = driver.detail_attempts();
    assert_eq!(attempts.iter().filter(|url| **url == hotel_url(2)).count(), 1);
    assert_eq!(driver.pages_still_open(), 0);
}

#[tokio::test]
async fn test_timeout_under_cap_redispatches_slot() {
    // Listing 1 fails, so the cap of 3 is filled by listings 2, 3 and 4
    let site = paged_site(2, 3).with_detail(&hotel_url(1), MemoryDetail::Timeout);

    let (summary, records, driver) = harvest(site, create_test_config(3)).await;

    assert_eq!(summary.termination, TerminationReason::MaxResultsReached);
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.url != hotel_url(1)));
    assert_eq!(driver.detail_attempts().len(), 4);
}

#[tokio::test]
async fn test_duplicate_links_across_cycles() {
    let site = MemorySite::new(SEARCH)
        .with_batch(vec![
            MemoryCard::listing("/hotel/1.html", "€ 10"),
            MemoryCard::decoration(),
        ])
        .with_batch(vec![
            MemoryCard::listing(&format!("{}#availability", hotel_url(1)), "€ 10"),
            MemoryCard::listing("/hotel/2.html?aid=304142", "€ 20"),
        ])
        .with_detail(&hotel_url(1), hotel_detail(1))
        .with_detail(&hotel_url(2), hotel_detail(2));

    let (summary, records, driver) = harvest(site, create_test_config(10)).await;

    assert_eq!(summary.termination, TerminationReason::Exhausted);
    assert_eq!(records.len(), 2);
    assert_unique_urls(&records);
    assert_eq!(driver.detail_attempts().len(), 2);
    assert!(summary.duplicates_skipped >= 1);
}

#[tokio::test]
async fn test_redirect_to_emitted_url_is_not_duplicated() {
    let site = MemorySite::new(SEARCH)
        .with_batch(vec![
            MemoryCard::listing("/hotel/1.html", "€ 10"),
            MemoryCard::listing("/hotel/old-1.html", "€ 10"),
        ])
        .with_detail(&hotel_url(1), hotel_detail(1))
        .with_detail(
            &format!("{}/hotel/old-1.html", BASE),
            MemoryDetail::Page {
                name: Some("Hotel 1".to_string()),
                coordinates: None,
                address: None,
                rating: None,
                final_url: Some(hotel_url(1)),
            },
        );

    let (summary, records, _) = harvest(site, create_test_config(10)).await;

    assert_eq!(summary.termination, TerminationReason::Exhausted);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].url, hotel_url(1));
}

#[tokio::test]
async fn test_empty_search_page_is_fatal() {
    let (summary, records, driver) =
        harvest(MemorySite::new(SEARCH), create_test_config(10)).await;

    assert_eq!(summary.termination, TerminationReason::FatalError);
    assert!(summary.is_fatal());
    assert!(summary
        .fatal_error
        .as_deref()
        .unwrap_or_default()
        .contains("No result cards"));
    assert!(records.is_empty());
    assert!(driver.detail_attempts().is_empty());
    assert_eq!(driver.pages_still_open(), 0);
}

#[tokio::test]
async fn test_text_fallback_load_more() {
    let mut site = paged_site(2, 2);
    site.load_more_text_only = true;

    let (summary, records, driver) = harvest(site, create_test_config(10)).await;

    assert_eq!(summary.termination, TerminationReason::Exhausted);
    assert_eq!(records.len(), 4);
    assert_eq!(driver.load_more_clicks(), 1);
}

#[tokio::test]
async fn test_failed_load_more_click_is_exhaustion() {
    let mut site = paged_site(2, 2);
    site.load_more_broken = true;

    let (summary, records, _) = harvest(site, create_test_config(10)).await;

    assert_eq!(summary.termination, TerminationReason::Exhausted);
    assert_eq!(records.len(), 2);
}

#[tokio::test]
async fn test_coordinates_are_both_or_neither() {
    let site = MemorySite::new(SEARCH)
        .with_batch(vec![
            MemoryCard::listing("/hotel/1.html", "€ 10"),
            MemoryCard::listing("/hotel/2.html", "€ 20"),
            MemoryCard::listing("/hotel/3.html", "€ 30"),
        ])
        .with_detail(
            &hotel_url(1),
            MemoryDetail::listing("Hotel 1", "41.3851,2.1734", "Street", "9"),
        )
        .with_detail(
            &hotel_url(2),
            MemoryDetail::listing("Hotel 2", "invalid", "Street", "9"),
        )
        .with_detail(
            &hotel_url(3),
            MemoryDetail::listing("Hotel 3", "41.3851", "Street", "9"),
        );

    let (summary, records, _) = harvest(site, create_test_config(10)).await;

    assert_eq!(records.len(), 3);
    for record in &records {
        assert_eq!(
            record.latitude().is_some(),
            record.longitude().is_some(),
            "{} has half a coordinate pair",
            record.url
        );
    }
    let with_coordinates = records.iter().filter(|r| r.coordinates.is_some()).count();
    assert_eq!(with_coordinates, 1);
    assert_eq!(summary.field_warnings, 2);
}

#[tokio::test]
async fn test_csv_feed_end_to_end() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let csv_path = temp_dir.path().join("properties.csv");

    let driver = Arc::new(MemoryDriver::new(paged_site(1, 2), SelectorConfig::default()));
    let feed = CsvFeed::create(&csv_path).expect("Failed to create CSV feed");
    let mut coordinator = Coordinator::new(create_test_config(10), Arc::clone(&driver))
        .expect("Failed to create coordinator");
    let summary = coordinator.run(Box::new(feed)).await.unwrap();
    assert_eq!(summary.records_emitted, 2);

    let content = std::fs::read_to_string(&csv_path).expect("Failed to read CSV");
    let mut lines = content.lines();
    assert_eq!(
        lines.next(),
        Some("name,latitude,longitude,address,price,rating,url")
    );
    let rows: Vec<&str> = lines.collect();
    assert_eq!(rows.len(), 2);
    assert!(rows
        .iter()
        .any(|row| row.starts_with("Hotel 1,41.3851,2.1734,") && row.ends_with(&hotel_url(1))));
}

#[tokio::test]
async fn test_concurrent_details_are_bounded() {
    let mut site = paged_site(1, 6);
    for n in 1..=6 {
        site = site.with_detail(&hotel_url(n), MemoryDetail::slow(20, hotel_detail(n)));
    }
    let mut config = create_test_config(10);
    config.crawler.page_load_timeout = 1000;
    config.crawler.max_concurrent_details = 2;

    let (summary, records, driver) = harvest(site, config).await;

    assert_eq!(summary.termination, TerminationReason::Exhausted);
    assert_eq!(records.len(), 6);
    assert_eq!(driver.peak_concurrent_details(), 2);
    assert_eq!(driver.pages_still_open(), 0);
}

#[tokio::test]
async fn test_browser_crash_discards_pending_records() {
    let site = paged_site(1, 3)
        .with_detail(&hotel_url(1), MemoryDetail::slow(100, hotel_detail(1)))
        .with_detail(&hotel_url(2), MemoryDetail::slow(100, hotel_detail(2)))
        .with_detail(&hotel_url(3), MemoryDetail::Crashed);
    let mut config = create_test_config(10);
    config.crawler.page_load_timeout = 1000;
    config.crawler.max_concurrent_details = 3;

    let (summary, records, driver) = harvest(site, config).await;

    assert_eq!(summary.termination, TerminationReason::FatalError);
    assert!(summary.is_fatal());
    assert!(records.is_empty());
    assert_eq!(summary.records_emitted, 0);
    assert_eq!(summary.records_discarded, 2);
    assert_eq!(driver.peak_concurrent_details(), 3);
    assert_eq!(driver.pages_still_open(), 0);
}

#[tokio::test]
async fn test_pending_timeout_not_redispatched_in_later_cycle() {
    // Listing 1 is still navigating when its card shows up again in batch 2
    let site = MemorySite::new(SEARCH)
        .with_batch(vec![
            MemoryCard::listing("/hotel/1.html", "€ 10"),
            MemoryCard::listing("/hotel/2.html", "€ 20"),
        ])
        .with_batch(vec![
            MemoryCard::listing(&format!("{}#photos", hotel_url(1)), "€ 10"),
            MemoryCard::listing("/hotel/3.html", "€ 30"),
        ])
        .with_detail(&hotel_url(1), MemoryDetail::slow(500, hotel_detail(1)))
        .with_detail(&hotel_url(2), hotel_detail(2))
        .with_detail(&hotel_url(3), hotel_detail(3));

    let (summary, records, driver) = harvest(site, create_test_config(10)).await;

    assert_eq!(summary.termination, TerminationReason::Exhausted);
    assert_eq!(summary.detail_failures, 1);
    assert!(summary.duplicates_skipped >= 1);
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.url != hotel_url(1)));
    assert_eq!(driver.load_more_clicks(), 1);

    let attempts = driver.detail_attempts();
    assert_eq!(attempts.iter().filter(|url| **url == hotel_url(1)).count(), 1);
    assert_eq!(driver.pages_still_open(), 0);
}

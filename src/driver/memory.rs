//! In-memory rendering driver
//!
//! `MemoryDriver` replays a fixed site: a search page whose cards arrive in
//! batches (one batch per "load more" click) and a set of detail pages keyed by
//! absolute URL. Selectors are matched by equality against the configured
//! [`SelectorConfig`], so the crawl core runs unchanged against it.

use crate::config::SelectorConfig;
use crate::driver::{BrowserPage, DriverError, DriverResult, Locator, RenderingDriver};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// One card on the search page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryCard {
    pub href: Option<String>,
    pub price: Option<String>,
}

impl MemoryCard {
    /// A listing card with a detail link and a price
    pub fn listing(href: &str, price: &str) -> Self {
        Self {
            href: Some(href.to_string()),
            price: Some(price.to_string()),
        }
    }

    /// A card without a detail link (banner, ad, map teaser)
    pub fn decoration() -> Self {
        Self {
            href: None,
            price: None,
        }
    }
}

/// A detail page behind a listing link
#[derive(Debug, Clone, PartialEq)]
pub enum MemoryDetail {
    Page {
        name: Option<String>,
        coordinates: Option<String>,
        address: Option<String>,
        rating: Option<String>,
        /// URL reported after navigation (redirect target)
        final_url: Option<String>,
    },
    /// Navigation never finishes
    Timeout,

    /// Navigation takes `delay` before resolving to `page`
    Slow {
        delay: Duration,
        page: Box<MemoryDetail>,
    },

    /// The browser connection drops while navigating
    Crashed,
}

impl MemoryDetail {
    /// A detail page with every field present
    pub fn listing(name: &str, coordinates: &str, address: &str, rating: &str) -> Self {
        Self::Page {
            name: Some(name.to_string()),
            coordinates: Some(coordinates.to_string()),
            address: Some(address.to_string()),
            rating: Some(rating.to_string()),
            final_url: None,
        }
    }

    /// `page`, reached only after `delay_ms` of navigation
    pub fn slow(delay_ms: u64, page: MemoryDetail) -> Self {
        Self::Slow {
            delay: Duration::from_millis(delay_ms),
            page: Box::new(page),
        }
    }
}

/// Static description of a site
#[derive(Debug, Clone, Default)]
pub struct MemorySite {
    /// Any opened URL starting with this prefix is the search page
    pub search_url_prefix: String,

    /// Card batches; batch `n` appears after the `n`th "load more" click
    pub batches: Vec<Vec<MemoryCard>>,

    /// Detail pages keyed by absolute URL
    pub details: HashMap<String, MemoryDetail>,

    /// "Load more" only matches the text fallback, not the structural selector
    pub load_more_text_only: bool,

    /// Clicking "load more" fails
    pub load_more_broken: bool,
}

impl MemorySite {
    pub fn new(search_url_prefix: &str) -> Self {
        Self {
            search_url_prefix: search_url_prefix.to_string(),
            ..Self::default()
        }
    }

    pub fn with_batch(mut self, cards: Vec<MemoryCard>) -> Self {
        self.batches.push(cards);
        self
    }

    pub fn with_detail(mut self, url: &str, detail: MemoryDetail) -> Self {
        self.details.insert(url.to_string(), detail);
        self
    }
}

#[derive(Debug, Default)]
struct DriverLog {
    open_attempts: Vec<String>,
    pages_opened: usize,
    pages_closed: usize,
    load_more_clicks: usize,
    details_in_flight: usize,
    peak_details_in_flight: usize,
    shut_down: bool,
}

impl DriverLog {
    fn detail_started(&mut self) {
        self.details_in_flight += 1;
        self.peak_details_in_flight = self.peak_details_in_flight.max(self.details_in_flight);
    }

    fn detail_finished(&mut self) {
        self.details_in_flight = self.details_in_flight.saturating_sub(1);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Rendering driver replaying a [`MemorySite`]
pub struct MemoryDriver {
    site: Arc<MemorySite>,
    selectors: SelectorConfig,
    log: Arc<Mutex<DriverLog>>,
}

impl MemoryDriver {
    pub fn new(site: MemorySite, selectors: SelectorConfig) -> Self {
        Self {
            site: Arc::new(site),
            selectors,
            log: Arc::new(Mutex::new(DriverLog::default())),
        }
    }

    /// Every URL passed to `open_page`, in call order
    pub fn open_attempts(&self) -> Vec<String> {
        lock(&self.log).open_attempts.clone()
    }

    /// Open attempts for pages other than the search page
    pub fn detail_attempts(&self) -> Vec<String> {
        self.open_attempts()
            .into_iter()
            .filter(|url| !url.starts_with(&self.site.search_url_prefix))
            .collect()
    }

    /// Pages opened successfully and not closed yet
    pub fn pages_still_open(&self) -> usize {
        let log = lock(&self.log);
        log.pages_opened - log.pages_closed
    }

    pub fn load_more_clicks(&self) -> usize {
        lock(&self.log).load_more_clicks
    }

    /// Most detail pages ever open or navigating at the same time
    pub fn peak_concurrent_details(&self) -> usize {
        lock(&self.log).peak_details_in_flight
    }

    pub fn is_shut_down(&self) -> bool {
        lock(&self.log).shut_down
    }
}

#[async_trait]
impl RenderingDriver for MemoryDriver {
    type Page = MemoryPage;

    async fn open_page(&self, url: &str, timeout: Duration) -> DriverResult<MemoryPage> {
        lock(&self.log).open_attempts.push(url.to_string());

        let content = if url.starts_with(&self.site.search_url_prefix) {
            PageContent::Search {
                site: Arc::clone(&self.site),
                loaded: Mutex::new(0),
            }
        } else {
            lock(&self.log).detail_started();
            match self.navigate_detail(url, timeout).await {
                Ok(content) => content,
                Err(e) => {
                    lock(&self.log).detail_finished();
                    return Err(e);
                }
            }
        };

        lock(&self.log).pages_opened += 1;

        Ok(MemoryPage {
            url: url.to_string(),
            content,
            selectors: self.selectors.clone(),
            log: Arc::clone(&self.log),
            closed: AtomicBool::new(false),
        })
    }

    async fn shutdown(&self) -> DriverResult<()> {
        lock(&self.log).shut_down = true;
        Ok(())
    }
}

impl MemoryDriver {
    async fn navigate_detail(&self, url: &str, timeout: Duration) -> DriverResult<PageContent> {
        let timed_out = || DriverError::Timeout {
            what: format!("navigation to {}", url),
            timeout_ms: timeout.as_millis() as u64,
        };

        let mut detail = self.site.details.get(url).cloned();
        loop {
            match detail {
                Some(MemoryDetail::Slow { delay, page }) => {
                    if delay >= timeout {
                        tokio::time::sleep(timeout).await;
                        return Err(timed_out());
                    }
                    tokio::time::sleep(delay).await;
                    detail = Some(*page);
                }
                Some(MemoryDetail::Page {
                    name,
                    coordinates,
                    address,
                    rating,
                    final_url,
                }) => {
                    return Ok(PageContent::Detail {
                        name,
                        coordinates,
                        address,
                        rating,
                        final_url,
                    })
                }
                Some(MemoryDetail::Timeout) => return Err(timed_out()),
                Some(MemoryDetail::Crashed) => return Err(DriverError::Closed),
                None => {
                    return Err(DriverError::Navigation {
                        url: url.to_string(),
                        message: "no such page".to_string(),
                    })
                }
            }
        }
    }
}

enum PageContent {
    Search {
        site: Arc<MemorySite>,
        loaded: Mutex<usize>,
    },
    Detail {
        name: Option<String>,
        coordinates: Option<String>,
        address: Option<String>,
        rating: Option<String>,
        final_url: Option<String>,
    },
}

/// Handle to a node on a [`MemoryPage`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryElement {
    Card(usize),
    CardLink(usize),
    CardPrice(usize),
    LoadMore,
    Title,
    Coordinates,
    Address,
    Rating,
}

/// A page opened by [`MemoryDriver`]
pub struct MemoryPage {
    url: String,
    content: PageContent,
    selectors: SelectorConfig,
    log: Arc<Mutex<DriverLog>>,
    closed: AtomicBool,
}

impl MemoryPage {
    fn ensure_open(&self) -> DriverResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DriverError::Closed);
        }
        Ok(())
    }

    fn visible_cards(&self) -> Vec<MemoryCard> {
        match &self.content {
            PageContent::Search { site, loaded } => {
                let loaded = *lock(loaded);
                site.batches
                    .iter()
                    .take(loaded + 1)
                    .flatten()
                    .cloned()
                    .collect()
            }
            PageContent::Detail { .. } => Vec::new(),
        }
    }

    fn has_more(&self) -> bool {
        match &self.content {
            PageContent::Search { site, loaded } => *lock(loaded) + 1 < site.batches.len(),
            PageContent::Detail { .. } => false,
        }
    }

    fn card(&self, index: usize) -> Option<MemoryCard> {
        self.visible_cards().into_iter().nth(index)
    }
}

#[async_trait]
impl BrowserPage for MemoryPage {
    type Element = MemoryElement;

    async fn current_url(&self) -> DriverResult<String> {
        self.ensure_open()?;
        match &self.content {
            PageContent::Detail {
                final_url: Some(final_url),
                ..
            } => Ok(final_url.clone()),
            _ => Ok(self.url.clone()),
        }
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> DriverResult<()> {
        self.ensure_open()?;
        let present = match &self.content {
            PageContent::Search { .. } => {
                selector == self.selectors.card && !self.visible_cards().is_empty()
            }
            PageContent::Detail { .. } => true,
        };

        if present {
            Ok(())
        } else {
            Err(DriverError::Timeout {
                what: format!("selector {}", selector),
                timeout_ms: timeout.as_millis() as u64,
            })
        }
    }

    async fn wait_for_load(&self, _timeout: Duration) -> DriverResult<()> {
        self.ensure_open()
    }

    async fn query_all(&self, locator: &Locator) -> DriverResult<Vec<MemoryElement>> {
        self.ensure_open()?;
        let selectors = &self.selectors;

        let elements = match (&self.content, locator) {
            (PageContent::Search { .. }, Locator::Css(css)) if *css == selectors.card => {
                (0..self.visible_cards().len()).map(MemoryElement::Card).collect()
            }
            (PageContent::Search { site, .. }, Locator::Css(css))
                if *css == selectors.load_more && !site.load_more_text_only && self.has_more() =>
            {
                vec![MemoryElement::LoadMore]
            }
            (PageContent::Search { .. }, Locator::CssWithText { css, text })
                if *css == selectors.load_more_fallback
                    && *text == selectors.load_more_text
                    && self.has_more() =>
            {
                vec![MemoryElement::LoadMore]
            }
            (
                PageContent::Detail {
                    name,
                    coordinates,
                    address,
                    rating,
                    ..
                },
                Locator::Css(css),
            ) => {
                let candidates = [
                    (&selectors.title, name.is_some(), MemoryElement::Title),
                    (
                        &selectors.coordinates,
                        coordinates.is_some(),
                        MemoryElement::Coordinates,
                    ),
                    (&selectors.address, address.is_some(), MemoryElement::Address),
                    (&selectors.rating, rating.is_some(), MemoryElement::Rating),
                ];
                candidates
                    .into_iter()
                    .filter(|(selector, present, _)| *selector == css && *present)
                    .map(|(_, _, element)| element)
                    .collect()
            }
            _ => Vec::new(),
        };

        Ok(elements)
    }

    async fn query_within(
        &self,
        parent: &MemoryElement,
        selector: &str,
    ) -> DriverResult<Option<MemoryElement>> {
        self.ensure_open()?;
        let MemoryElement::Card(index) = *parent else {
            return Ok(None);
        };
        let Some(card) = self.card(index) else {
            return Err(DriverError::Protocol(format!("stale card handle {}", index)));
        };

        if selector == self.selectors.card_link && card.href.is_some() {
            Ok(Some(MemoryElement::CardLink(index)))
        } else if selector == self.selectors.card_price && card.price.is_some() {
            Ok(Some(MemoryElement::CardPrice(index)))
        } else {
            Ok(None)
        }
    }

    async fn attribute(&self, element: &MemoryElement, name: &str) -> DriverResult<Option<String>> {
        self.ensure_open()?;
        let value = match (&self.content, element) {
            (PageContent::Search { .. }, MemoryElement::CardLink(index)) if name == "href" => {
                self.card(*index).and_then(|card| card.href)
            }
            (PageContent::Detail { coordinates, .. }, MemoryElement::Coordinates)
                if name == self.selectors.coordinates_attribute =>
            {
                coordinates.clone()
            }
            (PageContent::Detail { rating, .. }, MemoryElement::Rating)
                if name == self.selectors.rating_attribute =>
            {
                rating.clone()
            }
            _ => None,
        };
        Ok(value)
    }

    async fn text_content(&self, element: &MemoryElement) -> DriverResult<Option<String>> {
        self.ensure_open()?;
        let value = match (&self.content, element) {
            (PageContent::Search { .. }, MemoryElement::CardPrice(index)) => {
                self.card(*index).and_then(|card| card.price)
            }
            (PageContent::Detail { name, .. }, MemoryElement::Title) => name.clone(),
            (PageContent::Detail { address, .. }, MemoryElement::Address) => address.clone(),
            _ => None,
        };
        Ok(value)
    }

    async fn evaluate(
        &self,
        element: &MemoryElement,
        _function: &str,
    ) -> DriverResult<serde_json::Value> {
        let text = self.text_content(element).await?;
        Ok(text
            .map(serde_json::Value::String)
            .unwrap_or(serde_json::Value::Null))
    }

    async fn scroll_into_view(&self, _element: &MemoryElement) -> DriverResult<()> {
        self.ensure_open()
    }

    async fn click(&self, element: &MemoryElement) -> DriverResult<()> {
        self.ensure_open()?;
        match (&self.content, element) {
            (PageContent::Search { site, .. }, MemoryElement::LoadMore)
                if site.load_more_broken =>
            {
                Err(DriverError::Protocol("element is not clickable".to_string()))
            }
            (PageContent::Search { loaded, .. }, MemoryElement::LoadMore) => {
                *lock(loaded) += 1;
                lock(&self.log).load_more_clicks += 1;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn scroll_to_bottom(&self) -> DriverResult<()> {
        self.ensure_open()
    }

    async fn wait_timeout(&self, _duration: Duration) {
        tokio::task::yield_now().await;
    }

    async fn close(&self) -> DriverResult<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let mut log = lock(&self.log);
            log.pages_closed += 1;
            if matches!(self.content, PageContent::Detail { .. }) {
                log.detail_finished();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEARCH: &str = "https://www.example.test/search";

    fn driver() -> MemoryDriver {
        let site = MemorySite::new(SEARCH)
            .with_batch(vec![
                MemoryCard::listing("/hotel/a.html", "€ 120"),
                MemoryCard::decoration(),
            ])
            .with_batch(vec![MemoryCard::listing("/hotel/b.html", "€ 90")])
            .with_detail(
                "https://www.example.test/hotel/a.html",
                MemoryDetail::listing("Hotel A", "41.38,2.17", "Carrer 1", "8.7"),
            )
            .with_detail("https://www.example.test/hotel/slow.html", MemoryDetail::Timeout)
            .with_detail(
                "https://www.example.test/hotel/late.html",
                MemoryDetail::slow(20, MemoryDetail::listing("Late", "1,2", "Street", "7")),
            )
            .with_detail("https://www.example.test/hotel/gone.html", MemoryDetail::Crashed);
        MemoryDriver::new(site, SelectorConfig::default())
    }

    #[tokio::test]
    async fn test_search_page_batches() {
        let driver = driver();
        let selectors = SelectorConfig::default();
        let page = driver
            .open_page(&format!("{}?ss=x", SEARCH), Duration::from_secs(1))
            .await
            .unwrap();

        let cards = page.query_all(&Locator::css(&selectors.card)).await.unwrap();
        assert_eq!(cards.len(), 2);

        let link = page
            .query_within(&cards[0], &selectors.card_link)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            page.attribute(&link, "href").await.unwrap().as_deref(),
            Some("/hotel/a.html")
        );
        assert!(page
            .query_within(&cards[1], &selectors.card_link)
            .await
            .unwrap()
            .is_none());

        let more = page
            .query_first(&Locator::css(&selectors.load_more))
            .await
            .unwrap()
            .unwrap();
        page.click(&more).await.unwrap();

        let cards = page.query_all(&Locator::css(&selectors.card)).await.unwrap();
        assert_eq!(cards.len(), 3);
        assert!(page
            .query_first(&Locator::css(&selectors.load_more))
            .await
            .unwrap()
            .is_none());
        assert_eq!(driver.load_more_clicks(), 1);
    }

    #[tokio::test]
    async fn test_detail_pages() {
        let driver = driver();
        let page = driver
            .open_page("https://www.example.test/hotel/a.html", Duration::from_secs(1))
            .await
            .unwrap();
        let title = page
            .query_first(&Locator::css(&SelectorConfig::default().title))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            page.text_content(&title).await.unwrap().as_deref(),
            Some("Hotel A")
        );
        assert_eq!(driver.pages_still_open(), 1);
        page.close().await.unwrap();
        page.close().await.unwrap();
        assert_eq!(driver.pages_still_open(), 0);
        assert!(matches!(
            page.current_url().await,
            Err(DriverError::Closed)
        ));

        let slow = driver
            .open_page("https://www.example.test/hotel/slow.html", Duration::from_secs(1))
            .await;
        assert!(matches!(slow, Err(DriverError::Timeout { .. })));

        let missing = driver
            .open_page("https://www.example.test/hotel/none.html", Duration::from_secs(1))
            .await;
        assert!(matches!(missing, Err(DriverError::Navigation { .. })));
        assert_eq!(driver.detail_attempts().len(), 3);
    }

    #[tokio::test]
    async fn test_slow_and_crashed_details() {
        let driver = driver();

        let late = driver
            .open_page("https://www.example.test/hotel/late.html", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(driver.pages_still_open(), 1);
        late.close().await.unwrap();

        let too_late = driver
            .open_page("https://www.example.test/hotel/late.html", Duration::from_millis(5))
            .await;
        assert!(matches!(too_late, Err(DriverError::Timeout { .. })));

        let gone = driver
            .open_page("https://www.example.test/hotel/gone.html", Duration::from_secs(1))
            .await;
        assert!(matches!(gone, Err(DriverError::Closed)));

        assert_eq!(driver.pages_still_open(), 0);
        assert_eq!(driver.peak_concurrent_details(), 1);
    }
}

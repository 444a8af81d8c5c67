//! Search-results pagination
//!
//! Drives the search page through repeated cycles of
//! "enumerate cards -> dispatch new listings -> click load more" until the
//! results run out, the card handler asks to stop, or the page fails.

use crate::config::{CrawlerConfig, SelectorConfig};
use crate::crawler::ListingReference;
use crate::driver::{BrowserPage, DriverError, Locator};
use crate::output::RunCounters;
use crate::state::{DedupStore, RunControl, TerminationReason};
use crate::HarvestError;
use async_trait::async_trait;
use std::time::Duration;

/// What the pagination engine should do after handing over a card
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardDisposition {
    Continue,
    /// The cap is reached (or the run is over); dispatch nothing more
    Stop,
}

/// Receives every new listing found on the search page
#[async_trait]
pub trait CardHandler: Send {
    async fn on_card(&mut self, reference: ListingReference) -> CardDisposition;
}

/// Card fields read from the search page, before resolution
#[derive(Debug, Clone, PartialEq, Eq)]
struct RawCard {
    href: String,
    price: Option<String>,
}

/// Paginates one search-results page
pub struct PaginationEngine<'a, P: BrowserPage> {
    page: &'a P,
    selectors: &'a SelectorConfig,
    timing: &'a CrawlerConfig,
    dedup: &'a DedupStore,
    control: &'a RunControl,
    counters: &'a RunCounters,
}

impl<'a, P: BrowserPage> PaginationEngine<'a, P> {
    pub fn new(
        page: &'a P,
        selectors: &'a SelectorConfig,
        timing: &'a CrawlerConfig,
        dedup: &'a DedupStore,
        control: &'a RunControl,
        counters: &'a RunCounters,
    ) -> Self {
        Self {
            page,
            selectors,
            timing,
            dedup,
            control,
            counters,
        }
    }

    /// Runs pagination cycles until the page is exhausted or dispatch stops
    ///
    /// Returns `Exhausted` when no "load more" control can be found or
    /// activated, and `MaxResultsReached` when the handler stops dispatch.
    /// Fails with [`HarvestError::RenderTimeout`] if a cycle renders no card.
    pub async fn run<H: CardHandler>(
        &self,
        handler: &mut H,
    ) -> Result<TerminationReason, HarvestError> {
        let mut cycle = 0usize;

        loop {
            if self.control.is_terminated() {
                return Ok(self.stop_reason());
            }

            cycle += 1;
            RunCounters::bump(&self.counters.pagination_cycles);
            self.wait_for_cards().await?;

            let cards = self
                .page
                .query_all(&Locator::css(&self.selectors.card))
                .await?;
            tracing::debug!("Cycle {}: {} cards rendered", cycle, cards.len());

            for card in &cards {
                if self.control.is_terminated() {
                    return Ok(self.stop_reason());
                }

                let Some(raw) = self.read_card(card).await? else {
                    RunCounters::bump(&self.counters.decorations_skipped);
                    continue;
                };

                let detail_url = match self.dedup.resolve(&raw.href) {
                    Ok(url) => url,
                    Err(e) => {
                        tracing::warn!("Skipping card with unusable link {}: {}", raw.href, e);
                        RunCounters::bump(&self.counters.decorations_skipped);
                        continue;
                    }
                };

                if !self.dedup.check_and_mark(detail_url.as_str())? {
                    RunCounters::bump(&self.counters.duplicates_skipped);
                    continue;
                }

                tracing::info!("Found listing: {}", detail_url);
                let reference = ListingReference::new(detail_url, raw.price);
                if handler.on_card(reference).await == CardDisposition::Stop {
                    tracing::info!("Dispatch stopped, no further pagination");
                    return Ok(self.stop_reason());
                }
            }

            self.page.scroll_to_bottom().await?;
            self.page
                .wait_timeout(Duration::from_millis(self.timing.scroll_settle))
                .await;

            if !self.load_more().await? {
                tracing::info!("No more results to load after {} cycles", cycle);
                return Ok(TerminationReason::Exhausted);
            }
        }
    }

    /// Reason reported when dispatch stops early
    fn stop_reason(&self) -> TerminationReason {
        match self.control.reason() {
            TerminationReason::None => TerminationReason::MaxResultsReached,
            reason => reason,
        }
    }

    async fn wait_for_cards(&self) -> Result<(), HarvestError> {
        let timeout_ms = self.timing.card_wait_timeout;
        match self
            .page
            .wait_for_selector(&self.selectors.card, Duration::from_millis(timeout_ms))
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if e.is_timeout() => Err(HarvestError::RenderTimeout {
                url: self.page.current_url().await.unwrap_or_default(),
                timeout_ms,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Reads link and price from one card; `None` for cards without a link
    async fn read_card(&self, card: &P::Element) -> Result<Option<RawCard>, DriverError> {
        let Some(link) = self.page.query_within(card, &self.selectors.card_link).await? else {
            return Ok(None);
        };
        let href = match self.page.attribute(&link, "href").await? {
            Some(href) if !href.trim().is_empty() => href,
            _ => return Ok(None),
        };

        let price = match self
            .page
            .query_within(card, &self.selectors.card_price)
            .await?
        {
            Some(price) => self.page.text_content(&price).await?,
            None => None,
        };

        Ok(Some(RawCard { href, price }))
    }

    /// Finds and clicks the "load more" control
    ///
    /// Returns false when the control is missing or the click fails; both
    /// count as the end of the results.
    async fn load_more(&self) -> Result<bool, DriverError> {
        let structural = Locator::css(&self.selectors.load_more);
        let control = match self.page.query_first(&structural).await? {
            Some(control) => control,
            None => {
                let by_text = Locator::with_text(
                    &self.selectors.load_more_fallback,
                    &self.selectors.load_more_text,
                );
                match self.page.query_first(&by_text).await? {
                    Some(control) => {
                        tracing::info!("Found '{}' control by text", self.selectors.load_more_text);
                        control
                    }
                    None => return Ok(false),
                }
            }
        };

        tracing::info!("Clicking load more to fetch further results");
        let clicked = match self.page.scroll_into_view(&control).await {
            Ok(()) => self.page.click(&control).await,
            Err(e) => Err(e),
        };
        if let Err(e) = clicked {
            tracing::warn!("Load more control could not be activated: {}", e);
            return Ok(false);
        }

        self.page
            .wait_timeout(Duration::from_millis(self.timing.load_more_settle))
            .await;
        // The next cycle's card wait catches a page that never settled
        if let Err(e) = self
            .page
            .wait_for_load(Duration::from_millis(self.timing.page_load_timeout))
            .await
        {
            tracing::debug!("Load state not reached after load more: {}", e);
        }
        Ok(true)
    }
}

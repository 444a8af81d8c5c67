//! Crawl coordinator - main harvest orchestration logic
//!
//! This module wires one crawl run together:
//! - Building the search URL and the run-scoped state
//! - Paginating the search page and dispatching detail fetches
//! - Draining in-flight fetches and deciding the final outcome
//! - Releasing every page it opened, whatever the outcome

use crate::config::{validate, Config, SelectorConfig};
use crate::crawler::extractor::fetch_detail;
use crate::crawler::pagination::{CardDisposition, CardHandler, PaginationEngine};
use crate::crawler::ListingReference;
use crate::driver::{BrowserPage, ChromeDriver, DriverError, RenderingDriver};
use crate::output::{CsvFeed, RecordFeed, RunCounters, RunSummary};
use crate::state::{
    CrawlPhase, DedupStore, OfferOutcome, ResultSink, ResultSlot, RunControl, TerminationReason,
};
use crate::url::{build_search_url, site_base_url};
use crate::HarvestError;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;

/// Everything a detail task needs, shared by all tasks of one run
struct DetailContext<D: RenderingDriver> {
    driver: Arc<D>,
    sink: ResultSink,
    dedup: DedupStore,
    control: Arc<RunControl>,
    counters: RunCounters,
    selectors: SelectorConfig,
    page_load_timeout: Duration,
}

/// Main crawl coordinator structure
pub struct Coordinator<D: RenderingDriver> {
    config: Arc<Config>,
    driver: Arc<D>,
    phase: CrawlPhase,
}

impl<D: RenderingDriver> Coordinator<D> {
    /// Creates a coordinator for one run
    ///
    /// The configuration is validated here, so a bad cap or bad dates fail
    /// before any page is opened.
    pub fn new(config: Config, driver: Arc<D>) -> Result<Self, HarvestError> {
        validate(&config)?;
        Ok(Self {
            config: Arc::new(config),
            driver,
            phase: CrawlPhase::Idle,
        })
    }

    pub fn phase(&self) -> CrawlPhase {
        self.phase
    }

    fn transition(&mut self, next: CrawlPhase) -> Result<(), HarvestError> {
        if !self.phase.can_transition_to(next) {
            return Err(HarvestError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        tracing::debug!("Phase {} -> {}", self.phase, next);
        self.phase = next;
        Ok(())
    }

    /// Runs the crawl and streams accepted records into `feed`
    ///
    /// Returns a summary for every outcome, including `FatalError`. An `Err`
    /// means the run could not be set up (bad configuration) or was already
    /// used.
    pub async fn run(&mut self, feed: Box<dyn RecordFeed>) -> Result<RunSummary, HarvestError> {
        let start_time = Instant::now();
        let config = Arc::clone(&self.config);

        let today = chrono::Local::now().date_naive();
        let search_url = build_search_url(&config, today)?;
        let control = Arc::new(RunControl::new());
        let max_results = config.search.max_results as usize;

        let ctx = Arc::new(DetailContext {
            driver: Arc::clone(&self.driver),
            sink: ResultSink::new(max_results, feed, Arc::clone(&control))?,
            dedup: DedupStore::new(site_base_url(&config)?),
            control: Arc::clone(&control),
            counters: RunCounters::new(),
            selectors: config.selectors.clone(),
            page_load_timeout: Duration::from_millis(config.crawler.page_load_timeout),
        });

        self.transition(CrawlPhase::Paginating)?;
        tracing::info!(
            "Starting harvest for '{}' (max {} results): {}",
            config.search.keyword,
            max_results,
            search_url
        );

        let mut dispatcher = DetailDispatcher {
            ctx: Arc::clone(&ctx),
            concurrency: Arc::new(Semaphore::new(config.crawler.max_concurrent_details as usize)),
            tasks: JoinSet::new(),
        };

        let mut fatal_error = None;
        match self.paginate(&ctx, search_url.as_str(), &mut dispatcher).await {
            Ok(reason) => tracing::info!("Pagination finished: {}", reason),
            Err(e) => {
                tracing::error!("Harvest aborted: {}", e);
                ctx.sink.terminate(TerminationReason::FatalError);
                fatal_error = Some(e.to_string());
            }
        }

        self.transition(CrawlPhase::DetailFetching)?;
        tracing::info!("Waiting for {} in-flight detail pages", dispatcher.tasks.len());
        if let Some(e) = dispatcher.drain().await {
            fatal_error.get_or_insert(e.to_string());
        }

        if let Err(e) = ctx.sink.finish() {
            tracing::error!("Failed to flush output: {}", e);
            ctx.sink.terminate(TerminationReason::FatalError);
            fatal_error.get_or_insert(e.to_string());
        }

        let (termination, phase) = if control.reason() == TerminationReason::FatalError {
            (TerminationReason::FatalError, CrawlPhase::FatalError)
        } else if ctx.sink.cap_reached() {
            (TerminationReason::MaxResultsReached, CrawlPhase::CapReached)
        } else {
            control.terminate(TerminationReason::Exhausted);
            (TerminationReason::Exhausted, CrawlPhase::Exhausted)
        };
        self.transition(phase)?;
        self.transition(CrawlPhase::Closed)?;

        let summary = RunSummary::from_counters(
            &ctx.counters,
            termination,
            ctx.sink.emitted(),
            max_results,
            start_time.elapsed(),
            fatal_error,
        );
        tracing::info!(
            "Harvest closed ({}): {} records in {:.1}s",
            summary.termination,
            summary.records_emitted,
            summary.duration.as_secs_f64()
        );

        Ok(summary)
    }

    /// Opens the search page, paginates it and always closes it again
    async fn paginate(
        &self,
        ctx: &DetailContext<D>,
        search_url: &str,
        dispatcher: &mut DetailDispatcher<D>,
    ) -> Result<TerminationReason, HarvestError> {
        let timeout = Duration::from_millis(self.config.crawler.page_load_timeout);
        let page = self.driver.open_page(search_url, timeout).await?;

        let engine = PaginationEngine::new(
            &page,
            &self.config.selectors,
            &self.config.crawler,
            &ctx.dedup,
            &ctx.control,
            &ctx.counters,
        );
        let result = engine.run(dispatcher).await;

        if let Err(e) = page.close().await {
            tracing::warn!("Failed to close search page: {}", e);
        }
        result
    }
}

/// Turns new listings into detail fetch tasks
struct DetailDispatcher<D: RenderingDriver> {
    ctx: Arc<DetailContext<D>>,
    concurrency: Arc<Semaphore>,
    tasks: JoinSet<Result<(), HarvestError>>,
}

impl<D: RenderingDriver> DetailDispatcher<D> {
    /// Waits for every spawned task; returns the first fatal error
    async fn drain(&mut self) -> Option<HarvestError> {
        let mut first_error = None;
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    tracing::error!("Detail task failed: {}", e);
                    RunCounters::bump(&self.ctx.counters.detail_failures);
                }
            }
        }
        first_error
    }
}

#[async_trait]
impl<D: RenderingDriver> CardHandler for DetailDispatcher<D> {
    async fn on_card(&mut self, reference: ListingReference) -> CardDisposition {
        let Some(slot) = self.ctx.sink.reserve().await else {
            return CardDisposition::Stop;
        };
        let Ok(permit) = Arc::clone(&self.concurrency).acquire_owned().await else {
            return CardDisposition::Stop;
        };
        if self.ctx.control.is_terminated() {
            return CardDisposition::Stop;
        }

        RunCounters::bump(&self.ctx.counters.cards_dispatched);
        let ctx = Arc::clone(&self.ctx);
        self.tasks
            .spawn(async move { fetch_and_offer(ctx, reference, slot, permit).await });

        CardDisposition::Continue
    }
}

/// Fetches one detail page and offers its record to the sink
///
/// Per-listing failures are logged and counted. Only a broken feed or a
/// vanished browser is returned as an error.
async fn fetch_and_offer<D: RenderingDriver>(
    ctx: Arc<DetailContext<D>>,
    reference: ListingReference,
    slot: ResultSlot,
    _permit: OwnedSemaphorePermit,
) -> Result<(), HarvestError> {
    if ctx.control.is_terminated() {
        return Ok(());
    }

    let url = reference.detail_url.as_str();
    let extraction = match fetch_detail(
        ctx.driver.as_ref(),
        &reference,
        &ctx.selectors,
        ctx.page_load_timeout,
    )
    .await
    {
        Ok(extraction) => extraction,
        Err(HarvestError::Driver(DriverError::Closed)) => {
            ctx.sink.terminate(TerminationReason::FatalError);
            return Err(HarvestError::Driver(DriverError::Closed));
        }
        Err(e) => {
            tracing::warn!("Skipping listing {}: {}", url, e);
            RunCounters::bump(&ctx.counters.detail_failures);
            return Ok(());
        }
    };

    for warning in &extraction.warnings {
        tracing::warn!("{}: {}", url, warning);
    }
    RunCounters::add(&ctx.counters.field_warnings, extraction.warnings.len());

    let record = extraction.record;
    if ctx.control.is_terminated() {
        tracing::debug!("Run already terminated, discarding {}", record.url);
        RunCounters::bump(&ctx.counters.records_discarded);
        return Ok(());
    }
    if !ctx.dedup.mark_record(&record.url) {
        tracing::info!("Record for {} already emitted, skipping", record.url);
        RunCounters::bump(&ctx.counters.duplicates_skipped);
        return Ok(());
    }

    let name = record.name.clone();
    match ctx.sink.offer(record, slot) {
        Ok(OfferOutcome::Accepted { emitted }) => {
            tracing::info!(
                "Property extracted ({}/{}): {}",
                emitted,
                ctx.sink.max_results(),
                name
            );
            Ok(())
        }
        Ok(outcome) => {
            tracing::debug!("Record for {} rejected: {:?}", url, outcome);
            RunCounters::bump(&ctx.counters.records_discarded);
            Ok(())
        }
        Err(e) => {
            ctx.sink.terminate(TerminationReason::FatalError);
            Err(e.into())
        }
    }
}

/// Runs a complete harvest against a real browser
///
/// Launches Chromium, writes records to the configured CSV file and shuts the
/// browser down whatever the outcome.
pub async fn run_crawl(config: Config) -> Result<RunSummary, HarvestError> {
    validate(&config)?;
    let feed = CsvFeed::create(Path::new(&config.output.csv_path))?;
    let driver = Arc::new(ChromeDriver::launch(&config.crawler, &config.identity).await?);

    let result = match Coordinator::new(config, Arc::clone(&driver)) {
        Ok(mut coordinator) => coordinator.run(Box::new(feed)).await,
        Err(e) => Err(e),
    };

    if let Err(e) = driver.shutdown().await {
        tracing::warn!("Browser shutdown failed: {}", e);
    }
    result
}

//! Run statistics
//!
//! Counters are bumped from the pagination engine and from concurrent detail
//! tasks, then frozen into a [`RunSummary`] when the run closes.

use crate::state::TerminationReason;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Live counters shared by all tasks of one run
#[derive(Debug, Default)]
pub struct RunCounters {
    pub cards_dispatched: AtomicUsize,
    pub duplicates_skipped: AtomicUsize,
    pub decorations_skipped: AtomicUsize,
    pub detail_failures: AtomicUsize,
    pub field_warnings: AtomicUsize,
    pub records_discarded: AtomicUsize,
    pub pagination_cycles: AtomicUsize,
}

impl RunCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicUsize, amount: usize) {
        counter.fetch_add(amount, Ordering::Relaxed);
    }
}

/// Final statistics of one crawl run
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Why the run ended (never `None` once the run is closed)
    pub termination: TerminationReason,

    /// Records accepted by the result sink
    pub records_emitted: usize,

    /// The configured cap
    pub max_results: usize,

    pub cards_dispatched: usize,
    pub duplicates_skipped: usize,
    pub decorations_skipped: usize,

    /// Detail pages that produced no record
    pub detail_failures: usize,

    /// Fields that degraded to empty/null values
    pub field_warnings: usize,

    /// Records finished after termination and dropped
    pub records_discarded: usize,

    pub pagination_cycles: usize,

    pub duration: Duration,

    /// Message of the error that ended a `FatalError` run
    pub fatal_error: Option<String>,
}

impl RunSummary {
    /// Builds a summary from the live counters
    pub fn from_counters(
        counters: &RunCounters,
        termination: TerminationReason,
        records_emitted: usize,
        max_results: usize,
        duration: Duration,
        fatal_error: Option<String>,
    ) -> Self {
        let read = |counter: &AtomicUsize| counter.load(Ordering::Relaxed);

        Self {
            termination,
            records_emitted,
            max_results,
            cards_dispatched: read(&counters.cards_dispatched),
            duplicates_skipped: read(&counters.duplicates_skipped),
            decorations_skipped: read(&counters.decorations_skipped),
            detail_failures: read(&counters.detail_failures),
            field_warnings: read(&counters.field_warnings),
            records_discarded: read(&counters.records_discarded),
            pagination_cycles: read(&counters.pagination_cycles),
            duration,
            fatal_error,
        }
    }

    /// Share of dispatched detail pages that became records, as a percentage
    pub fn success_rate(&self) -> f64 {
        if self.cards_dispatched == 0 {
            return 0.0;
        }
        (self.records_emitted as f64 / self.cards_dispatched as f64) * 100.0
    }

    pub fn is_fatal(&self) -> bool {
        self.termination == TerminationReason::FatalError
    }
}

/// Prints a run summary to stdout in a formatted manner
pub fn print_run_summary(summary: &RunSummary) {
    println!("=== Harvest Summary ===\n");

    println!("Termination: {}", summary.termination);
    if let Some(error) = &summary.fatal_error {
        println!("  Cause: {}", error);
    }
    println!();

    println!("Records:");
    println!(
        "  Emitted: {} (cap {})",
        summary.records_emitted, summary.max_results
    );
    println!("  Discarded after termination: {}", summary.records_discarded);
    println!("  Field warnings: {}", summary.field_warnings);
    println!();

    println!("Search Results:");
    println!("  Pagination cycles: {}", summary.pagination_cycles);
    println!("  Detail pages dispatched: {}", summary.cards_dispatched);
    println!("  Duplicate cards skipped: {}", summary.duplicates_skipped);
    println!("  Cards without a link: {}", summary.decorations_skipped);
    println!("  Failed detail pages: {}", summary.detail_failures);
    println!();

    println!(
        "Success Rate: {:.1}% ({} / {} detail pages) in {:.1}s",
        summary.success_rate(),
        summary.records_emitted,
        summary.cards_dispatched,
        summary.duration.as_secs_f64()
    );
}

//! Orchestrator phases of one crawl run
//!
//! Runs move `Idle -> Paginating -> DetailFetching -> terminal -> Closed`.
//! `Paginating` may also jump straight to a terminal phase when nothing is in
//! flight.

use std::fmt;

/// Represents the current phase of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlPhase {
    // ===== Active Phases =====
    /// Run created, browser not touched yet
    Idle,

    /// Search page is being paginated; detail fetches run alongside
    Paginating,

    /// Pagination stopped; waiting for in-flight detail fetches
    DetailFetching,

    // ===== Terminal Phases =====
    /// No further "load more" control
    Exhausted,

    /// The result cap was reached
    CapReached,

    /// The run aborted on an unrecoverable error
    FatalError,

    /// Resources released
    Closed,
}

impl CrawlPhase {
    /// Returns true if the run has reached an outcome
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Exhausted | Self::CapReached | Self::FatalError | Self::Closed
        )
    }

    /// Returns true if work may still be in progress
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Paginating | Self::DetailFetching)
    }

    /// Checks whether moving to `next` is allowed
    pub fn can_transition_to(&self, next: CrawlPhase) -> bool {
        use CrawlPhase::*;
        match (self, next) {
            (Idle, Paginating) => true,
            // The search page may fail before pagination starts
            (Idle, FatalError) => true,
            (Paginating, DetailFetching) => true,
            (Paginating | DetailFetching, Exhausted | CapReached | FatalError) => true,
            (Exhausted | CapReached | FatalError, Closed) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Paginating => "paginating",
            Self::DetailFetching => "detail_fetching",
            Self::Exhausted => "exhausted",
            Self::CapReached => "cap_reached",
            Self::FatalError => "fatal_error",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for CrawlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

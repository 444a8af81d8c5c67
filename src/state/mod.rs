//! State module for tracking crawl progress
//!
//! This module provides the run-scoped shared state of one crawl.
//!
//! # Components
//!
//! - `CrawlPhase`: Orchestrator state machine (idle, paginating, draining, terminal)
//! - `RunControl`: Termination flag and the reason that tripped it
//! - `DedupStore`: At-most-once dispatch of detail URLs
//! - `ResultSink`: Capped, serialized hand-off of records to the feed

mod control;
mod dedup;
mod phase;
mod sink;

// Re-export main types
pub use control::{RunControl, TerminationReason};
pub use dedup::DedupStore;
pub use phase::CrawlPhase;
pub use sink::{OfferOutcome, ResultSink, ResultSlot};

//! Output module for emitted records and run reports
//!
//! This module handles:
//! - The record feed boundary (`RecordFeed`) and its CSV and in-memory feeds
//! - Run counters and the end-of-run summary

mod csv_feed;
pub mod stats;
mod traits;

pub use csv_feed::CsvFeed;
pub use stats::{print_run_summary, RunCounters, RunSummary};
pub use traits::{CollectingFeed, OutputError, OutputResult, RecordFeed};

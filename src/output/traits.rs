//! Output feed trait and error types
//!
//! Completed records leave the crawler through a [`RecordFeed`]. The result
//! sink is the only caller, so implementations see records one at a time in
//! emission order.

use crate::crawler::PropertyRecord;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to write output: {0}")]
    Write(String),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Destination for emitted property records
pub trait RecordFeed: Send {
    /// Appends one record
    fn write_record(&mut self, record: &PropertyRecord) -> OutputResult<()>;

    /// Flushes buffered records
    fn flush(&mut self) -> OutputResult<()>;
}

/// Feed that keeps records in memory
///
/// Clones share the same buffer, so a caller can hand one clone to the crawl
/// and read the records back from another.
#[derive(Debug, Clone, Default)]
pub struct CollectingFeed {
    records: Arc<Mutex<Vec<PropertyRecord>>>,
}

impl CollectingFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the records written so far
    pub fn records(&self) -> Vec<PropertyRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl RecordFeed for CollectingFeed {
    fn write_record(&mut self, record: &PropertyRecord) -> OutputResult<()> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }

    fn flush(&mut self) -> OutputResult<()> {
        Ok(())
    }
}

//! Capped, serialized record emission
//!
//! Every detail fetch holds a [`ResultSlot`] while it runs. There are exactly
//! `max_results` slots: an accepted record consumes its slot for good, a
//! failed fetch hands it back. No more fetches can be in flight than records
//! still missing, and the feed never sees more than `max_results` records.

use super::control::{RunControl, TerminationReason};
use crate::crawler::PropertyRecord;
use crate::output::{OutputResult, RecordFeed};
use crate::ConfigError;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Permission to produce one record
///
/// Dropping a slot without offering a record returns it to the pool.
#[derive(Debug)]
pub struct ResultSlot {
    permit: OwnedSemaphorePermit,
}

/// What happened to an offered record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferOutcome {
    /// Written to the feed; `emitted` is the new total
    Accepted { emitted: usize },

    /// The cap was already reached
    RejectedCapReached,

    /// The run was terminated before the record arrived
    RejectedTerminated,
}

impl OfferOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

struct SinkInner {
    feed: Box<dyn RecordFeed>,
    emitted: usize,
}

/// Single point where records leave the crawl
pub struct ResultSink {
    max_results: usize,
    slots: Arc<Semaphore>,
    inner: Mutex<SinkInner>,
    control: Arc<RunControl>,
}

impl ResultSink {
    pub fn new(
        max_results: usize,
        feed: Box<dyn RecordFeed>,
        control: Arc<RunControl>,
    ) -> Result<Self, ConfigError> {
        if max_results == 0 {
            return Err(ConfigError::Validation(
                "max_results must be at least 1".to_string(),
            ));
        }
        if max_results > Semaphore::MAX_PERMITS {
            return Err(ConfigError::Validation(format!(
                "max_results must be at most {}",
                Semaphore::MAX_PERMITS
            )));
        }

        Ok(Self {
            max_results,
            slots: Arc::new(Semaphore::new(max_results)),
            inner: Mutex::new(SinkInner { feed, emitted: 0 }),
            control,
        })
    }

    fn inner(&self) -> MutexGuard<'_, SinkInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Waits for a free result slot
    ///
    /// Returns `None` once the run is terminated or the cap is reached.
    pub async fn reserve(&self) -> Option<ResultSlot> {
        if self.control.is_terminated() {
            return None;
        }
        let permit = Arc::clone(&self.slots).acquire_owned().await.ok()?;
        if self.control.is_terminated() {
            return None;
        }
        Some(ResultSlot { permit })
    }

    /// Offers a completed record
    ///
    /// The cap check, the feed write and the counter update happen under one
    /// lock. The record that reaches the cap trips the run control. A feed
    /// error leaves the counter untouched and is returned to the caller.
    pub fn offer(&self, record: PropertyRecord, slot: ResultSlot) -> OutputResult<OfferOutcome> {
        let mut inner = self.inner();

        if inner.emitted >= self.max_results {
            return Ok(OfferOutcome::RejectedCapReached);
        }
        if self.control.is_terminated() {
            return Ok(OfferOutcome::RejectedTerminated);
        }

        inner.feed.write_record(&record)?;
        inner.emitted += 1;
        slot.permit.forget();

        let emitted = inner.emitted;
        tracing::debug!(url = %record.url, emitted, "Record accepted");

        if emitted == self.max_results {
            tracing::info!(max_results = self.max_results, "Result cap reached");
            self.control.terminate(TerminationReason::MaxResultsReached);
            self.slots.close();
        }

        Ok(OfferOutcome::Accepted { emitted })
    }

    /// Stops the run: later offers are rejected, waiting reservations fail
    pub fn terminate(&self, reason: TerminationReason) {
        if self.control.terminate(reason) {
            tracing::warn!(%reason, "Run terminated");
        }
        self.slots.close();
    }

    pub fn emitted(&self) -> usize {
        self.inner().emitted
    }

    pub fn max_results(&self) -> usize {
        self.max_results
    }

    pub fn cap_reached(&self) -> bool {
        self.emitted() >= self.max_results
    }

    /// Flushes the underlying feed
    pub fn finish(&self) -> OutputResult<()> {
        self.inner().feed.flush()
    }
}

//! At-most-once bookkeeping for listing links and emitted records

use crate::url::resolve_listing_url;
use crate::UrlError;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use url::Url;

#[derive(Debug, Default)]
struct Seen {
    links: HashSet<String>,
    records: HashSet<String>,
}

/// Tracks which detail URLs were dispatched and which records were emitted
///
/// Links are compared after resolving them against the site base URL, so the
/// relative and absolute forms of one link collide.
#[derive(Debug)]
pub struct DedupStore {
    base: Url,
    seen: Mutex<Seen>,
}

impl DedupStore {
    pub fn new(base: Url) -> Self {
        Self {
            base,
            seen: Mutex::new(Seen::default()),
        }
    }

    fn seen(&self) -> MutexGuard<'_, Seen> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolves a raw card link to the URL the store compares
    pub fn resolve(&self, link: &str) -> Result<Url, UrlError> {
        resolve_listing_url(&self.base, link)
    }

    /// Marks a link as seen
    ///
    /// Returns `Ok(true)` the first time a link is offered, `Ok(false)` on
    /// every later call. The test and the insert happen under one lock.
    pub fn check_and_mark(&self, link: &str) -> Result<bool, UrlError> {
        let url = self.resolve(link)?;
        Ok(self.seen().links.insert(url.into()))
    }

    /// Marks the URL of a completed record; false if it was already emitted
    pub fn mark_record(&self, url: &str) -> bool {
        self.seen().records.insert(url.to_string())
    }

    pub fn is_seen(&self, link: &str) -> bool {
        match self.resolve(link) {
            Ok(url) => self.seen().links.contains(url.as_str()),
            Err(_) => false,
        }
    }

    /// Number of distinct links seen
    pub fn len(&self) -> usize {
        self.seen().links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//! Rendering driver contract
//!
//! The crawl core never talks to a browser directly. It consumes the
//! [`RenderingDriver`] and [`BrowserPage`] traits defined here:
//! - `chrome`: binding to a headless Chromium through chromiumoxide
//! - `memory`: in-memory replay of a fixed site for tests, compiled with the
//!   `test-support` feature
//! - `identity`: user-agent rotation applied to every opened page

mod chrome;
mod identity;
#[cfg(any(test, feature = "test-support"))]
pub mod memory;

pub use chrome::{ChromeDriver, ChromePage};
pub use identity::UserAgentRotator;
#[cfg(any(test, feature = "test-support"))]
pub use memory::{MemoryCard, MemoryDetail, MemoryDriver, MemorySite};

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a rendering driver
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Failed to launch browser: {0}")]
    Launch(String),

    #[error("Timed out after {timeout_ms}ms waiting for {what}")]
    Timeout { what: String, timeout_ms: u64 },

    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("Browser protocol error: {0}")]
    Protocol(String),

    #[error("Page or browser already closed")]
    Closed,
}

impl DriverError {
    /// Returns true if this error is a bounded wait that expired
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Result type for driver operations
pub type DriverResult<T> = Result<T, DriverError>;

/// How to find elements on a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// Plain CSS selector
    Css(String),

    /// CSS selector narrowed to elements whose text contains `text`
    CssWithText { css: String, text: String },
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    pub fn with_text(css: impl Into<String>, text: impl Into<String>) -> Self {
        Self::CssWithText {
            css: css.into(),
            text: text.into(),
        }
    }

    /// The CSS part of the locator
    pub fn css_selector(&self) -> &str {
        match self {
            Self::Css(css) | Self::CssWithText { css, .. } => css,
        }
    }
}

/// One rendered page, isolated in its own browser context
#[async_trait]
pub trait BrowserPage: Send + Sync {
    /// Handle to a DOM node on this page
    type Element: Send + Sync;

    /// The page's current absolute URL
    async fn current_url(&self) -> DriverResult<String>;

    /// Waits until at least one element matches `selector`
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> DriverResult<()>;

    /// Waits for the current document to finish loading
    async fn wait_for_load(&self, timeout: Duration) -> DriverResult<()>;

    /// All matching elements, in document order
    async fn query_all(&self, locator: &Locator) -> DriverResult<Vec<Self::Element>>;

    /// The first matching element, if any
    async fn query_first(&self, locator: &Locator) -> DriverResult<Option<Self::Element>> {
        Ok(self.query_all(locator).await?.into_iter().next())
    }

    /// First descendant of `parent` matching `selector`
    async fn query_within(
        &self,
        parent: &Self::Element,
        selector: &str,
    ) -> DriverResult<Option<Self::Element>>;

    async fn attribute(&self, element: &Self::Element, name: &str) -> DriverResult<Option<String>>;

    async fn text_content(&self, element: &Self::Element) -> DriverResult<Option<String>>;

    /// Calls a JavaScript function with `this` bound to `element`
    async fn evaluate(
        &self,
        element: &Self::Element,
        function: &str,
    ) -> DriverResult<serde_json::Value>;

    async fn scroll_into_view(&self, element: &Self::Element) -> DriverResult<()>;

    async fn click(&self, element: &Self::Element) -> DriverResult<()>;

    async fn scroll_to_bottom(&self) -> DriverResult<()>;

    /// Fixed settle pause
    async fn wait_timeout(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    /// Closes the page and releases its browser context
    async fn close(&self) -> DriverResult<()>;
}

/// Opens isolated pages on a browser
#[async_trait]
pub trait RenderingDriver: Send + Sync + 'static {
    type Page: BrowserPage + 'static;

    /// Opens `url` in a fresh browser context and waits for navigation
    ///
    /// Fails with [`DriverError::Timeout`] when navigation does not finish in
    /// `timeout`.
    async fn open_page(&self, url: &str, timeout: Duration) -> DriverResult<Self::Page>;

    /// Shuts the browser down
    async fn shutdown(&self) -> DriverResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_css_selector() {
        assert_eq!(Locator::css("div.card").css_selector(), "div.card");
        assert_eq!(
            Locator::with_text("button", "Load more results").css_selector(),
            "button"
        );
    }

    #[test]
    fn test_timeout_classification() {
        let timeout = DriverError::Timeout {
            what: "body".to_string(),
            timeout_ms: 10,
        };
        assert!(timeout.is_timeout());
        assert!(!DriverError::Closed.is_timeout());
    }
}

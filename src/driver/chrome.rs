//! Headless Chromium binding for the rendering driver contract
//!
//! Every page is opened in its own browser context so that cookies and DOM
//! state of one listing never leak into another. The context is disposed when
//! the page is closed.

use crate::config::{CrawlerConfig, IdentityConfig};
use crate::driver::{
    BrowserPage, DriverError, DriverResult, Locator, RenderingDriver, UserAgentRotator,
};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::element::Element;
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Interval between DOM polls while waiting for a selector
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Returns true if the CDP connection to the browser is gone
fn is_disconnect(e: &CdpError) -> bool {
    matches!(
        e,
        CdpError::Ws(_) | CdpError::ChannelSendError(_) | CdpError::NoResponse
    )
}

impl From<CdpError> for DriverError {
    fn from(e: CdpError) -> Self {
        if is_disconnect(&e) {
            tracing::debug!("Browser connection lost: {}", e);
            return DriverError::Closed;
        }
        DriverError::Protocol(e.to_string())
    }
}

/// Rendering driver backed by a launched Chromium process
pub struct ChromeDriver {
    browser: Arc<Mutex<Browser>>,
    handler_task: JoinHandle<()>,
    identity: UserAgentRotator,
}

impl ChromeDriver {
    /// Launches Chromium and starts its CDP event loop
    pub async fn launch(crawler: &CrawlerConfig, identity: &IdentityConfig) -> DriverResult<Self> {
        let mut builder = BrowserConfig::builder();
        if !crawler.headless {
            builder = builder.with_head();
        }
        let browser_config = builder.build().map_err(DriverError::Launch)?;

        tracing::info!(
            "Launching Chromium ({})",
            if crawler.headless { "headless" } else { "headful" }
        );
        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| DriverError::Launch(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::warn!("Browser handler event error: {}", e);
                }
            }
            tracing::debug!("Browser handler loop finished");
        });

        Ok(Self {
            browser: Arc::new(Mutex::new(browser)),
            handler_task,
            identity: UserAgentRotator::new(identity),
        })
    }

    async fn dispose_context(&self, context_id: BrowserContextId) {
        let browser = self.browser.lock().await;
        if let Err(e) = browser
            .execute(DisposeBrowserContextParams::new(context_id))
            .await
        {
            tracing::debug!("Failed to dispose browser context: {}", e);
        }
    }
}

#[async_trait]
impl RenderingDriver for ChromeDriver {
    type Page = ChromePage;

    async fn open_page(&self, url: &str, timeout: Duration) -> DriverResult<ChromePage> {
        let (page, context_id) = {
            let browser = self.browser.lock().await;
            let context_id = browser
                .execute(CreateBrowserContextParams::default())
                .await?
                .result
                .browser_context_id;

            let params = CreateTargetParams::builder()
                .url("about:blank")
                .browser_context_id(context_id.clone())
                .build()
                .map_err(DriverError::Protocol)?;

            let opened = browser.new_page(params).await;
            drop(browser);

            match opened {
                Ok(page) => (page, context_id),
                Err(e) => {
                    self.dispose_context(context_id).await;
                    return Err(e.into());
                }
            }
        };

        let chrome_page = ChromePage {
            page,
            context_id,
            browser: Arc::clone(&self.browser),
        };

        if let Some(user_agent) = self.identity.pick() {
            if let Err(e) = chrome_page
                .page
                .set_user_agent(SetUserAgentOverrideParams::new(user_agent))
                .await
            {
                tracing::warn!("Failed to set user agent for {}: {}", url, e);
            }
        }

        let navigation = tokio::time::timeout(timeout, chrome_page.page.goto(url)).await;
        let failure = match navigation {
            Ok(Ok(_)) => return Ok(chrome_page),
            Ok(Err(e)) if is_disconnect(&e) => DriverError::Closed,
            Ok(Err(e)) => DriverError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            },
            Err(_) => DriverError::Timeout {
                what: format!("navigation to {}", url),
                timeout_ms: timeout.as_millis() as u64,
            },
        };

        if let Err(e) = chrome_page.close().await {
            tracing::debug!("Failed to close page after navigation failure: {}", e);
        }
        Err(failure)
    }

    async fn shutdown(&self) -> DriverResult<()> {
        let mut browser = self.browser.lock().await;
        let result = browser.close().await;
        if let Err(e) = browser.wait().await {
            tracing::debug!("Failed to wait for browser exit: {}", e);
        }
        self.handler_task.abort();
        result.map(|_| ()).map_err(DriverError::from)
    }
}

/// One Chromium tab living in its own browser context
pub struct ChromePage {
    page: Page,
    context_id: BrowserContextId,
    browser: Arc<Mutex<Browser>>,
}

#[async_trait]
impl BrowserPage for ChromePage {
    type Element = Element;

    async fn current_url(&self) -> DriverResult<String> {
        self.page
            .url()
            .await?
            .ok_or_else(|| DriverError::Protocol("page has no URL".to_string()))
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> DriverResult<()> {
        let poll = async {
            loop {
                match self.page.find_elements(selector).await {
                    Ok(elements) if !elements.is_empty() => return Ok(()),
                    Err(e) if is_disconnect(&e) => return Err(DriverError::Closed),
                    _ => {}
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        };

        match tokio::time::timeout(timeout, poll).await {
            Ok(result) => result,
            Err(_) => Err(DriverError::Timeout {
                what: format!("selector {}", selector),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    async fn wait_for_load(&self, timeout: Duration) -> DriverResult<()> {
        match tokio::time::timeout(timeout, self.page.wait_for_navigation()).await {
            Ok(result) => result.map(|_| ()).map_err(DriverError::from),
            Err(_) => Err(DriverError::Timeout {
                what: "document load".to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    async fn query_all(&self, locator: &Locator) -> DriverResult<Vec<Element>> {
        let elements = self.page.find_elements(locator.css_selector()).await?;

        match locator {
            Locator::Css(_) => Ok(elements),
            Locator::CssWithText { text, .. } => {
                let mut matching = Vec::new();
                for element in elements {
                    let inner = element.inner_text().await?.unwrap_or_default();
                    if inner.contains(text.as_str()) {
                        matching.push(element);
                    }
                }
                Ok(matching)
            }
        }
    }

    async fn query_within(
        &self,
        parent: &Element,
        selector: &str,
    ) -> DriverResult<Option<Element>> {
        Ok(parent.find_elements(selector).await?.into_iter().next())
    }

    async fn attribute(&self, element: &Element, name: &str) -> DriverResult<Option<String>> {
        Ok(element.attribute(name).await?)
    }

    async fn text_content(&self, element: &Element) -> DriverResult<Option<String>> {
        let value = self
            .evaluate(element, "function() { return this.textContent; }")
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn evaluate(&self, element: &Element, function: &str) -> DriverResult<serde_json::Value> {
        let returns = element.call_js_fn(function, false).await?;
        Ok(returns.result.value.unwrap_or(serde_json::Value::Null))
    }

    async fn scroll_into_view(&self, element: &Element) -> DriverResult<()> {
        element.scroll_into_view().await?;
        Ok(())
    }

    async fn click(&self, element: &Element) -> DriverResult<()> {
        element.click().await?;
        Ok(())
    }

    async fn scroll_to_bottom(&self) -> DriverResult<()> {
        self.page
            .evaluate("window.scrollTo(0, document.body.scrollHeight)")
            .await?;
        Ok(())
    }

    async fn close(&self) -> DriverResult<()> {
        let closed = self.page.clone().close().await;

        let browser = self.browser.lock().await;
        if let Err(e) = browser
            .execute(DisposeBrowserContextParams::new(self.context_id.clone()))
            .await
        {
            tracing::debug!("Failed to dispose browser context: {}", e);
        }

        closed.map_err(DriverError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lost_connection_maps_to_closed() {
        assert!(matches!(
            DriverError::from(CdpError::NoResponse),
            DriverError::Closed
        ));
    }

    #[test]
    fn test_page_errors_stay_protocol_errors() {
        let error = DriverError::from(CdpError::ChromeMessage("node detached".to_string()));
        assert!(matches!(error, DriverError::Protocol(ref m) if m.contains("node detached")));
        assert!(matches!(
            DriverError::from(CdpError::NotFound),
            DriverError::Protocol(_)
        ));
    }
}

//! Headless Chromium page fetcher.
//!
//! Every fetch launches its own browser process so a poisoned session (captcha
//! page, crashed renderer, stuck navigation) never leaks into the next URL. The
//! process is closed on every exit path before the result is returned.

use super::{FetchedPage, PageFetcher, SelectorSet};
use crate::config::BrowserSettings;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::{
    Headers, SetExtraHttpHeadersParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, NavigateParams,
};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::{Stream, StreamExt};
use serde_json::json;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";
const ACCEPT_LANGUAGE: &str = "ru-RU,ru;q=0.9,en-US;q=0.8,en;q=0.7";

/// Runs before any page script: hides the automation flags headless Chrome exposes
const STEALTH_SCRIPT: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => false });
Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
Object.defineProperty(navigator, 'languages', { get: () => ['ru-RU', 'ru', 'en-US', 'en'] });
window.chrome = { runtime: {} };
"#;

const POLL_INTERVAL: Duration = Duration::from_millis(1000);
/// Extra settle time once cards are present, for lazily filled odds cells
const SETTLE_DELAY: Duration = Duration::from_millis(1000);

pub struct ChromeFetcher {
    settings: BrowserSettings,
    selectors: SelectorSet,
}

impl ChromeFetcher {
    pub fn new(settings: BrowserSettings, selectors: SelectorSet) -> Self {
        Self {
            settings,
            selectors,
        }
    }

    fn browser_config(&self) -> Result<BrowserConfig> {
        BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-setuid-sandbox")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--window-size=1920,1080")
            .window_size(1920, 1080)
            .request_timeout(self.settings.navigation_timeout)
            .build()
            .map_err(|e| anyhow!("Invalid browser config: {}", e))
    }

    async fn load(&self, browser: &Browser, url: &str) -> Result<FetchedPage> {
        let page = browser
            .new_page("about:blank")
            .await
            .context("Failed to open tab")?;

        let user_agent = SetUserAgentOverrideParams::builder()
            .user_agent(USER_AGENT)
            .accept_language(ACCEPT_LANGUAGE)
            .build()
            .map_err(|e| anyhow!("Invalid user agent override: {}", e))?;
        page.set_user_agent(user_agent).await?;
        page.evaluate_on_new_document(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_SCRIPT))
            .await?;
        page.execute(SetExtraHttpHeadersParams::new(Headers::new(json!({
            "Accept-Language": ACCEPT_LANGUAGE,
            "Accept": "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
            "Upgrade-Insecure-Requests": "1",
        }))))
        .await?;

        debug!("Navigating to {}", url);
        page.execute(NavigateParams::new(url))
            .await
            .with_context(|| format!("Navigation to {} failed", url))?;

        // DOMContentLoaded is enough: heavy pages rarely reach network idle
        self.wait_until(&page, "document.readyState !== 'loading'", self.settings.navigation_timeout)
            .await
            .context("DOM never finished loading")?;

        let items_found = self.wait_for_items(&page).await?;
        if items_found {
            tokio::time::sleep(SETTLE_DELAY).await;
        }

        let html = page.content().await.context("Failed to read page content")?;
        Ok(FetchedPage { html, items_found })
    }

    /// Poll for match cards under any of the item selectors
    async fn wait_for_items(&self, page: &Page) -> Result<bool> {
        let selectors = serde_json::to_string(self.selectors.items)?;
        let expr = format!(
            "{}.reduce((n, s) => n || document.querySelectorAll(s).length, 0)",
            selectors
        );
        let deadline = Instant::now() + self.settings.element_wait;
        loop {
            let count: u64 = page.evaluate(expr.as_str()).await?.into_value()?;
            if count > 0 {
                info!("Found {} match items", count);
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn wait_until(&self, page: &Page, condition: &str, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let ready: bool = page.evaluate(condition).await?.into_value()?;
            if ready {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(anyhow!("Timed out after {:?} waiting for `{}`", timeout, condition));
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }
}

/// Pump CDP events until the connection closes. Unrecognised messages come
/// through as errors and must not stop the pump.
async fn drain_handler<S, T, E>(events: &mut S) -> usize
where
    S: Stream<Item = std::result::Result<T, E>> + Unpin,
    E: std::fmt::Display,
{
    let mut errors = 0;
    while let Some(event) = events.next().await {
        if let Err(e) = event {
            errors += 1;
            debug!("Browser handler: {}", e);
        }
    }
    errors
}

#[async_trait]
impl PageFetcher for ChromeFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        info!("Launching browser for {}", url);
        let (mut browser, mut handler) = Browser::launch(self.browser_config()?)
            .await
            .context("Failed to launch browser")?;

        let handler_task = tokio::spawn(async move { drain_handler(&mut handler).await });

        // Hard cap on the whole session on top of the per-step timeouts
        let budget = self.settings.navigation_timeout + self.settings.element_wait * 2;
        let result = match tokio::time::timeout(budget, self.load(&browser, url)).await {
            Ok(result) => result,
            Err(_) => Err(anyhow!("Page session exceeded {:?}", budget)),
        };

        if let Err(e) = browser.close().await {
            warn!("Browser close failed: {}", e);
        }
        if let Err(e) = browser.wait().await {
            warn!("Browser process did not exit cleanly: {}", e);
        }
        handler_task.abort();

        result
    }
}

//! Headless Chromium page source.
//!
//! Every render launches its own browser and tears it down before returning.
//! Instead of sleeping a fixed delay after navigation, the DOM is polled
//! until it has finished loading and stopped changing, up to a cap.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::config::ExtractorConfig;
use crate::extractor::{ExtractError, PageSource, RenderedPage};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

const SNAPSHOT_SCRIPT: &str = r#"JSON.stringify({
    ready: document.readyState === "complete",
    size: document.body ? document.body.innerHTML.length : 0
})"#;

/// Find a Chromium or Chrome executable on the system PATH.
pub fn find_chromium() -> Option<PathBuf> {
    ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"]
        .into_iter()
        .find_map(|name| which::which(name).ok())
}

/// A point-in-time reading of the page's load state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct DomSnapshot {
    pub ready: bool,
    pub size: usize,
}

/// Polls `sample` until the document is complete and two consecutive
/// snapshots agree. Returns `false` when `limit` runs out first.
pub async fn wait_for_stable<F, Fut>(
    interval: Duration,
    limit: Duration,
    mut sample: F,
) -> Result<bool, ExtractError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<DomSnapshot, ExtractError>>,
{
    let deadline = Instant::now() + limit;
    let mut previous: Option<DomSnapshot> = None;

    loop {
        let current = sample().await?;
        if current.ready && previous == Some(current) {
            return Ok(true);
        }
        if Instant::now() + interval > deadline {
            return Ok(false);
        }
        previous = Some(current);
        tokio::time::sleep(interval).await;
    }
}

pub struct ChromiumSource {
    executable: Option<PathBuf>,
    settle_timeout: Duration,
}

impl ChromiumSource {
    pub fn new(config: &ExtractorConfig) -> Self {
        Self {
            executable: config.chromium_path.clone(),
            settle_timeout: config.settle_timeout,
        }
    }

    fn browser_config(&self) -> Result<BrowserConfig, ExtractError> {
        let mut builder = BrowserConfig::builder()
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .window_size(1920, 1080);

        // Without an explicit path chromiumoxide falls back to its own lookup.
        if let Some(path) = self.executable.clone().or_else(find_chromium) {
            builder = builder.chrome_executable(path);
        }

        builder.build().map_err(ExtractError::Launch)
    }

    async fn render_with(&self, browser: &Browser, url: &str) -> Result<RenderedPage, ExtractError> {
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| ExtractError::Launch(format!("failed to open tab: {}", e)))?;

        let result = render_tab(&page, url, self.settle_timeout).await;
        if let Err(err) = page.close().await {
            debug!(error = %err, "page close failed");
        }
        result
    }
}

#[async_trait]
impl PageSource for ChromiumSource {
    async fn render(&self, url: &str) -> Result<RenderedPage, ExtractError> {
        let session = BrowserSession::launch(self.browser_config()?).await?;
        let result = self.render_with(&session.browser, url).await;
        session.shutdown().await;
        result
    }
}

/// The operations rendering needs from one browser tab.
#[async_trait]
pub trait BrowserTab: Send + Sync {
    /// Navigates and fails when the browser reports a navigation error
    /// such as `net::ERR_NAME_NOT_RESOLVED`.
    async fn goto(&self, url: &str) -> Result<(), ExtractError>;
    async fn snapshot(&self) -> Result<DomSnapshot, ExtractError>;
    async fn title(&self) -> Result<Option<String>, ExtractError>;
    async fn content(&self) -> Result<String, ExtractError>;
}

/// Navigates `tab` to `url`, waits for the DOM to settle and reads it back.
pub async fn render_tab<T: BrowserTab + ?Sized>(
    tab: &T,
    url: &str,
    settle_timeout: Duration,
) -> Result<RenderedPage, ExtractError> {
    tab.goto(url).await?;

    let settled = wait_for_stable(POLL_INTERVAL, settle_timeout, move || tab.snapshot()).await?;
    if !settled {
        debug!(url, "DOM still changing at settle timeout; extracting current state");
    }

    let title = tab.title().await?;
    let html = tab.content().await?;

    Ok(RenderedPage { title, html })
}

#[async_trait]
impl BrowserTab for Page {
    async fn goto(&self, url: &str) -> Result<(), ExtractError> {
        // `goto` surfaces the navigation's errorText; `new_page(url)` does not.
        Page::goto(self, url)
            .await
            .map_err(|e| ExtractError::Navigation(e.to_string()))?;
        Ok(())
    }

    async fn snapshot(&self) -> Result<DomSnapshot, ExtractError> {
        let raw: String = self
            .evaluate(SNAPSHOT_SCRIPT)
            .await
            .map_err(|e| ExtractError::Dom(e.to_string()))?
            .into_value()
            .map_err(|e| ExtractError::Dom(format!("unexpected snapshot value: {}", e)))?;

        serde_json::from_str(&raw).map_err(|e| ExtractError::Dom(format!("invalid snapshot: {}", e)))
    }

    async fn title(&self) -> Result<Option<String>, ExtractError> {
        self.get_title()
            .await
            .map_err(|e| ExtractError::Dom(e.to_string()))
    }

    async fn content(&self) -> Result<String, ExtractError> {
        Page::content(self)
            .await
            .map_err(|e| ExtractError::Dom(e.to_string()))
    }
}

/// One browser process plus the task pumping its CDP connection.
///
/// `shutdown` closes the browser gracefully. If the owning future is dropped
/// instead (e.g. on timeout), dropping `Browser` kills the child process and
/// the handler task is aborted here.
struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl BrowserSession {
    async fn launch(config: BrowserConfig) -> Result<Self, ExtractError> {
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| ExtractError::Launch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(error = %err, "browser handler event error");
                }
            }
        });

        Ok(Self { browser, handler })
    }

    async fn shutdown(mut self) {
        if let Err(err) = self.browser.close().await {
            debug!(error = %err, "browser close failed");
        }
        if let Err(err) = self.browser.wait().await {
            debug!(error = %err, "waiting for browser exit failed");
        }
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

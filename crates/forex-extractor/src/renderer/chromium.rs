//! Chromium-based renderer using chromiumoxide.
//!
//! Each context owns a dedicated browser process, so concurrent extractions
//! never share cookies, tabs or a CDP connection.

use super::{NavigationResult, RenderContext, Renderer};
use crate::config::ExtractorConfig;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::fetch::{
    EnableParams, EventRequestPaused, FailRequestParams, RequestPattern, RequestStage,
};
use chromiumoxide::cdp::browser_protocol::network::{ErrorReason, ResourceType};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Time a browser gets to exit on its own before it is killed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Find the Chromium binary path.
pub fn find_chromium(configured: Option<&PathBuf>) -> Option<PathBuf> {
    // 1. Explicit configuration
    if let Some(path) = configured {
        if path.exists() {
            return Some(path.clone());
        }
    }

    // 2. FOREX_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("FOREX_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 3. ~/.cache/forex-extractor/chromium/
    if let Some(cache) = dirs::cache_dir() {
        let root = cache.join("forex-extractor/chromium");
        let candidates = if cfg!(target_os = "macos") {
            vec![
                root.join("chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                root.join("chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                root.join("chrome"),
            ]
        } else {
            vec![root.join("chrome-linux64/chrome"), root.join("chrome")]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 4. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 5. Common macOS location
    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Chromium-based renderer.
pub struct ChromiumRenderer {
    chrome_path: PathBuf,
    headless: bool,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumRenderer {
    /// Resolve the Chromium binary. The browser itself is launched per context.
    pub fn new(config: &ExtractorConfig) -> Result<Self> {
        let chrome_path = find_chromium(config.chromium_path.as_ref())
            .context("Chromium not found. Set FOREX_CHROMIUM_PATH or install Chrome.")?;

        Ok(Self {
            chrome_path,
            headless: config.headless,
            active_count: Arc::new(AtomicUsize::new(0)),
        })
    }

    fn browser_config(&self) -> Result<BrowserConfig> {
        let builder = BrowserConfig::builder().chrome_executable(&self.chrome_path);
        let builder = if self.headless {
            builder.new_headless_mode()
        } else {
            builder.with_head()
        };
        builder
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking")
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        let (mut browser, mut handler) = Browser::launch(self.browser_config()?)
            .await
            .context("failed to launch Chromium")?;

        // Spawn the handler task
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                let _ = browser.close().await;
                let _ = browser.wait().await;
                handler_task.abort();
                bail!("failed to create new page: {e}");
            }
        };

        self.active_count.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("chromium session opened");

        Ok(Box::new(ChromiumContext {
            browser,
            page,
            handler_task,
            interceptor: None,
            active_count: Arc::clone(&self.active_count),
            released: false,
        }))
    }

    fn active_contexts(&self) -> usize {
        self.active_count.load(Ordering::SeqCst)
    }
}

/// A Chromium page together with the browser process that owns it.
pub struct ChromiumContext {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    interceptor: Option<JoinHandle<()>>,
    active_count: Arc<AtomicUsize>,
    released: bool,
}

impl ChromiumContext {
    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Some(task) = self.interceptor.take() {
            task.abort();
        }
        self.handler_task.abort();
        self.active_count.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Drop for ChromiumContext {
    fn drop(&mut self) {
        if !self.released {
            tracing::warn!("chromium session dropped without close; aborting its tasks");
            self.release();
        }
    }
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn block_resources(&mut self, resource_types: &[String]) -> Result<()> {
        let patterns: Vec<RequestPattern> = resource_types
            .iter()
            .filter_map(|name| match name.parse::<ResourceType>() {
                Ok(resource_type) => Some(RequestPattern {
                    url_pattern: Some("*".to_string()),
                    resource_type: Some(resource_type),
                    request_stage: Some(RequestStage::Request),
                }),
                Err(_) => {
                    tracing::warn!("unknown resource type '{name}' is not blocked");
                    None
                }
            })
            .collect();
        if patterns.is_empty() {
            return Ok(());
        }

        // Only blocked types are paused, so every paused request is failed.
        let mut paused = self
            .page
            .event_listener::<EventRequestPaused>()
            .await
            .context("failed to subscribe to paused requests")?;
        self.page
            .execute(EnableParams {
                patterns: Some(patterns),
                handle_auth_requests: None,
            })
            .await
            .context("failed to enable request interception")?;

        let page = self.page.clone();
        self.interceptor = Some(tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                let fail = FailRequestParams::new(
                    event.request_id.clone(),
                    ErrorReason::BlockedByClient,
                );
                if let Err(e) = page.execute(fail).await {
                    tracing::debug!("failed to block request: {e}");
                }
            }
        }));
        Ok(())
    }

    async fn navigate(&mut self, url: &str) -> Result<NavigationResult> {
        let start = Instant::now();

        self.page
            .goto(url)
            .await
            .with_context(|| format!("navigation to {url} failed"))?;
        // Wait for page to be loaded
        let _ = self.page.wait_for_navigation().await;

        let final_url = self
            .page
            .url()
            .await
            .unwrap_or_default()
            .map(|u| u.to_string())
            .unwrap_or_else(|| url.to_string());

        Ok(NavigationResult {
            final_url,
            load_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn wait_for_selector(&self, selector: &str, poll_interval: Duration) -> Result<()> {
        let quoted = serde_json::to_string(selector)?;
        let script = format!(
            "(() => {{ const el = document.querySelector({quoted}); \
             return !!el && el.textContent.trim().length > 0; }})()"
        );
        loop {
            let ready = self
                .page
                .evaluate(script.as_str())
                .await
                .context("selector probe failed")?
                .into_value::<bool>()
                .unwrap_or(false);
            if ready {
                return Ok(());
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    async fn get_html(&self) -> Result<String> {
        let result = self
            .page
            .evaluate("document.documentElement.outerHTML")
            .await
            .context("failed to get HTML")?;

        let html: String = result
            .into_value()
            .map_err(|e| anyhow::anyhow!("failed to convert HTML result: {e:?}"))?;

        Ok(html)
    }

    async fn get_url(&self) -> Result<String> {
        let url = self
            .page
            .url()
            .await
            .context("failed to get URL")?
            .map(|u| u.to_string())
            .unwrap_or_default();
        Ok(url)
    }

    async fn close(mut self: Box<Self>) -> Result<()> {
        let page = self.page.clone();
        let browser = &mut self.browser;
        let graceful = tokio::time::timeout(SHUTDOWN_GRACE, async {
            let _ = page.close().await;
            browser.close().await.context("failed to close browser")?;
            browser.wait().await.context("failed to wait for browser exit")?;
            Ok::<_, anyhow::Error>(())
        })
        .await;

        let outcome = match graceful {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(anyhow::anyhow!(
                "browser did not exit within {}s",
                SHUTDOWN_GRACE.as_secs()
            )),
        };
        if outcome.is_err() {
            if let Some(Err(e)) = self.browser.kill().await {
                tracing::warn!("failed to kill browser: {e}");
            }
        }

        self.release();
        tracing::debug!("chromium session closed");
        outcome
    }
}

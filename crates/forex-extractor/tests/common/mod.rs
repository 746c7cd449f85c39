//! In-memory renderer serving canned HTML.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use forex_extractor::renderer::{NavigationResult, RenderContext, Renderer};
use forex_extractor::{Extractor, ExtractorConfig};

/// Five well-formed rows (Jan 01 lies outside a Jan 02..Jan 10 window), one
/// row with a missing close and one dividend annotation.
pub const HISTORY_PAGE: &str = r#"
<html><body>
<div class="table-container">
  <table>
    <thead><tr>
      <th>Date</th><th>Open</th><th>High</th><th>Low</th>
      <th>Close Close price adjusted for splits.</th>
      <th>Adj Close Adjusted close price adjusted for splits and dividend and/or capital gain distributions.</th>
      <th>Volume</th>
    </tr></thead>
    <tbody>
      <tr><td>Jan 10, 2024</td><td>1.0950</td><td>1.0975</td><td>1.0920</td><td>1.0960</td><td>1.0960</td><td>-</td></tr>
      <tr><td>Jan 09, 2024</td><td>1.0930</td><td>1.0955</td><td>1.0910</td><td>1.0945</td><td>1.0945</td><td>-</td></tr>
      <tr><td>Jan 08, 2024</td><td>1.0900</td><td>1.0940</td><td>1.0890</td><td>1.0925</td><td>1.0925</td><td>-</td></tr>
      <tr><td>Jan 05, 2024</td><td>1.0880</td><td>1.0910</td><td>1.0850</td><td>-</td><td>-</td><td>-</td></tr>
      <tr><td>Jan 04, 2024</td><td>1.0870</td><td>1.0895</td><td>1.0860</td><td>1.0885</td><td>1.0885</td><td>-</td></tr>
      <tr><td>Jan 03, 2024</td><td colspan="6">0.25 Dividend</td></tr>
      <tr><td>Jan 01, 2024</td><td>1.0850</td><td>1.0865</td><td>1.0835</td><td>1.0860</td><td>1.0860</td><td>-</td></tr>
    </tbody>
  </table>
</div>
</body></html>
"#;

pub const EMPTY_PAGE: &str = r#"
<html><body>
<div class="table-container"><table><thead><tr><th>Date</th></tr></thead><tbody></tbody></table></div>
</body></html>
"#;

/// Renderer whose pages never touch the network.
pub struct FakeRenderer {
    html: String,
    hang: bool,
    hang_close: bool,
    active: Arc<AtomicUsize>,
    opened: AtomicUsize,
    urls: Arc<Mutex<Vec<String>>>,
}

impl FakeRenderer {
    pub fn serving(html: &str) -> Self {
        Self {
            html: html.to_string(),
            hang: false,
            hang_close: false,
            active: Arc::new(AtomicUsize::new(0)),
            opened: AtomicUsize::new(0),
            urls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A renderer whose price table never appears.
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::serving("")
        }
    }

    /// A renderer whose table never appears and whose sessions never finish
    /// closing. Dropping a session still releases it.
    pub fn hanging_close() -> Self {
        Self {
            hang: true,
            hang_close: true,
            ..Self::serving("")
        }
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn visited(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn new_context(&self) -> anyhow::Result<Box<dyn RenderContext>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.active.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeContext {
            html: self.html.clone(),
            hang: self.hang,
            hang_close: self.hang_close,
            released: false,
            url: String::new(),
            active: Arc::clone(&self.active),
            urls: Arc::clone(&self.urls),
        }))
    }

    fn active_contexts(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

struct FakeContext {
    html: String,
    hang: bool,
    hang_close: bool,
    released: bool,
    url: String,
    active: Arc<AtomicUsize>,
    urls: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl RenderContext for FakeContext {
    async fn block_resources(&mut self, _resource_types: &[String]) -> anyhow::Result<()> {
        Ok(())
    }

    async fn navigate(&mut self, url: &str) -> anyhow::Result<NavigationResult> {
        self.url = url.to_string();
        self.urls.lock().unwrap().push(url.to_string());
        Ok(NavigationResult {
            final_url: url.to_string(),
            load_time_ms: 5,
        })
    }

    async fn wait_for_selector(&self, _selector: &str, _poll: Duration) -> anyhow::Result<()> {
        if self.hang {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn get_html(&self) -> anyhow::Result<String> {
        Ok(self.html.clone())
    }

    async fn get_url(&self) -> anyhow::Result<String> {
        Ok(self.url.clone())
    }

    async fn close(mut self: Box<Self>) -> anyhow::Result<()> {
        if self.hang_close {
            std::future::pending::<()>().await;
        }
        self.released = true;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for FakeContext {
    fn drop(&mut self) {
        if !self.released {
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// Test configuration: no settle delay, output into `dir`.
pub fn config(dir: &Path) -> ExtractorConfig {
    ExtractorConfig {
        settle_delay_ms: 0,
        poll_interval_ms: 10,
        ..ExtractorConfig::default().with_output_dir(dir)
    }
}

pub fn extractor(renderer: Arc<FakeRenderer>, dir: &Path) -> Extractor {
    Extractor::new(renderer, config(dir))
}

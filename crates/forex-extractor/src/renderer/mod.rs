//! Renderer abstraction for browser-based page rendering.
//!
//! Defines the `Renderer` and `RenderContext` traits that abstract over
//! the browser engine (currently Chromium via chromiumoxide). The navigator
//! only talks to these traits, so tests can substitute an in-memory page.

pub mod chromium;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result of navigating to a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// The final URL after any redirects.
    pub final_url: String,
    /// Time taken to load the page in milliseconds.
    pub load_time_ms: u64,
}

/// A browser engine that can open isolated sessions.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Open a new browser session. Every context must be closed by its owner.
    async fn new_context(&self) -> Result<Box<dyn RenderContext>>;
    /// Number of currently open contexts.
    fn active_contexts(&self) -> usize;
}

/// A single browser session used for one page load.
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Abort requests of these resource types (e.g. `Image`, `Font`).
    async fn block_resources(&mut self, resource_types: &[String]) -> Result<()>;
    /// Navigate to a URL.
    async fn navigate(&mut self, url: &str) -> Result<NavigationResult>;
    /// Wait until `selector` matches at least one element that has content.
    ///
    /// Implementations poll until the element appears; the caller bounds the
    /// wait with a timeout.
    async fn wait_for_selector(&self, selector: &str, poll_interval: Duration) -> Result<()>;
    /// Get the full page HTML.
    async fn get_html(&self) -> Result<String>;
    /// Get the current URL.
    async fn get_url(&self) -> Result<String>;
    /// Close this context and release the browser behind it.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// A renderer used when no browser binary is available.
///
/// Every extraction fails with a navigation error instead of panicking at
/// startup.
pub struct NoopRenderer;

#[async_trait]
impl Renderer for NoopRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        Err(anyhow::anyhow!(
            "browser not available; set FOREX_CHROMIUM_PATH or install Chromium"
        ))
    }

    fn active_contexts(&self) -> usize {
        0
    }
}

//! Page navigation: open a browser session for one request, wait for the
//! price table, hand back the rendered HTML.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ExtractorConfig;
use crate::error::{ExtractError, ExtractResult};
use crate::renderer::{RenderContext, Renderer};
use crate::types::ExtractionRequest;

/// Stand-in deadline for timeouts too large to add to the current instant.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// The rendered history page.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub html: String,
    /// URL after redirects.
    pub final_url: String,
    pub load_time_ms: u64,
}

/// Drives one browser session per navigation.
#[derive(Clone)]
pub struct PageNavigator {
    renderer: Arc<dyn Renderer>,
    config: Arc<ExtractorConfig>,
}

impl PageNavigator {
    pub fn new(renderer: Arc<dyn Renderer>, config: Arc<ExtractorConfig>) -> Self {
        Self { renderer, config }
    }

    pub fn renderer(&self) -> &Arc<dyn Renderer> {
        &self.renderer
    }

    /// History page URL with the request window as Unix-second parameters.
    pub fn page_url(&self, request: &ExtractionRequest) -> ExtractResult<String> {
        let base = self.config.page_url(request.currency_pair());
        let params = request.to_url_params();
        url::Url::parse_with_params(
            &base,
            &[
                ("period1", params.period1.to_string()),
                ("period2", params.period2.to_string()),
            ],
        )
        .map(|u| u.to_string())
        .map_err(|e| ExtractError::Navigation {
            url: base,
            message: format!("invalid page URL: {e}"),
        })
    }

    /// Render the history page for `request` within `timeout`.
    ///
    /// The browser session is closed on every path, including timeout. The
    /// timeout bounds the work done inside the session; closing is bounded
    /// separately by the configured close timeout.
    pub async fn navigate(
        &self,
        request: &ExtractionRequest,
        timeout: Duration,
    ) -> ExtractResult<RenderedPage> {
        let url = self.page_url(request)?;
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        let now = Instant::now();
        let deadline = now
            .checked_add(timeout)
            .unwrap_or_else(|| now + FAR_FUTURE);

        info!(
            "navigating to {} history: {url}",
            request.currency_pair()
        );

        let mut ctx = match tokio::time::timeout_at(deadline, self.renderer.new_context()).await {
            Ok(Ok(ctx)) => ctx,
            Ok(Err(e)) => {
                return Err(ExtractError::Navigation {
                    url,
                    message: format!("{e:#}"),
                })
            }
            Err(_) => return Err(ExtractError::NavigationTimeout { url, timeout_ms }),
        };

        let outcome = tokio::time::timeout_at(deadline, self.load(ctx.as_mut(), &url)).await;

        // Dropping an unfinished close still releases the session.
        match tokio::time::timeout(self.config.close_timeout(), ctx.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("failed to close browser session: {e:#}"),
            Err(_) => warn!(
                "browser session did not close within {}ms; abandoned",
                self.config.close_timeout_ms
            ),
        }

        match outcome {
            Ok(Ok(page)) => {
                info!(
                    "page ready in {}ms ({} bytes)",
                    page.load_time_ms,
                    page.html.len()
                );
                Ok(page)
            }
            Ok(Err(e)) => Err(ExtractError::Navigation {
                url,
                message: format!("{e:#}"),
            }),
            Err(_) => {
                warn!("timed out after {timeout_ms}ms waiting for {url}");
                Err(ExtractError::NavigationTimeout { url, timeout_ms })
            }
        }
    }

    async fn load(&self, ctx: &mut dyn RenderContext, url: &str) -> anyhow::Result<RenderedPage> {
        ctx.block_resources(&self.config.blocked_resource_types)
            .await?;

        let nav = ctx.navigate(url).await?;
        debug!("navigation finished in {}ms", nav.load_time_ms);

        ctx.wait_for_selector(&self.config.selectors.table, self.config.poll_interval())
            .await?;
        debug!("price table present");

        if !self.config.settle_delay().is_zero() {
            tokio::time::sleep(self.config.settle_delay()).await;
        }

        let html = ctx.get_html().await?;
        if html.trim().is_empty() {
            anyhow::bail!("page returned empty HTML");
        }

        let final_url = match ctx.get_url().await {
            Ok(current) if !current.is_empty() => current,
            _ => nav.final_url,
        };

        Ok(RenderedPage {
            html,
            final_url,
            load_time_ms: nav.load_time_ms,
        })
    }
}

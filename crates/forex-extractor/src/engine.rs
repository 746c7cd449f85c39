//! Extraction engine: navigate, parse, assemble one result per request.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::ExtractorConfig;
use crate::error::{ExtractError, ExtractResult};
use crate::navigator::PageNavigator;
use crate::parser::{ParsedTable, TableParser};
use crate::renderer::Renderer;
use crate::types::{ExtractionMetadata, ExtractionRequest, ForexExtractionResult, PriceDataPoint};

/// Lifecycle of a single extraction.
///
/// `Idle -> Navigating -> Parsing -> Assembling -> Succeeded`, with any step
/// able to move to `Failed`. Both end states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionState {
    Idle,
    Navigating,
    Parsing,
    Assembling,
    Succeeded,
    Failed,
}

impl ExtractionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ExtractionState::Succeeded | ExtractionState::Failed)
    }
}

impl fmt::Display for ExtractionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExtractionState::Idle => "idle",
            ExtractionState::Navigating => "navigating",
            ExtractionState::Parsing => "parsing",
            ExtractionState::Assembling => "assembling",
            ExtractionState::Succeeded => "succeeded",
            ExtractionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

struct Lifecycle<'a> {
    pair: &'a str,
    state: ExtractionState,
}

impl<'a> Lifecycle<'a> {
    fn new(pair: &'a str) -> Self {
        Self {
            pair,
            state: ExtractionState::Idle,
        }
    }

    fn advance(&mut self, next: ExtractionState) {
        debug_assert!(!self.state.is_terminal(), "no transitions out of {}", self.state);
        debug!("{}: {} -> {}", self.pair, self.state, next);
        self.state = next;
    }
}

/// Runs extractions. Holds no per-request state, so one engine can serve
/// many concurrent requests.
#[derive(Clone)]
pub struct ExtractionEngine {
    navigator: PageNavigator,
    parser: TableParser,
    config: Arc<ExtractorConfig>,
}

impl ExtractionEngine {
    pub fn new(renderer: Arc<dyn Renderer>, config: Arc<ExtractorConfig>) -> Self {
        Self {
            navigator: PageNavigator::new(renderer, Arc::clone(&config)),
            parser: TableParser::new(&config),
            config,
        }
    }

    pub fn navigator(&self) -> &PageNavigator {
        &self.navigator
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Extract with the configured page timeout.
    pub async fn extract(&self, request: &ExtractionRequest) -> ForexExtractionResult {
        self.extract_with_timeout(request, self.config.page_timeout())
            .await
    }

    /// Run one extraction. Failures are reported inside the result, never
    /// retried.
    pub async fn extract_with_timeout(
        &self,
        request: &ExtractionRequest,
        timeout: Duration,
    ) -> ForexExtractionResult {
        let pair = request.currency_pair();
        let url = self
            .navigator
            .page_url(request)
            .unwrap_or_else(|_| self.config.page_url(pair));
        let mut metadata = ExtractionMetadata::for_request(request, &url);
        let mut lifecycle = Lifecycle::new(pair);

        info!(
            "extracting {pair} from {} back to {}",
            request.start_date(),
            request.end_date()
        );

        match self.run(request, timeout, &mut metadata, &mut lifecycle).await {
            Ok(points) => {
                lifecycle.advance(ExtractionState::Succeeded);
                let result = ForexExtractionResult::succeeded(points, metadata);
                info!("{}", result.summary());
                result
            }
            Err(e) => {
                lifecycle.advance(ExtractionState::Failed);
                warn!("{pair} extraction failed: {e}");
                ForexExtractionResult::failed(metadata, &e)
            }
        }
    }

    async fn run(
        &self,
        request: &ExtractionRequest,
        timeout: Duration,
        metadata: &mut ExtractionMetadata,
        lifecycle: &mut Lifecycle<'_>,
    ) -> ExtractResult<Vec<PriceDataPoint>> {
        lifecycle.advance(ExtractionState::Navigating);
        let page = self.navigator.navigate(request, timeout).await?;
        metadata.url_accessed = page.final_url;
        metadata.load_time_ms = Some(page.load_time_ms);

        lifecycle.advance(ExtractionState::Parsing);
        let ParsedTable {
            headers,
            points,
            skipped,
            dropped,
        } = self.parser.parse_html(&page.html);
        metadata.headers_found = headers;
        metadata.rows_skipped = skipped;
        metadata.rows_dropped = dropped.len();
        if !dropped.is_empty() {
            warn!(
                "{}: dropped {} malformed row(s)",
                request.currency_pair(),
                dropped.len()
            );
        }

        lifecycle.advance(ExtractionState::Assembling);
        let parsed = points.len();
        let points: Vec<PriceDataPoint> = points
            .into_iter()
            .filter(|p| request.covers(p.date()))
            .collect();
        if parsed > points.len() {
            debug!(
                "{}: {} row(s) outside the requested window",
                request.currency_pair(),
                parsed - points.len()
            );
        }

        if points.is_empty() {
            let detail = if metadata.headers_found.is_empty() && parsed == 0 && dropped.is_empty() {
                "price table not found or empty".to_string()
            } else {
                format!(
                    "{parsed} row(s) parsed, {} dropped, {skipped} skipped, none inside the requested window",
                    dropped.len()
                )
            };
            return Err(ExtractError::NoDataFound {
                currency_pair: request.currency_pair().to_string(),
                url: metadata.url_accessed.clone(),
                detail,
            });
        }

        Ok(points)
    }
}

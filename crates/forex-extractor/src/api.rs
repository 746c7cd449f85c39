//! Public entry points: validate, extract, export.

use std::sync::Arc;

use tracing::warn;

use crate::config::ExtractorConfig;
use crate::dates::DateInput;
use crate::engine::ExtractionEngine;
use crate::error::{ExtractError, ExtractResult, ValidationError};
use crate::export::Exporter;
use crate::renderer::chromium::ChromiumRenderer;
use crate::renderer::{NoopRenderer, Renderer};
use crate::request::{RequestOptions, RequestValidator};
use crate::types::{ExtractionRequest, FileOperationResult, ForexExtractionResult};

/// An extraction result together with the files written for it.
#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    pub result: ForexExtractionResult,
    /// Empty when the extraction failed; nothing is exported then.
    pub files: Vec<FileOperationResult>,
}

impl ExtractionOutcome {
    pub fn all_files_written(&self) -> bool {
        self.files.iter().all(|f| f.success)
    }
}

/// Extraction engine plus exporter behind one configuration.
#[derive(Clone)]
pub struct Extractor {
    renderer: Arc<dyn Renderer>,
    engine: ExtractionEngine,
    exporter: Exporter,
    config: Arc<ExtractorConfig>,
}

impl Extractor {
    pub fn new(renderer: Arc<dyn Renderer>, config: ExtractorConfig) -> Self {
        let config = Arc::new(config);
        Self {
            engine: ExtractionEngine::new(Arc::clone(&renderer), Arc::clone(&config)),
            exporter: Exporter::new(&config),
            renderer,
            config,
        }
    }

    /// Use a local Chromium install.
    pub fn with_chromium(config: ExtractorConfig) -> anyhow::Result<Self> {
        let renderer = ChromiumRenderer::new(&config)?;
        Ok(Self::new(Arc::new(renderer), config))
    }

    /// Use Chromium when one can be found; otherwise every extraction fails
    /// with a navigation error.
    pub fn detect(config: ExtractorConfig) -> Self {
        match ChromiumRenderer::new(&config) {
            Ok(renderer) => Self::new(Arc::new(renderer), config),
            Err(e) => {
                warn!("{e:#}");
                Self::new(Arc::new(NoopRenderer), config)
            }
        }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    pub fn engine(&self) -> &ExtractionEngine {
        &self.engine
    }

    pub fn exporter(&self) -> &Exporter {
        &self.exporter
    }

    /// Browser sessions currently open.
    pub fn active_contexts(&self) -> usize {
        self.renderer.active_contexts()
    }

    /// Validate raw inputs against this extractor's date window.
    pub fn request(
        &self,
        currency_pair: &str,
        start_date: impl Into<DateInput>,
        end_date: impl Into<DateInput>,
        options: &RequestOptions,
    ) -> Result<ExtractionRequest, ValidationError> {
        RequestValidator::from_config(&self.config).validate(
            currency_pair,
            &start_date.into(),
            &end_date.into(),
            options,
        )
    }

    /// Extract, then export only when the extraction succeeded.
    pub async fn extract_and_export(&self, request: &ExtractionRequest) -> ExtractionOutcome {
        let result = self.engine.extract(request).await;
        let files = if result.success() {
            self.exporter.export(&result, request).await
        } else {
            Vec::new()
        };
        ExtractionOutcome { result, files }
    }

    /// Validate, extract and export.
    ///
    /// Bad input is `Err(Validation)`. Navigation and parsing failures come
    /// back as `Ok` with `success() == false`. A failed file write is
    /// `Err(ExportFailed)` carrying every file's outcome, so files that were
    /// written can still be found.
    pub async fn get_forex_data(
        &self,
        currency_pair: &str,
        start_date: impl Into<DateInput>,
        end_date: impl Into<DateInput>,
        options: RequestOptions,
    ) -> ExtractResult<ForexExtractionResult> {
        let request = self.request(currency_pair, start_date, end_date, &options)?;
        let outcome = self.extract_and_export(&request).await;
        if !outcome.all_files_written() {
            return Err(ExtractError::ExportFailed {
                files: outcome.files,
            });
        }
        Ok(outcome.result)
    }
}

/// One-shot extraction with configuration from the environment.
pub async fn get_forex_data(
    currency_pair: &str,
    start_date: impl Into<DateInput>,
    end_date: impl Into<DateInput>,
    options: RequestOptions,
) -> ExtractResult<ForexExtractionResult> {
    Extractor::detect(ExtractorConfig::from_env())
        .get_forex_data(currency_pair, start_date, end_date, options)
        .await
}

/// Blocking form of [`get_forex_data`] for callers without a runtime.
///
/// Must not be called from inside an async runtime.
pub fn fetch_forex_data(
    currency_pair: &str,
    start_date: impl Into<DateInput>,
    end_date: impl Into<DateInput>,
    options: RequestOptions,
) -> ExtractResult<ForexExtractionResult> {
    if tokio::runtime::Handle::try_current().is_ok() {
        return Err(ExtractError::Io(std::io::Error::other(
            "fetch_forex_data called inside an async runtime; use get_forex_data",
        )));
    }
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(get_forex_data(currency_pair, start_date, end_date, options))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, Violation};

    fn extractor(dir: &std::path::Path) -> Extractor {
        Extractor::new(
            Arc::new(NoopRenderer),
            ExtractorConfig::default().with_output_dir(dir),
        )
    }

    #[tokio::test]
    async fn test_invalid_input_is_rejected_before_navigation() {
        let dir = tempfile::tempdir().unwrap();
        let err = extractor(dir.path())
            .get_forex_data("US", "2024-01-10", "2024-01-20", RequestOptions::default())
            .await
            .unwrap_err();
        let validation = match err {
            ExtractError::Validation(validation) => validation,
            other => panic!("expected validation error, got {other:?}"),
        };
        assert!(validation.contains(|v| matches!(v, Violation::MalformedCurrencyPair(_))));
        assert!(validation.contains(|v| matches!(v, Violation::EndNotBeforeStart { .. })));
    }

    #[tokio::test]
    async fn test_failed_extraction_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let result = extractor(dir.path())
            .get_forex_data("GBPUSD", "2024-01-20", "2024-01-10", RequestOptions::default())
            .await
            .unwrap();
        assert!(!result.success());
        assert_eq!(result.error_kind(), Some(ErrorKind::Navigation));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_blocking_api_refuses_nested_runtime() {
        let err = fetch_forex_data("USDEUR", "2024-01-20", "2024-01-10", RequestOptions::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}

//! Historical forex price extraction.
//!
//! Validates a request, renders the quote history page in a headless
//! browser, parses the price table into decimal OHLC points and writes them
//! to CSV and/or JSON.

pub mod api;
pub mod config;
pub mod dates;
pub mod engine;
pub mod error;
pub mod export;
pub mod navigator;
pub mod parser;
pub mod renderer;
pub mod request;
pub mod types;

pub use api::{fetch_forex_data, get_forex_data, ExtractionOutcome, Extractor};
pub use config::ExtractorConfig;
pub use dates::DateInput;
pub use engine::{ExtractionEngine, ExtractionState};
pub use error::{ErrorKind, ExtractError, ExtractResult, ValidationError, Violation};
pub use export::Exporter;
pub use navigator::PageNavigator;
pub use parser::TableParser;
pub use request::{create_extraction_request, RequestOptions, RequestValidator};
pub use types::{
    ExtractionMetadata, ExtractionRequest, FileOperationResult, ForexExtractionResult,
    OutputFormat, PriceDataPoint,
};

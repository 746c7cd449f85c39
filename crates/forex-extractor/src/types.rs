//! Core data types for extraction requests, price data and results.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::dates::{date_to_unix, format_date_for_display, DisplayStyle};
use crate::error::{ErrorKind, ExtractError};

/// Output file format(s) for an extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Csv,
    Json,
    Both,
}

impl OutputFormat {
    /// The concrete file formats this choice expands to, CSV first.
    pub fn targets(self) -> &'static [OutputFormat] {
        match self {
            OutputFormat::Csv => &[OutputFormat::Csv],
            OutputFormat::Json => &[OutputFormat::Json],
            OutputFormat::Both => &[OutputFormat::Csv, OutputFormat::Json],
        }
    }

    /// File extension; `Both` defaults to csv.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv | OutputFormat::Both => "csv",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Csv => f.write_str("csv"),
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Both => f.write_str("both"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::Json),
            "both" => Ok(OutputFormat::Both),
            other => Err(other.to_string()),
        }
    }
}

/// A validated, immutable description of one extraction.
///
/// Only produced by [`crate::request::RequestValidator`], so every instance
/// satisfies the request invariants: a supported six-letter pair, dates inside
/// the allowed window and `end_date < start_date`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionRequest {
    currency_pair: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    output_format: OutputFormat,
    output_file: Option<String>,
    append_to_file: bool,
}

/// Query parameters for the history page of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UrlParams {
    pub currency_pair: String,
    /// Oldest date of the window (the request's end date), Unix seconds.
    pub period1: i64,
    /// Newest date of the window (the request's start date), Unix seconds.
    pub period2: i64,
}

impl ExtractionRequest {
    pub(crate) fn from_validated(
        currency_pair: String,
        start_date: NaiveDate,
        end_date: NaiveDate,
        output_format: OutputFormat,
        output_file: Option<String>,
        append_to_file: bool,
    ) -> Self {
        Self {
            currency_pair,
            start_date,
            end_date,
            output_format,
            output_file,
            append_to_file,
        }
    }

    pub fn currency_pair(&self) -> &str {
        &self.currency_pair
    }

    /// Newest date of the window.
    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    /// Oldest date of the window.
    pub fn end_date(&self) -> NaiveDate {
        self.end_date
    }

    pub fn output_format(&self) -> OutputFormat {
        self.output_format
    }

    pub fn output_file(&self) -> Option<&str> {
        self.output_file.as_deref()
    }

    pub fn append_to_file(&self) -> bool {
        self.append_to_file
    }

    /// Whether a date lies inside `[end_date, start_date]`.
    pub fn covers(&self, date: NaiveDate) -> bool {
        date >= self.end_date && date <= self.start_date
    }

    /// `{PAIR}_historical_data.{ext}`
    pub fn default_filename(&self, extension: &str) -> String {
        format!("{}_historical_data.{extension}", self.currency_pair)
    }

    pub fn to_url_params(&self) -> UrlParams {
        UrlParams {
            currency_pair: self.currency_pair.clone(),
            period1: date_to_unix(self.end_date),
            period2: date_to_unix(self.start_date),
        }
    }
}

/// A broken price relationship inside one table row.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidPrice {
    #[error("{column} price must be positive, got {value}")]
    NonPositive { column: &'static str, value: Decimal },

    #[error("high {high} is below {column} {value}")]
    HighTooLow {
        high: Decimal,
        column: &'static str,
        value: Decimal,
    },

    #[error("low {low} is above {column} {value}")]
    LowTooHigh {
        low: Decimal,
        column: &'static str,
        value: Decimal,
    },
}

/// One day's open/high/low/close quotation.
///
/// Construction checks `low <= {open, close} <= high`; every value is a
/// [`Decimal`] so comparisons and serialization never go through `f64`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPricePoint")]
pub struct PriceDataPoint {
    date: NaiveDate,
    date_string: String,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
}

#[derive(Deserialize)]
struct RawPricePoint {
    date: NaiveDate,
    date_string: String,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
}

impl TryFrom<RawPricePoint> for PriceDataPoint {
    type Error = InvalidPrice;

    fn try_from(raw: RawPricePoint) -> Result<Self, Self::Error> {
        PriceDataPoint::new(
            raw.date,
            raw.date_string,
            raw.open,
            raw.high,
            raw.low,
            raw.close,
        )
    }
}

impl PriceDataPoint {
    pub fn new(
        date: NaiveDate,
        date_string: impl Into<String>,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
    ) -> Result<Self, InvalidPrice> {
        for (column, value) in [("open", open), ("high", high), ("low", low), ("close", close)] {
            if value <= Decimal::ZERO {
                return Err(InvalidPrice::NonPositive { column, value });
            }
        }
        for (column, value) in [("open", open), ("close", close), ("low", low)] {
            if high < value {
                return Err(InvalidPrice::HighTooLow {
                    high,
                    column,
                    value,
                });
            }
        }
        for (column, value) in [("open", open), ("close", close)] {
            if low > value {
                return Err(InvalidPrice::LowTooHigh { low, column, value });
            }
        }

        let date_string = date_string.into().trim().to_string();
        let date_string = if date_string.is_empty() {
            format_date_for_display(date, DisplayStyle::Short)
        } else {
            date_string
        };

        Ok(Self {
            date,
            date_string,
            open,
            high,
            low,
            close,
        })
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// The date as rendered on the page.
    pub fn date_string(&self) -> &str {
        &self.date_string
    }

    pub fn open(&self) -> Decimal {
        self.open
    }

    pub fn high(&self) -> Decimal {
        self.high
    }

    pub fn low(&self) -> Decimal {
        self.low
    }

    pub fn close(&self) -> Decimal {
        self.close
    }
}

/// Diagnostics about one extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionMetadata {
    pub currency_pair: String,
    pub url_accessed: String,
    /// Column headers found on the page, for spotting layout drift.
    pub headers_found: Vec<String>,
    pub extraction_timestamp: DateTime<Utc>,
    pub row_count: usize,
    /// Annotation rows (dividends, splits) that are not price rows.
    pub rows_skipped: usize,
    /// Price-shaped rows that failed to parse or validate.
    pub rows_dropped: usize,
    pub requested_start: NaiveDate,
    pub requested_end: NaiveDate,
    /// Newest date present in the data.
    pub data_start: Option<NaiveDate>,
    /// Oldest date present in the data.
    pub data_end: Option<NaiveDate>,
    pub load_time_ms: Option<u64>,
}

impl ExtractionMetadata {
    /// Metadata for a request before anything has been read from the page.
    pub fn for_request(request: &ExtractionRequest, url: &str) -> Self {
        Self {
            currency_pair: request.currency_pair().to_string(),
            url_accessed: url.to_string(),
            headers_found: Vec::new(),
            extraction_timestamp: Utc::now(),
            row_count: 0,
            rows_skipped: 0,
            rows_dropped: 0,
            requested_start: request.start_date(),
            requested_end: request.end_date(),
            data_start: None,
            data_end: None,
            load_time_ms: None,
        }
    }
}

/// The complete outcome of one extraction call.
///
/// Built once by the engine and never mutated afterwards. Callers must check
/// [`success`](Self::success) before trusting [`data_points`](Self::data_points).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForexExtractionResult {
    success: bool,
    data_points: Vec<PriceDataPoint>,
    metadata: ExtractionMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<ErrorKind>,
}

impl ForexExtractionResult {
    pub(crate) fn succeeded(data_points: Vec<PriceDataPoint>, mut metadata: ExtractionMetadata) -> Self {
        metadata.row_count = data_points.len();
        metadata.data_start = data_points.iter().map(PriceDataPoint::date).max();
        metadata.data_end = data_points.iter().map(PriceDataPoint::date).min();
        Self {
            success: true,
            data_points,
            metadata,
            error_message: None,
            error_kind: None,
        }
    }

    pub(crate) fn failed(mut metadata: ExtractionMetadata, error: &ExtractError) -> Self {
        metadata.row_count = 0;
        let error_message = format!("{} extraction failed: {error}", metadata.currency_pair);
        Self {
            success: false,
            data_points: Vec::new(),
            metadata,
            error_message: Some(error_message),
            error_kind: Some(error.kind()),
        }
    }

    pub fn success(&self) -> bool {
        self.success
    }

    /// Price points in page order.
    pub fn data_points(&self) -> &[PriceDataPoint] {
        &self.data_points
    }

    pub fn metadata(&self) -> &ExtractionMetadata {
        &self.metadata
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error_kind
    }

    /// `(date_string, close)` rows in page order.
    pub fn csv_rows(&self) -> Vec<(String, String)> {
        self.data_points
            .iter()
            .map(|p| (p.date_string().to_string(), p.close().to_string()))
            .collect()
    }

    pub fn summary(&self) -> String {
        if !self.success {
            return format!(
                "Extraction failed: {}",
                self.error_message.as_deref().unwrap_or("unknown error")
            );
        }
        match (self.metadata.data_end, self.metadata.data_start) {
            (Some(oldest), Some(newest)) => format!(
                "Extracted {} data points for {} from {} to {}",
                self.data_points.len(),
                self.metadata.currency_pair,
                format_date_for_display(oldest, DisplayStyle::Short),
                format_date_for_display(newest, DisplayStyle::Short),
            ),
            _ => format!(
                "Extracted {} data points for {}",
                self.data_points.len(),
                self.metadata.currency_pair
            ),
        }
    }
}

/// Outcome of writing one output file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOperationResult {
    pub file_path: PathBuf,
    pub format: OutputFormat,
    /// Data rows added to the file by this write.
    pub rows_written: usize,
    pub file_size_bytes: Option<u64>,
    pub success: bool,
    pub error_message: Option<String>,
    pub error_kind: Option<ErrorKind>,
}

impl FileOperationResult {
    pub(crate) fn written(
        file_path: PathBuf,
        format: OutputFormat,
        rows_written: usize,
        file_size_bytes: Option<u64>,
    ) -> Self {
        Self {
            file_path,
            format,
            rows_written,
            file_size_bytes,
            success: true,
            error_message: None,
            error_kind: None,
        }
    }

    pub(crate) fn failed(file_path: PathBuf, format: OutputFormat, error: &ExtractError) -> Self {
        Self {
            file_path,
            format,
            rows_written: 0,
            file_size_bytes: None,
            success: false,
            error_message: Some(error.to_string()),
            error_kind: Some(error.kind()),
        }
    }

    pub fn summary(&self) -> String {
        if !self.success {
            return format!(
                "{} save failed: {}",
                self.format.to_string().to_uppercase(),
                self.error_message.as_deref().unwrap_or("unknown error")
            );
        }
        let size = self
            .file_size_bytes
            .map(|b| format!(" ({b} bytes)"))
            .unwrap_or_default();
        format!(
            "{} data saved to {}{size} - {} rows",
            self.format.to_string().to_uppercase(),
            self.file_path.display(),
            self.rows_written
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!("CSV".parse::<OutputFormat>(), Ok(OutputFormat::Csv));
        assert_eq!(" json ".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert_eq!("both".parse::<OutputFormat>(), Ok(OutputFormat::Both));
        assert_eq!("xml".parse::<OutputFormat>(), Err("xml".to_string()));
        assert_eq!(OutputFormat::Both.targets().len(), 2);
    }

    #[test]
    fn test_price_point_accepts_consistent_range() {
        let p = PriceDataPoint::new(
            ymd(2023, 12, 29),
            "Dec 29, 2023",
            dec!(0.9050),
            dec!(0.9080),
            dec!(0.9010),
            dec!(0.9060),
        )
        .unwrap();
        assert_eq!(p.close(), dec!(0.9060));
        assert_eq!(p.date_string(), "Dec 29, 2023");
        assert!(p.low() <= p.open() && p.open() <= p.high());
    }

    #[test]
    fn test_price_point_rejects_inverted_range() {
        let err = PriceDataPoint::new(
            ymd(2023, 12, 29),
            "Dec 29, 2023",
            dec!(0.91),
            dec!(0.90),
            dec!(0.89),
            dec!(0.905),
        )
        .unwrap_err();
        assert!(matches!(err, InvalidPrice::HighTooLow { column: "open", .. }));

        let err = PriceDataPoint::new(
            ymd(2023, 12, 29),
            "",
            dec!(0.90),
            dec!(0.92),
            dec!(0.91),
            dec!(0.915),
        )
        .unwrap_err();
        assert!(matches!(err, InvalidPrice::LowTooHigh { column: "open", .. }));
    }

    #[test]
    fn test_price_point_rejects_non_positive() {
        let err = PriceDataPoint::new(
            ymd(2023, 1, 2),
            "Jan 02, 2023",
            dec!(0),
            dec!(1),
            dec!(0),
            dec!(1),
        )
        .unwrap_err();
        assert!(matches!(err, InvalidPrice::NonPositive { column: "open", .. }));
    }

    #[test]
    fn test_price_point_deserialize_validates() {
        let ok = r#"{"date":"2023-01-02","date_string":"Jan 02, 2023","open":"1.1","high":"1.2","low":"1.0","close":"1.15"}"#;
        let p: PriceDataPoint = serde_json::from_str(ok).unwrap();
        assert_eq!(p.open(), dec!(1.1));

        let bad = r#"{"date":"2023-01-02","date_string":"Jan 02, 2023","open":"1.1","high":"1.0","low":"1.0","close":"1.15"}"#;
        assert!(serde_json::from_str::<PriceDataPoint>(bad).is_err());
    }

    #[test]
    fn test_price_point_serializes_decimals_exactly() {
        let p = PriceDataPoint::new(
            ymd(2023, 1, 2),
            "Jan 02, 2023",
            dec!(1.1),
            dec!(1.1),
            dec!(1.1),
            dec!(1.1),
        )
        .unwrap();
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["close"], "1.1");
    }

    #[test]
    fn test_empty_date_string_falls_back_to_display_form() {
        let p = PriceDataPoint::new(
            ymd(2023, 1, 2),
            "  ",
            dec!(1),
            dec!(1),
            dec!(1),
            dec!(1),
        )
        .unwrap();
        assert_eq!(p.date_string(), "Jan 02, 2023");
    }

    #[test]
    fn test_file_operation_summary() {
        let ok = FileOperationResult::written(
            PathBuf::from("/tmp/USDEUR_historical_data.csv"),
            OutputFormat::Csv,
            4,
            Some(120),
        );
        assert_eq!(
            ok.summary(),
            "CSV data saved to /tmp/USDEUR_historical_data.csv (120 bytes) - 4 rows"
        );
    }
}

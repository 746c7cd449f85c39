//! Error taxonomy for the extraction pipeline.

use std::fmt;
use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::{FileOperationResult, OutputFormat};

/// Which date field of a request a violation refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateField {
    Start,
    End,
}

impl fmt::Display for DateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateField::Start => f.write_str("start date"),
            DateField::End => f.write_str("end date"),
        }
    }
}

/// A single constraint broken by a raw extraction request.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "violation", content = "detail", rename_all = "snake_case")]
pub enum Violation {
    #[error("currency pair cannot be empty")]
    EmptyCurrencyPair,

    #[error("currency pair '{0}' must be six letters (e.g. USDEUR)")]
    MalformedCurrencyPair(String),

    #[error("currency code '{code}' in '{pair}' is not supported")]
    UnsupportedCurrency { pair: String, code: String },

    #[error("currency pair '{0}' quotes a currency against itself")]
    IdenticalCurrencies(String),

    #[error("{field} '{input}' is not a recognised date (use 'MMM DD, YYYY' or YYYY-MM-DD)")]
    UnparseableDate { field: DateField, input: String },

    #[error("start date {start} cannot be later than {today}")]
    StartDateInFuture { start: NaiveDate, today: NaiveDate },

    #[error("end date {end} cannot be earlier than {minimum}")]
    EndDateBeforeMinimum { end: NaiveDate, minimum: NaiveDate },

    #[error("end date {end} must be strictly earlier than start date {start}")]
    EndNotBeforeStart { start: NaiveDate, end: NaiveDate },

    #[error("output format '{0}' is not one of csv, json, both")]
    UnknownOutputFormat(String),

    #[error("output file name '{name}' cannot contain '{character}'")]
    InvalidOutputFile { name: String, character: char },
}

/// A rejected extraction request, listing every violated constraint.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid extraction request: {}", join_violations(.violations))]
pub struct ValidationError {
    pub violations: Vec<Violation>,
}

impl ValidationError {
    pub fn new(violations: Vec<Violation>) -> Self {
        Self { violations }
    }

    /// Whether a violation of the given shape was reported.
    pub fn contains(&self, predicate: impl Fn(&Violation) -> bool) -> bool {
        self.violations.iter().any(predicate)
    }
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Machine-readable error category carried by results next to the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NavigationTimeout,
    Navigation,
    NoDataFound,
    ExportFormat,
    Io,
}

impl ErrorKind {
    /// Environmental failures a caller may retry with backoff.
    pub fn is_transient(self) -> bool {
        matches!(self, ErrorKind::NavigationTimeout | ErrorKind::Navigation)
    }
}

/// Errors raised by the extraction pipeline.
#[derive(thiserror::Error, Debug)]
pub enum ExtractError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("navigation timed out after {timeout_ms}ms waiting for the price table at {url}")]
    NavigationTimeout { url: String, timeout_ms: u64 },

    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("no price data found for {currency_pair} at {url}: {detail}")]
    NoDataFound {
        currency_pair: String,
        url: String,
        detail: String,
    },

    #[error("{} is not a compatible {format} export: {message}", .path.display())]
    ExportFormat {
        path: PathBuf,
        format: OutputFormat,
        message: String,
    },

    #[error("export failed for {} of {} output file(s)", failed_count(.files), .files.len())]
    ExportFailed { files: Vec<FileOperationResult> },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

fn failed_count(files: &[FileOperationResult]) -> usize {
    files.iter().filter(|f| !f.success).count()
}

impl ExtractError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExtractError::Validation(_) => ErrorKind::Validation,
            ExtractError::NavigationTimeout { .. } => ErrorKind::NavigationTimeout,
            ExtractError::Navigation { .. } => ErrorKind::Navigation,
            ExtractError::NoDataFound { .. } => ErrorKind::NoDataFound,
            ExtractError::ExportFormat { .. } => ErrorKind::ExportFormat,
            ExtractError::ExportFailed { files } => files
                .iter()
                .find_map(|f| f.error_kind)
                .unwrap_or(ErrorKind::Io),
            ExtractError::Io(_) | ExtractError::Json(_) | ExtractError::Csv(_) => ErrorKind::Io,
        }
    }
}

/// Convenience result type.
pub type ExtractResult<T> = Result<T, ExtractError>;

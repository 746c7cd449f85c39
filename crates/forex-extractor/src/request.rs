//! Request validation: raw inputs in, [`ExtractionRequest`] or a full list of
//! violations out. Pure and synchronous; no I/O happens here.

use chrono::{Local, NaiveDate};
use regex::Regex;
use std::sync::OnceLock;

use crate::config::ExtractorConfig;
use crate::dates::DateInput;
use crate::error::{DateField, ValidationError, Violation};
use crate::types::{ExtractionRequest, OutputFormat};

/// Currency codes the history page quotes.
pub const SUPPORTED_CURRENCIES: &[&str] = &[
    "AED", "ARS", "AUD", "BGN", "BRL", "CAD", "CHF", "CLP", "CNY", "COP", "CZK", "DKK", "EGP",
    "EUR", "GBP", "HKD", "HUF", "IDR", "ILS", "INR", "ISK", "JPY", "KES", "KRW", "KWD", "MXN",
    "MYR", "NGN", "NOK", "NZD", "PEN", "PHP", "PKR", "PLN", "QAR", "RON", "RUB", "SAR", "SEK",
    "SGD", "THB", "TRY", "TWD", "USD", "VND", "ZAR",
];

const INVALID_FILENAME_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

fn pair_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^([A-Z]{3})([A-Z]{3})$").expect("static regex"))
}

/// Optional parts of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOptions {
    pub output_format: String,
    pub output_file: Option<String>,
    pub append_to_file: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            output_format: "csv".to_string(),
            output_file: None,
            append_to_file: true,
        }
    }
}

impl RequestOptions {
    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.output_format = format.into();
        self
    }

    pub fn output_file(mut self, name: impl Into<String>) -> Self {
        self.output_file = Some(name.into());
        self
    }

    pub fn append(mut self, append: bool) -> Self {
        self.append_to_file = append;
        self
    }
}

/// Validates requests against a fixed historical window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestValidator {
    min_date: NaiveDate,
    today: NaiveDate,
}

impl RequestValidator {
    pub fn new(min_date: NaiveDate, today: NaiveDate) -> Self {
        Self { min_date, today }
    }

    /// Window from the configured minimum date up to today's local date.
    pub fn from_config(config: &ExtractorConfig) -> Self {
        Self::new(config.min_date, Local::now().date_naive())
    }

    /// Check every constraint and report all violations, in a fixed order.
    pub fn validate(
        &self,
        currency_pair: &str,
        start_date: &DateInput,
        end_date: &DateInput,
        options: &RequestOptions,
    ) -> Result<ExtractionRequest, ValidationError> {
        let mut violations = Vec::new();

        let pair = currency_pair.trim().to_ascii_uppercase();
        check_pair(&pair, &mut violations);

        let start = resolve_date(DateField::Start, start_date, &mut violations);
        let end = resolve_date(DateField::End, end_date, &mut violations);

        if let Some(start) = start {
            if start > self.today {
                violations.push(Violation::StartDateInFuture {
                    start,
                    today: self.today,
                });
            }
        }
        if let Some(end) = end {
            if end < self.min_date {
                violations.push(Violation::EndDateBeforeMinimum {
                    end,
                    minimum: self.min_date,
                });
            }
        }
        if let (Some(start), Some(end)) = (start, end) {
            if end >= start {
                violations.push(Violation::EndNotBeforeStart { start, end });
            }
        }

        let format = match options.output_format.parse::<OutputFormat>() {
            Ok(format) => Some(format),
            Err(raw) => {
                violations.push(Violation::UnknownOutputFormat(raw));
                None
            }
        };

        let output_file = options
            .output_file
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty());
        if let Some(name) = output_file {
            if let Some(character) = name.chars().find(|c| INVALID_FILENAME_CHARS.contains(c)) {
                violations.push(Violation::InvalidOutputFile {
                    name: name.to_string(),
                    character,
                });
            }
        }

        match (start, end, format) {
            (Some(start), Some(end), Some(format)) if violations.is_empty() => {
                Ok(ExtractionRequest::from_validated(
                    pair,
                    start,
                    end,
                    format,
                    output_file.map(str::to_string),
                    options.append_to_file,
                ))
            }
            _ => Err(ValidationError::new(violations)),
        }
    }
}

fn check_pair(pair: &str, violations: &mut Vec<Violation>) {
    if pair.is_empty() {
        violations.push(Violation::EmptyCurrencyPair);
        return;
    }
    let Some(caps) = pair_pattern().captures(pair) else {
        violations.push(Violation::MalformedCurrencyPair(pair.to_string()));
        return;
    };
    let (base, quote) = (&caps[1], &caps[2]);
    for code in [base, quote] {
        if !SUPPORTED_CURRENCIES.contains(&code) {
            violations.push(Violation::UnsupportedCurrency {
                pair: pair.to_string(),
                code: code.to_string(),
            });
        }
    }
    if base == quote {
        violations.push(Violation::IdenticalCurrencies(pair.to_string()));
    }
}

fn resolve_date(
    field: DateField,
    input: &DateInput,
    violations: &mut Vec<Violation>,
) -> Option<NaiveDate> {
    let resolved = input.resolve();
    if resolved.is_none() {
        violations.push(Violation::UnparseableDate {
            field,
            input: input.raw(),
        });
    }
    resolved
}

/// Build a request against the window configured by the `FOREX_*`
/// environment, the same configuration [`crate::get_forex_data`] uses.
///
/// Use [`RequestValidator::from_config`] to validate against an explicit
/// [`ExtractorConfig`].
pub fn create_extraction_request(
    currency_pair: &str,
    start_date: impl Into<DateInput>,
    end_date: impl Into<DateInput>,
    options: RequestOptions,
) -> Result<ExtractionRequest, ValidationError> {
    RequestValidator::from_config(&ExtractorConfig::from_env()).validate(
        currency_pair,
        &start_date.into(),
        &end_date.into(),
        &options,
    )
}

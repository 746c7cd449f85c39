//! Date parsing and formatting shared by validation, parsing and export.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// Textual date formats accepted for requests and table cells, tried in order.
pub const SUPPORTED_DATE_FORMATS: &[&str] = &[
    "%b %d, %Y", // Sep 30, 2024
    "%B %d, %Y", // September 30, 2024
    "%Y-%m-%d",  // 2024-09-30
    "%m/%d/%Y",  // 09/30/2024
    "%d/%m/%Y",  // 30/09/2024
];

/// Display format used for date strings written to disk.
pub const DISPLAY_FORMAT: &str = "%b %d, %Y";

const LONG_DISPLAY_FORMAT: &str = "%B %d, %Y";

/// Parse a date string using the first matching supported format.
pub fn parse_date_string(input: &str) -> Option<NaiveDate> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    SUPPORTED_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
}

/// Unix timestamp (seconds) of midnight UTC on the given date.
pub fn date_to_unix(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp()
}

/// How verbose a displayed date should be.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayStyle {
    /// `Sep 30, 2024`
    #[default]
    Short,
    /// `September 30, 2024`
    Long,
}

pub fn format_date_for_display(date: NaiveDate, style: DisplayStyle) -> String {
    match style {
        DisplayStyle::Short => date.format(DISPLAY_FORMAT).to_string(),
        DisplayStyle::Long => date.format(LONG_DISPLAY_FORMAT).to_string(),
    }
}

/// A date given either as text or as an already-typed value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateInput {
    Text(String),
    Date(NaiveDate),
}

impl DateInput {
    pub fn resolve(&self) -> Option<NaiveDate> {
        match self {
            DateInput::Text(s) => parse_date_string(s),
            DateInput::Date(d) => Some(*d),
        }
    }

    /// The raw form, for error messages.
    pub fn raw(&self) -> String {
        match self {
            DateInput::Text(s) => s.clone(),
            DateInput::Date(d) => d.to_string(),
        }
    }
}

impl From<&str> for DateInput {
    fn from(s: &str) -> Self {
        DateInput::Text(s.to_string())
    }
}

impl From<String> for DateInput {
    fn from(s: String) -> Self {
        DateInput::Text(s)
    }
}

impl From<NaiveDate> for DateInput {
    fn from(d: NaiveDate) -> Self {
        DateInput::Date(d)
    }
}

//! Extractor configuration.
//!
//! One immutable [`ExtractorConfig`] value is built at startup and handed to
//! the navigator, parser and exporter by construction.

use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::dates::parse_date_string;

/// History page template; `{pair}` is replaced by the currency pair.
pub const DEFAULT_BASE_URL: &str = "https://finance.yahoo.com/quote/{pair}=X/history/";

/// CSS selectors used to locate the price table in the rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSelectors {
    /// Present once the table has rendered.
    pub table: String,
    pub header_cells: String,
    pub body_rows: String,
    pub cells: String,
}

impl Default for TableSelectors {
    fn default() -> Self {
        Self {
            table: "div.table-container table".to_string(),
            header_cells: "div.table-container table thead tr th".to_string(),
            body_rows: "div.table-container table tbody tr".to_string(),
            cells: "td".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractorConfig {
    pub base_url: String,
    pub headless: bool,
    /// Upper bound for navigation plus waiting for the table, in milliseconds.
    /// `0` means no limit.
    pub page_timeout_ms: u64,
    /// How long closing a browser session may take before it is abandoned.
    pub close_timeout_ms: u64,
    /// Pause after the table appears so late rows can render.
    pub settle_delay_ms: u64,
    pub poll_interval_ms: u64,
    /// CDP resource types that are never fetched.
    pub blocked_resource_types: Vec<String>,
    pub selectors: TableSelectors,
    pub output_dir: PathBuf,
    pub json_indent: usize,
    /// Oldest date a request may reach back to.
    pub min_date: NaiveDate,
    pub chromium_path: Option<PathBuf>,
    /// Narrowest row treated as a price row (date + open/high/low/close).
    pub min_price_columns: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            headless: true,
            page_timeout_ms: 30_000,
            close_timeout_ms: 5_000,
            settle_delay_ms: 1_000,
            poll_interval_ms: 250,
            blocked_resource_types: ["Image", "Font", "Stylesheet", "Media"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            selectors: TableSelectors::default(),
            output_dir: PathBuf::from("Extracted_Data"),
            json_indent: 2,
            min_date: NaiveDate::from_ymd_opt(2005, 1, 1).unwrap_or(NaiveDate::MIN),
            chromium_path: None,
            min_price_columns: 5,
        }
    }
}

impl ExtractorConfig {
    /// Defaults overlaid with `FOREX_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a key lookup. Unparseable values are ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = lookup("FOREX_OUTPUT_DIR").filter(|s| !s.trim().is_empty()) {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup("FOREX_HEADLESS") {
            match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => self.headless = true,
                "0" | "false" | "no" => self.headless = false,
                _ => tracing::warn!("ignoring FOREX_HEADLESS={raw}: expected true or false"),
            }
        }
        if let Some(raw) = lookup("FOREX_PAGE_TIMEOUT_MS") {
            match raw.trim().parse::<u64>() {
                Ok(ms) => self.page_timeout_ms = ms,
                Err(_) => tracing::warn!("ignoring FOREX_PAGE_TIMEOUT_MS={raw}"),
            }
        }
        if let Some(raw) = lookup("FOREX_JSON_INDENT") {
            match raw.trim().parse::<usize>() {
                Ok(n) => self.json_indent = n,
                Err(_) => tracing::warn!("ignoring FOREX_JSON_INDENT={raw}"),
            }
        }
        if let Some(path) = lookup("FOREX_CHROMIUM_PATH").filter(|s| !s.trim().is_empty()) {
            self.chromium_path = Some(PathBuf::from(path));
        }
        if let Some(raw) = lookup("FOREX_MIN_DATE") {
            match parse_date_string(&raw) {
                Some(date) => self.min_date = date,
                None => tracing::warn!("ignoring FOREX_MIN_DATE={raw}"),
            }
        }
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// `Duration::MAX` when the page timeout is disabled.
    pub fn page_timeout(&self) -> Duration {
        match self.page_timeout_ms {
            0 => Duration::MAX,
            ms => Duration::from_millis(ms),
        }
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// History page URL for a pair, without query parameters.
    pub fn page_url(&self, currency_pair: &str) -> String {
        self.base_url.replace("{pair}", currency_pair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ExtractorConfig::default();
        assert!(config.headless);
        assert_eq!(config.json_indent, 2);
        assert_eq!(config.min_date, NaiveDate::from_ymd_opt(2005, 1, 1).unwrap());
        assert!(config.blocked_resource_types.iter().any(|t| t == "Image"));
        assert_eq!(
            config.page_url("USDEUR"),
            "https://finance.yahoo.com/quote/USDEUR=X/history/"
        );
    }

    #[test]
    fn test_env_overrides() {
        let config = ExtractorConfig::default().with_overrides(lookup(&[
            ("FOREX_OUTPUT_DIR", "/tmp/fx"),
            ("FOREX_HEADLESS", "false"),
            ("FOREX_PAGE_TIMEOUT_MS", "5000"),
            ("FOREX_JSON_INDENT", "4"),
            ("FOREX_MIN_DATE", "2010-06-01"),
        ]));
        assert_eq!(config.output_dir, PathBuf::from("/tmp/fx"));
        assert!(!config.headless);
        assert_eq!(config.page_timeout(), Duration::from_secs(5));
        assert_eq!(config.json_indent, 4);
        assert_eq!(config.min_date, NaiveDate::from_ymd_opt(2010, 6, 1).unwrap());
    }

    #[test]
    fn test_invalid_overrides_are_ignored() {
        let config = ExtractorConfig::default().with_overrides(lookup(&[
            ("FOREX_HEADLESS", "maybe"),
            ("FOREX_PAGE_TIMEOUT_MS", "soon"),
            ("FOREX_JSON_INDENT", "-1"),
            ("FOREX_MIN_DATE", "yesterday"),
        ]));
        assert_eq!(config, ExtractorConfig::default());
    }

    #[test]
    fn test_zero_page_timeout_means_no_limit() {
        let config =
            ExtractorConfig::default().with_overrides(lookup(&[("FOREX_PAGE_TIMEOUT_MS", "0")]));
        assert_eq!(config.page_timeout(), Duration::MAX);

        let config = ExtractorConfig::default()
            .with_overrides(lookup(&[("FOREX_PAGE_TIMEOUT_MS", "18446744073709551615")]));
        assert_eq!(config.page_timeout_ms, u64::MAX);
        assert_eq!(config.page_timeout(), Duration::from_millis(u64::MAX));
    }
}

//! Price table parsing.
//!
//! The parser consumes any [`TableSource`] (header texts plus rows of cell
//! texts). [`HtmlTable`] is the adapter that reads those from rendered HTML
//! with the `scraper` crate, so a page layout change only touches the
//! selectors in [`TableSelectors`].

use std::str::FromStr;

use rust_decimal::Decimal;
use scraper::{ElementRef, Html, Selector};

use crate::config::{ExtractorConfig, TableSelectors};
use crate::dates::parse_date_string;
use crate::types::{InvalidPrice, PriceDataPoint};

/// A table as header texts and rows of cell texts.
pub trait TableSource {
    fn headers(&self) -> Vec<String>;
    fn rows(&self) -> Vec<Vec<String>>;
}

/// In-memory table, useful for feeds that are not HTML.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableRows {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TableSource for TableRows {
    fn headers(&self) -> Vec<String> {
        self.headers.clone()
    }

    fn rows(&self) -> Vec<Vec<String>> {
        self.rows.clone()
    }
}

/// Header and row texts read from rendered HTML.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HtmlTable {
    inner: TableRows,
}

impl HtmlTable {
    /// Extract the table located by `selectors` from a full HTML document.
    pub fn parse(html: &str, selectors: &TableSelectors) -> Self {
        let document = Html::parse_document(html);
        let mut inner = TableRows::default();

        match Selector::parse(&selectors.header_cells) {
            Ok(sel) => {
                inner.headers = document
                    .select(&sel)
                    .map(|el| element_text(&el))
                    .filter(|text| !text.is_empty())
                    .collect();
            }
            Err(e) => tracing::warn!("invalid header selector '{}': {e}", selectors.header_cells),
        }

        let (rows_sel, cells_sel) = match (
            Selector::parse(&selectors.body_rows),
            Selector::parse(&selectors.cells),
        ) {
            (Ok(rows), Ok(cells)) => (rows, cells),
            _ => {
                tracing::warn!(
                    "invalid row selectors '{}' / '{}'",
                    selectors.body_rows,
                    selectors.cells
                );
                return Self { inner };
            }
        };

        for row in document.select(&rows_sel) {
            let cells: Vec<String> = row.select(&cells_sel).map(|c| element_text(&c)).collect();
            if !cells.is_empty() {
                inner.rows.push(cells);
            }
        }

        Self { inner }
    }
}

impl TableSource for HtmlTable {
    fn headers(&self) -> Vec<String> {
        self.inner.headers()
    }

    fn rows(&self) -> Vec<Vec<String>> {
        self.inner.rows()
    }
}

fn element_text(el: &ElementRef<'_>) -> String {
    el.text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Why a price-shaped row was dropped.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RowError {
    #[error("unrecognised date '{0}'")]
    BadDate(String),

    #[error("{column} cell '{value}' is not numeric")]
    BadNumber { column: &'static str, value: String },

    #[error(transparent)]
    InvalidPrice(#[from] InvalidPrice),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowRejection {
    /// Zero-based index of the row in the table body.
    pub index: usize,
    pub reason: RowError,
}

/// Everything read from one table, in page order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedTable {
    pub headers: Vec<String>,
    pub points: Vec<PriceDataPoint>,
    /// Annotation rows (dividends, splits) that are not price rows.
    pub skipped: usize,
    pub dropped: Vec<RowRejection>,
}

/// Cell positions of the price columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ColumnMap {
    date: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
}

impl ColumnMap {
    const POSITIONAL: ColumnMap = ColumnMap {
        date: 0,
        open: 1,
        high: 2,
        low: 3,
        close: 4,
    };

    /// Locate columns by header name, falling back to page position when any
    /// of them is missing.
    fn from_headers(headers: &[String]) -> Self {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().to_ascii_lowercase().starts_with(name))
        };
        match (find("date"), find("open"), find("high"), find("low"), find("close")) {
            (Some(date), Some(open), Some(high), Some(low), Some(close)) => ColumnMap {
                date,
                open,
                high,
                low,
                close,
            },
            _ => Self::POSITIONAL,
        }
    }

    fn width(&self) -> usize {
        [self.date, self.open, self.high, self.low, self.close]
            .into_iter()
            .max()
            .unwrap_or(0)
            + 1
    }
}

/// Turns table rows into validated price points.
#[derive(Debug, Clone)]
pub struct TableParser {
    selectors: TableSelectors,
    min_price_columns: usize,
}

impl TableParser {
    pub fn new(config: &ExtractorConfig) -> Self {
        Self {
            selectors: config.selectors.clone(),
            min_price_columns: config.min_price_columns,
        }
    }

    /// Parse the price table out of rendered HTML.
    pub fn parse_html(&self, html: &str) -> ParsedTable {
        self.parse(&HtmlTable::parse(html, &self.selectors))
    }

    /// Parse any table source. Malformed rows are dropped and counted; page
    /// order is preserved.
    pub fn parse(&self, table: &dyn TableSource) -> ParsedTable {
        let headers = table.headers();
        let columns = ColumnMap::from_headers(&headers);
        let min_width = columns.width().max(self.min_price_columns);

        let mut parsed = ParsedTable {
            headers,
            ..ParsedTable::default()
        };

        for (index, cells) in table.rows().into_iter().enumerate() {
            if cells.len() < min_width || is_annotation(&cells) {
                parsed.skipped += 1;
                continue;
            }
            match parse_row(&cells, columns) {
                Ok(point) => parsed.points.push(point),
                Err(reason) => {
                    tracing::debug!("dropping row {index}: {reason}");
                    parsed.dropped.push(RowRejection { index, reason });
                }
            }
        }

        parsed
    }
}

fn is_annotation(cells: &[String]) -> bool {
    cells.iter().skip(1).any(|c| {
        let lower = c.to_ascii_lowercase();
        lower.contains("dividend") || lower.contains("split")
    })
}

fn parse_row(cells: &[String], columns: ColumnMap) -> Result<PriceDataPoint, RowError> {
    let date_text = cells[columns.date].trim();
    let date = parse_date_string(date_text).ok_or_else(|| RowError::BadDate(date_text.to_string()))?;

    let open = parse_price("open", &cells[columns.open])?;
    let high = parse_price("high", &cells[columns.high])?;
    let low = parse_price("low", &cells[columns.low])?;
    let close = parse_price("close", &cells[columns.close])?;

    Ok(PriceDataPoint::new(date, date_text, open, high, low, close)?)
}

/// Parse a price cell straight into a decimal, stripping thousands separators.
pub fn parse_price(column: &'static str, raw: &str) -> Result<Decimal, RowError> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    Decimal::from_str(&cleaned).map_err(|_| RowError::BadNumber {
        column,
        value: raw.trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    fn parser() -> TableParser {
        TableParser::new(&ExtractorConfig::default())
    }

    const PAGE: &str = r#"
    <html><body>
    <section class="gridLayout"><div class="container">
      <div class="table-container">
        <table class="table">
          <thead><tr>
            <th>Date</th><th>Open</th><th>High</th><th>Low</th>
            <th>Close <span>Close price adjusted for splits.</span></th>
            <th>Adj Close</th><th>Volume</th>
          </tr></thead>
          <tbody>
            <tr><td>Dec 29, 2023</td><td>0.9050</td><td>0.9080</td><td>0.9010</td><td>0.9060</td><td>0.9060</td><td>-</td></tr>
            <tr><td>Dec 28, 2023</td><td>0.9000</td><td>0.9070</td><td>0.8990</td><td>0.9040</td><td>0.9040</td><td>-</td></tr>
            <tr><td>Dec 27, 2023</td><td colspan="6">0.25 Dividend</td></tr>
            <tr><td>Dec 26, 2023</td><td>0.9100</td><td>0.9120</td><td>0.9050</td><td>N/A</td><td>N/A</td><td>-</td></tr>
          </tbody>
        </table>
      </div>
    </div></section>
    </body></html>
    "#;

    #[test]
    fn test_html_table_reads_headers_and_rows() {
        let table = HtmlTable::parse(PAGE, &TableSelectors::default());
        let headers = table.headers();
        assert_eq!(headers.len(), 7);
        assert_eq!(headers[0], "Date");
        assert_eq!(headers[4], "Close Close price adjusted for splits.");
        assert_eq!(table.rows().len(), 4);
    }

    #[test]
    fn test_parse_html_skips_annotations_and_drops_garbage() {
        let parsed = parser().parse_html(PAGE);
        assert_eq!(parsed.points.len(), 2);
        assert_eq!(parsed.skipped, 1);
        assert_eq!(parsed.dropped.len(), 1);
        assert_eq!(parsed.dropped[0].index, 3);
        assert!(matches!(
            parsed.dropped[0].reason,
            RowError::BadNumber { column: "close", .. }
        ));

        // Page order is preserved.
        assert_eq!(parsed.points[0].date_string(), "Dec 29, 2023");
        assert_eq!(parsed.points[1].date_string(), "Dec 28, 2023");
        assert_eq!(parsed.points[0].close(), dec!(0.9060));
    }

    #[test]
    fn test_columns_follow_headers() {
        let table = TableRows {
            headers: row(&["Date", "Close", "Open", "High", "Low"]),
            rows: vec![row(&["2024-01-02", "1.10", "1.08", "1.12", "1.07"])],
        };
        let parsed = parser().parse(&table);
        assert_eq!(parsed.points.len(), 1);
        let p = &parsed.points[0];
        assert_eq!(p.close(), dec!(1.10));
        assert_eq!(p.open(), dec!(1.08));
        assert_eq!(p.high(), dec!(1.12));
    }

    #[test]
    fn test_positional_fallback_without_headers() {
        let table = TableRows {
            headers: vec![],
            rows: vec![row(&["Jan 02, 2024", "1.08", "1.12", "1.07", "1.10"])],
        };
        let parsed = parser().parse(&table);
        assert_eq!(parsed.points.len(), 1);
        assert!(parsed.headers.is_empty());
    }

    #[test]
    fn test_thousands_separators_and_exact_decimals() {
        assert_eq!(parse_price("close", " 1,234.5678 ").unwrap(), dec!(1234.5678));
        assert_eq!(parse_price("close", "1.1").unwrap().to_string(), "1.1");
        assert!(parse_price("close", "-").is_err());
        assert!(parse_price("close", "").is_err());
    }

    #[test]
    fn test_inconsistent_ohlc_row_dropped() {
        let table = TableRows {
            headers: vec![],
            rows: vec![
                row(&["Jan 03, 2024", "1.08", "1.05", "1.07", "1.10"]),
                row(&["Jan 02, 2024", "1.08", "1.12", "1.07", "1.10"]),
            ],
        };
        let parsed = parser().parse(&table);
        assert_eq!(parsed.points.len(), 1);
        assert!(matches!(
            parsed.dropped[0].reason,
            RowError::InvalidPrice(InvalidPrice::HighTooLow { .. })
        ));
    }

    #[test]
    fn test_bad_date_row_dropped() {
        let table = TableRows {
            headers: vec![],
            rows: vec![row(&["Someday", "1.08", "1.12", "1.07", "1.10"])],
        };
        let parsed = parser().parse(&table);
        assert!(parsed.points.is_empty());
        assert_eq!(parsed.dropped[0].reason, RowError::BadDate("Someday".into()));
    }

    #[test]
    fn test_invalid_selectors_yield_empty_table() {
        let selectors = TableSelectors {
            body_rows: "tbody tr[".into(),
            ..TableSelectors::default()
        };
        let table = HtmlTable::parse(PAGE, &selectors);
        assert!(table.rows().is_empty());
    }
}

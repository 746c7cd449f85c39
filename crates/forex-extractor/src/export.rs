//! CSV and JSON export with append-or-overwrite semantics.
//!
//! Appending de-duplicates by date within the target file (a file already
//! belongs to one currency pair). An existing file whose structure does not
//! match the expected layout is never rewritten; the write fails with
//! [`ExtractError::ExportFormat`] instead.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::ExtractorConfig;
use crate::dates::parse_date_string;
use crate::error::{ExtractError, ExtractResult};
use crate::types::{
    ExtractionMetadata, ExtractionRequest, FileOperationResult, ForexExtractionResult,
    OutputFormat, PriceDataPoint,
};

/// Header row of every CSV export.
pub const CSV_HEADERS: [&str; 5] = ["date", "open", "high", "low", "close"];

/// On-disk layout of a JSON export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonExport {
    pub currency_pair: String,
    pub extraction_date: DateTime<Utc>,
    pub data_count: usize,
    pub historical_data: Vec<PriceDataPoint>,
    pub metadata: ExtractionMetadata,
}

/// Writes extraction results to the output directory.
#[derive(Debug, Clone)]
pub struct Exporter {
    output_dir: PathBuf,
    json_indent: usize,
}

impl Exporter {
    pub fn new(config: &ExtractorConfig) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            json_indent: config.json_indent,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Where `format` output for `request` is written.
    ///
    /// An explicit output file keeps its stem and gets the format's
    /// extension; relative names resolve inside the output directory.
    pub fn target_path(&self, request: &ExtractionRequest, format: OutputFormat) -> PathBuf {
        let extension = format.extension();
        let name = match request.output_file() {
            Some(name) => with_extension(name, extension),
            None => request.default_filename(extension),
        };
        let path = PathBuf::from(name);
        if path.is_absolute() {
            path
        } else {
            self.output_dir.join(path)
        }
    }

    /// Write every format the request asks for. One result per file; a
    /// failure in one format does not stop the others.
    pub async fn export(
        &self,
        result: &ForexExtractionResult,
        request: &ExtractionRequest,
    ) -> Vec<FileOperationResult> {
        let mut written = Vec::new();
        for format in request.output_format().targets() {
            let outcome = match format {
                OutputFormat::Json => self.export_json(result, request).await,
                _ => self.export_csv(result, request).await,
            };
            if outcome.success {
                info!("{}", outcome.summary());
            } else {
                warn!("{}", outcome.summary());
            }
            written.push(outcome);
        }
        written
    }

    pub async fn export_csv(
        &self,
        result: &ForexExtractionResult,
        request: &ExtractionRequest,
    ) -> FileOperationResult {
        let path = self.target_path(request, OutputFormat::Csv);
        match self.write_csv(result, request.append_to_file(), &path).await {
            Ok((rows, size)) => FileOperationResult::written(path, OutputFormat::Csv, rows, size),
            Err(e) => FileOperationResult::failed(path, OutputFormat::Csv, &e),
        }
    }

    pub async fn export_json(
        &self,
        result: &ForexExtractionResult,
        request: &ExtractionRequest,
    ) -> FileOperationResult {
        let path = self.target_path(request, OutputFormat::Json);
        match self.write_json(result, request.append_to_file(), &path).await {
            Ok((rows, size)) => FileOperationResult::written(path, OutputFormat::Json, rows, size),
            Err(e) => FileOperationResult::failed(path, OutputFormat::Json, &e),
        }
    }

    async fn write_csv(
        &self,
        result: &ForexExtractionResult,
        append: bool,
        path: &Path,
    ) -> ExtractResult<(usize, Option<u64>)> {
        let existing = if append { read_existing(path).await? } else { None };

        let (mut bytes, seen) = match existing {
            Some(bytes) if !bytes.iter().all(u8::is_ascii_whitespace) => {
                let seen = existing_csv_dates(&bytes, path)?;
                let mut bytes = bytes;
                if !bytes.ends_with(b"\n") {
                    bytes.push(b'\n');
                }
                (bytes, seen)
            }
            _ => {
                let mut header = csv_writer();
                header.write_record(CSV_HEADERS)?;
                (into_bytes(header)?, HashSet::new())
            }
        };

        let fresh = fresh_points(result.data_points(), seen);
        let mut writer = csv_writer();
        for point in &fresh {
            writer.write_record([
                point.date_string().to_string(),
                point.open().to_string(),
                point.high().to_string(),
                point.low().to_string(),
                point.close().to_string(),
            ])?;
        }
        bytes.extend(into_bytes(writer)?);

        let size = write_file(path, &bytes).await?;
        Ok((fresh.len(), Some(size)))
    }

    async fn write_json(
        &self,
        result: &ForexExtractionResult,
        append: bool,
        path: &Path,
    ) -> ExtractResult<(usize, Option<u64>)> {
        let metadata = result.metadata().clone();
        let existing = if append { read_existing(path).await? } else { None };

        let (mut document, rows) = match existing {
            Some(bytes) if !bytes.iter().all(u8::is_ascii_whitespace) => {
                let mut document = parse_json_export(&bytes, path)?;
                if document.currency_pair != metadata.currency_pair {
                    return Err(ExtractError::ExportFormat {
                        path: path.to_path_buf(),
                        format: OutputFormat::Json,
                        message: format!(
                            "file holds {} data, not {}",
                            document.currency_pair, metadata.currency_pair
                        ),
                    });
                }
                let seen = document.historical_data.iter().map(|p| p.date()).collect();
                let fresh = fresh_points(result.data_points(), seen);
                let rows = fresh.len();
                document.historical_data.extend(fresh);
                document.metadata = metadata;
                (document, rows)
            }
            _ => {
                let data = result.data_points().to_vec();
                let rows = data.len();
                let document = JsonExport {
                    currency_pair: metadata.currency_pair.clone(),
                    extraction_date: metadata.extraction_timestamp,
                    data_count: 0,
                    historical_data: data,
                    metadata,
                };
                (document, rows)
            }
        };
        document.extraction_date = document.metadata.extraction_timestamp;
        document.data_count = document.historical_data.len();

        let bytes = self.encode_json(&document)?;
        let size = write_file(path, &bytes).await?;
        Ok((rows, Some(size)))
    }

    fn encode_json(&self, document: &JsonExport) -> ExtractResult<Vec<u8>> {
        if self.json_indent == 0 {
            return Ok(serde_json::to_vec(document)?);
        }
        let indent = vec![b' '; self.json_indent];
        let formatter = serde_json::ser::PrettyFormatter::with_indent(&indent);
        let mut bytes = Vec::new();
        let mut ser = serde_json::Serializer::with_formatter(&mut bytes, formatter);
        document.serialize(&mut ser)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

/// Parse a JSON export, mapping any structural mismatch to `ExportFormat`.
pub fn parse_json_export(bytes: &[u8], path: &Path) -> ExtractResult<JsonExport> {
    serde_json::from_slice(bytes).map_err(|e| ExtractError::ExportFormat {
        path: path.to_path_buf(),
        format: OutputFormat::Json,
        message: e.to_string(),
    })
}

fn with_extension(name: &str, extension: &str) -> String {
    let lower = name.to_ascii_lowercase();
    let stem = [".csv", ".json"]
        .iter()
        .find(|ext| lower.ends_with(*ext))
        .map(|ext| &name[..name.len() - ext.len()])
        .unwrap_or(name);
    format!("{stem}.{extension}")
}

fn existing_csv_dates(bytes: &[u8], path: &Path) -> ExtractResult<HashSet<NaiveDate>> {
    let format_error = |message: String| ExtractError::ExportFormat {
        path: path.to_path_buf(),
        format: OutputFormat::Csv,
        message,
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(bytes);
    let headers = reader
        .headers()
        .map_err(|e| format_error(e.to_string()))?
        .clone();
    let matches = headers.len() == CSV_HEADERS.len()
        && headers
            .iter()
            .zip(CSV_HEADERS)
            .all(|(found, expected)| found.trim().eq_ignore_ascii_case(expected));
    if !matches {
        return Err(format_error(format!(
            "unexpected header row '{}'",
            headers.iter().collect::<Vec<_>>().join(",")
        )));
    }

    let mut dates = HashSet::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(|e| format_error(e.to_string()))?;
        let raw = record.get(0).unwrap_or_default();
        let date = parse_date_string(raw)
            .ok_or_else(|| format_error(format!("row {} has unrecognised date '{raw}'", line + 1)))?;
        dates.insert(date);
    }
    Ok(dates)
}

/// Points whose date is not yet in `seen`, in page order.
fn fresh_points(points: &[PriceDataPoint], mut seen: HashSet<NaiveDate>) -> Vec<PriceDataPoint> {
    points
        .iter()
        .filter(|p| seen.insert(p.date()))
        .cloned()
        .collect()
}

fn csv_writer() -> csv::Writer<Vec<u8>> {
    csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new())
}

fn into_bytes(writer: csv::Writer<Vec<u8>>) -> ExtractResult<Vec<u8>> {
    writer
        .into_inner()
        .map_err(|e| ExtractError::Io(e.into_error()))
}

async fn read_existing(path: &Path) -> ExtractResult<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write through a sibling temp file so readers never see a partial file.
async fn write_file(path: &Path, bytes: &[u8]) -> ExtractResult<u64> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("export");
    let tmp = path.with_file_name(format!(".{file_name}.{}.tmp", std::process::id()));
    tokio::fs::write(&tmp, bytes).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(bytes.len() as u64)
}

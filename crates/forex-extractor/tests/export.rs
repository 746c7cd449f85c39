//! Append and overwrite behaviour of the file exporter.

mod common;

use std::sync::Arc;

use common::{extractor, FakeRenderer, HISTORY_PAGE};
use forex_extractor::export::{parse_json_export, CSV_HEADERS};
use forex_extractor::{
    ErrorKind, ExtractionRequest, Extractor, ForexExtractionResult, OutputFormat, RequestOptions,
};
use tempfile::TempDir;

async fn extract(dir: &TempDir, options: RequestOptions) -> (Extractor, ExtractionRequest, ForexExtractionResult) {
    let extractor = extractor(Arc::new(FakeRenderer::serving(HISTORY_PAGE)), dir.path());
    let request = extractor
        .request("USDEUR", "Jan 10, 2024", "Jan 02, 2024", &options)
        .unwrap();
    let result = extractor.engine().extract(&request).await;
    assert!(result.success());
    (extractor, request, result)
}

#[tokio::test]
async fn test_json_append_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let (extractor, request, result) = extract(&dir, RequestOptions::default().format("json")).await;
    let path = extractor.exporter().target_path(&request, OutputFormat::Json);

    let first = extractor.exporter().export(&result, &request).await;
    assert!(first[0].success);
    assert_eq!(first[0].rows_written, 4);
    let once = std::fs::read(&path).unwrap();

    let second = extractor.exporter().export(&result, &request).await;
    assert!(second[0].success);
    assert_eq!(second[0].rows_written, 0);
    assert_eq!(std::fs::read(&path).unwrap(), once);

    let doc = parse_json_export(&once, &path).unwrap();
    assert_eq!(doc.data_count, 4);
    assert_eq!(doc.historical_data.len(), 4);
}

#[tokio::test]
async fn test_csv_append_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let (extractor, request, result) = extract(&dir, RequestOptions::default()).await;
    let path = extractor.exporter().target_path(&request, OutputFormat::Csv);

    extractor.exporter().export(&result, &request).await;
    let once = std::fs::read_to_string(&path).unwrap();
    let again = extractor.exporter().export(&result, &request).await;

    assert!(again[0].success);
    assert_eq!(again[0].rows_written, 0);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), once);
    assert_eq!(once.matches("date,open").count(), 1);
}

#[tokio::test]
async fn test_csv_append_skips_dates_already_present() {
    let dir = TempDir::new().unwrap();
    let (extractor, request, result) = extract(&dir, RequestOptions::default()).await;
    let path = extractor.exporter().target_path(&request, OutputFormat::Csv);
    std::fs::write(
        &path,
        format!(
            "{}\n\"Jan 10, 2024\",1.0950,1.0975,1.0920,1.0960\n\"Dec 29, 2023\",1.1030,1.1060,1.1010,1.1040",
            CSV_HEADERS.join(",")
        ),
    )
    .unwrap();

    let files = extractor.exporter().export(&result, &request).await;
    assert!(files[0].success);
    assert_eq!(files[0].rows_written, 3);

    let contents = std::fs::read_to_string(&path).unwrap();
    assert_eq!(contents.lines().count(), 1 + 2 + 3);
    assert_eq!(contents.matches("Jan 10, 2024").count(), 1);
    assert!(contents.contains("Dec 29, 2023"));
}

#[tokio::test]
async fn test_overwrite_replaces_existing_file() {
    let dir = TempDir::new().unwrap();
    let (extractor, request, result) = extract(&dir, RequestOptions::default().append(false)).await;
    let path = extractor.exporter().target_path(&request, OutputFormat::Csv);
    std::fs::write(&path, "stale contents\n").unwrap();

    let files = extractor.exporter().export(&result, &request).await;
    assert!(files[0].success);
    assert_eq!(files[0].rows_written, 4);

    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(!contents.contains("stale"));
    assert_eq!(contents.lines().count(), 5);
    assert_eq!(files[0].file_size_bytes, Some(contents.len() as u64));
}

#[tokio::test]
async fn test_csv_with_foreign_header_is_left_alone() {
    let dir = TempDir::new().unwrap();
    let (extractor, request, result) = extract(&dir, RequestOptions::default()).await;
    let path = extractor.exporter().target_path(&request, OutputFormat::Csv);
    std::fs::write(&path, "Date,Close\n\"Jan 10, 2024\",1.0960\n").unwrap();

    let files = extractor.exporter().export(&result, &request).await;
    assert!(!files[0].success);
    assert_eq!(files[0].error_kind, Some(ErrorKind::ExportFormat));
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "Date,Close\n\"Jan 10, 2024\",1.0960\n"
    );
}

#[tokio::test]
async fn test_json_for_other_pair_is_rejected() {
    let dir = TempDir::new().unwrap();
    let (extractor, request, result) = extract(&dir, RequestOptions::default().format("json")).await;
    extractor.exporter().export(&result, &request).await;

    let other = extractor
        .request(
            "GBPUSD",
            "Jan 10, 2024",
            "Jan 02, 2024",
            &RequestOptions::default()
                .format("json")
                .output_file("USDEUR_historical_data.json"),
        )
        .unwrap();
    let other_result = extractor.engine().extract(&other).await;
    let files = extractor.exporter().export(&other_result, &other).await;

    assert!(!files[0].success);
    assert_eq!(files[0].error_kind, Some(ErrorKind::ExportFormat));
    assert!(files[0].error_message.as_deref().unwrap().contains("USDEUR"));
}

#[tokio::test]
async fn test_missing_output_directory_is_created() {
    let dir = TempDir::new().unwrap();
    let (extractor, request, result) = extract(
        &dir,
        RequestOptions::default().output_file("nested/deeper/rates"),
    )
    .await;

    let files = extractor.exporter().export(&result, &request).await;
    assert!(files[0].success);
    assert_eq!(files[0].file_path, dir.path().join("nested/deeper/rates.csv"));
    assert!(files[0].file_path.exists());
}

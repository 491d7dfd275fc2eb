//! Integration tests for archive download and signature checks.

mod common;

use std::time::Duration;

use common::{zip_with_page, RAR};
use coursework_market::preview::{ArchiveFetcher, ArchiveKind, FetchError};
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fetcher(timeout: Duration) -> ArchiveFetcher {
    ArchiveFetcher::new(timeout, 1024 * 1024).expect("Failed to build fetcher")
}

#[tokio::test]
async fn test_fetch_zip_archive() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/work.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(zip_with_page()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let archive = fetcher(Duration::from_secs(5))
        .fetch(&format!("{}/files/work.zip", mock_server.uri()))
        .await
        .expect("zip should download");

    assert_eq!(archive.kind, ArchiveKind::Zip);
    assert!(archive.can_extract());
    assert!(archive.bytes.starts_with(b"PK\x03\x04"));
}

#[tokio::test]
async fn test_fetch_encodes_non_ascii_path() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/files/%D0%9A.*\.zip$"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(zip_with_page()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let archive = fetcher(Duration::from_secs(5))
        .fetch(&format!("{}/files/Курсовая работа.zip", mock_server.uri()))
        .await
        .expect("encoded url should download");

    assert!(archive.url.contains("%D0%9A"));
    assert!(!archive.url.contains(' '));
}

#[tokio::test]
async fn test_fetch_rar_is_recognised_but_not_extractable() {
    let mock_server = MockServer::start().await;
    // Extension says zip; the signature decides
    Mock::given(method("GET"))
        .and(path("/files/work.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(RAR))
        .mount(&mock_server)
        .await;

    let archive = fetcher(Duration::from_secs(5))
        .fetch(&format!("{}/files/work.zip", mock_server.uri()))
        .await
        .expect("rar should download");

    assert_eq!(archive.kind, ArchiveKind::Rar);
    assert!(!archive.can_extract());
}

#[tokio::test]
async fn test_fetch_http_error_status() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/missing.zip"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let result = fetcher(Duration::from_secs(5))
        .fetch(&format!("{}/files/missing.zip", mock_server.uri()))
        .await;

    assert!(matches!(result, Err(FetchError::HttpStatus(404))));
}

#[tokio::test]
async fn test_fetch_timeout() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/slow.zip"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(zip_with_page())
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&mock_server)
        .await;

    let result = fetcher(Duration::from_millis(200))
        .fetch(&format!("{}/files/slow.zip", mock_server.uri()))
        .await;

    assert!(matches!(result, Err(FetchError::Timeout(_))), "got {result:?}");
}

#[tokio::test]
async fn test_fetch_rejects_unknown_signature() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/page.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not found</html>"))
        .mount(&mock_server)
        .await;

    let result = fetcher(Duration::from_secs(5))
        .fetch(&format!("{}/files/page.zip", mock_server.uri()))
        .await;

    assert!(matches!(result, Err(FetchError::UnrecognizedSignature(_))));
}

#[tokio::test]
async fn test_fetch_rejects_oversized_body() {
    let mock_server = MockServer::start().await;
    let mut body = b"PK\x03\x04".to_vec();
    body.resize(2 * 1024 * 1024, 0);
    Mock::given(method("GET"))
        .and(path("/files/huge.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(&mock_server)
        .await;

    let result = fetcher(Duration::from_secs(5))
        .fetch(&format!("{}/files/huge.zip", mock_server.uri()))
        .await;

    assert!(matches!(result, Err(FetchError::TooLarge { .. })));
}

#[tokio::test]
async fn test_fetch_rejects_invalid_url() {
    let result = fetcher(Duration::from_secs(1)).fetch("not a url").await;
    assert!(matches!(result, Err(FetchError::InvalidUrl { .. })));
}

//! Integration tests for the preview batch coordinator.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{insert, local_service, setup_db, zip_with_page, MemoryStore, CDN_BASE, RAR};
use coursework_market::config::Config;
use coursework_market::db::{get_work, get_works_needing_preview, PreviewStatus};
use coursework_market::preview::{
    run_preview_batch, BatchOptions, PreviewOutcome, PreviewService, RemotePreviewService,
};
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn options(batch_size: i64) -> BatchOptions {
    BatchOptions::from_config(&Config::for_testing(), batch_size)
}

async fn mount_archive(server: &MockServer, route: &str, body: Vec<u8>, delay: Duration) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(body)
                .set_delay(delay),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_batch_extracts_and_is_idempotent() {
    let (db, _temp_dir) = setup_db().await;
    let mock_server = MockServer::start().await;
    mount_archive(&mock_server, "/a.zip", zip_with_page(), Duration::ZERO).await;

    let id = insert(&db, "Работа", None, Some(&format!("{}/a.zip", mock_server.uri()))).await;

    let store = Arc::new(MemoryStore::default());
    let service = local_service(&db, store.clone(), Duration::from_secs(5));

    let report = run_preview_batch(&db, &service, &options(10)).await.unwrap();
    assert!(report.success);
    assert_eq!(report.stats.processed, 1);
    assert_eq!(report.stats.successful, 1);
    assert_eq!(report.remaining, 0);

    let work = get_work(db.pool(), id).await.unwrap().unwrap();
    let preview = work.preview_image_url.as_deref().expect("preview stored");
    assert!(preview.starts_with(&format!("{CDN_BASE}/previews/{id}/")));
    assert!(preview.ends_with(".png"));
    assert_eq!(work.preview_status_enum(), Some(PreviewStatus::Done));
    assert!(work.preview_lease_until.is_none());
    assert_eq!(store.content_types(), vec!["image/png".to_string()]);

    // Second run finds nothing to do and uploads nothing
    let report = run_preview_batch(&db, &service, &options(10)).await.unwrap();
    assert_eq!(report.stats.processed, 0);
    assert_eq!(report.message, "All works processed");
    assert_eq!(store.keys().len(), 1);
}

#[tokio::test]
async fn test_batch_partial_failure_does_not_abort() {
    let (db, _temp_dir) = setup_db().await;
    let mock_server = MockServer::start().await;
    mount_archive(&mock_server, "/a.zip", zip_with_page(), Duration::ZERO).await;
    mount_archive(&mock_server, "/slow.zip", zip_with_page(), Duration::from_secs(3)).await;
    mount_archive(&mock_server, "/c.zip", zip_with_page(), Duration::ZERO).await;

    let uri = mock_server.uri();
    let first = insert(&db, "Первая", None, Some(&format!("{uri}/a.zip"))).await;
    let slow = insert(&db, "Медленная", None, Some(&format!("{uri}/slow.zip"))).await;
    let third = insert(&db, "Третья", None, Some(&format!("{uri}/c.zip"))).await;

    let store = Arc::new(MemoryStore::default());
    let service = local_service(&db, store, Duration::from_millis(300));

    let report = run_preview_batch(&db, &service, &options(10)).await.unwrap();
    assert_eq!(report.stats.processed, 3);
    assert_eq!(report.stats.successful, 2);
    assert_eq!(report.stats.failed, 1);
    assert_eq!(report.stats.errors.len(), 1);
    assert_eq!(report.stats.errors[0].work_id, slow);
    assert_eq!(report.remaining, 1);

    for id in [first, third] {
        let work = get_work(db.pool(), id).await.unwrap().unwrap();
        assert!(work.preview_image_url.is_some());
    }
    let failed = get_work(db.pool(), slow).await.unwrap().unwrap();
    assert!(failed.preview_image_url.is_none());
    assert_eq!(failed.preview_attempts, 1);
    assert!(failed.preview_error.unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_batch_marks_rar_unsupported_and_skips_it_later() {
    let (db, _temp_dir) = setup_db().await;
    let mock_server = MockServer::start().await;
    mount_archive(&mock_server, "/work.rar", RAR.to_vec(), Duration::ZERO).await;

    let id = insert(&db, "RAR", None, Some(&format!("{}/work.rar", mock_server.uri()))).await;
    let service = local_service(&db, Arc::new(MemoryStore::default()), Duration::from_secs(5));

    let report = run_preview_batch(&db, &service, &options(10)).await.unwrap();
    assert_eq!(report.stats.unsupported, 1);
    assert_eq!(report.stats.failed, 0);

    let work = get_work(db.pool(), id).await.unwrap().unwrap();
    assert_eq!(work.preview_status_enum(), Some(PreviewStatus::Unsupported));
    assert!(work.preview_image_url.is_none());

    let report = run_preview_batch(&db, &service, &options(10)).await.unwrap();
    assert_eq!(report.stats.processed, 0);
}

#[tokio::test]
async fn test_batch_stops_retrying_after_max_attempts() {
    let (db, _temp_dir) = setup_db().await;
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone.zip"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let id = insert(&db, "Пропала", None, Some(&format!("{}/gone.zip", mock_server.uri()))).await;
    let service = local_service(&db, Arc::new(MemoryStore::default()), Duration::from_secs(5));
    let opts = options(10);

    for _ in 0..opts.max_attempts {
        let report = run_preview_batch(&db, &service, &opts).await.unwrap();
        assert_eq!(report.stats.failed, 1);
    }

    let report = run_preview_batch(&db, &service, &opts).await.unwrap();
    assert_eq!(report.stats.processed, 0);
    assert_eq!(report.remaining, 0);

    let work = get_work(db.pool(), id).await.unwrap().unwrap();
    assert_eq!(work.preview_attempts, opts.max_attempts);
    assert_eq!(work.preview_status_enum(), Some(PreviewStatus::Failed));
}

#[tokio::test]
async fn test_batch_respects_batch_size_newest_first() {
    let (db, _temp_dir) = setup_db().await;
    let mock_server = MockServer::start().await;
    mount_archive(&mock_server, "/a.zip", zip_with_page(), Duration::ZERO).await;

    let url = format!("{}/a.zip", mock_server.uri());
    let mut ids = Vec::new();
    for title in ["Один", "Два", "Три"] {
        ids.push(insert(&db, title, None, Some(&url)).await);
    }

    let service = local_service(&db, Arc::new(MemoryStore::default()), Duration::from_secs(5));
    let report = run_preview_batch(&db, &service, &options(2)).await.unwrap();
    assert_eq!(report.stats.processed, 2);
    assert_eq!(report.remaining, 1);

    let left = get_works_needing_preview(db.pool(), 10, 3).await.unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].id, ids[0]);
}

#[tokio::test]
async fn test_storage_failure_is_counted_not_fatal() {
    let (db, _temp_dir) = setup_db().await;
    let mock_server = MockServer::start().await;
    mount_archive(&mock_server, "/a.zip", zip_with_page(), Duration::ZERO).await;

    let id = insert(&db, "Работа", None, Some(&format!("{}/a.zip", mock_server.uri()))).await;
    let service = local_service(&db, Arc::new(MemoryStore::failing()), Duration::from_secs(5));

    let report = run_preview_batch(&db, &service, &options(10)).await.unwrap();
    assert_eq!(report.stats.failed, 1);

    let work = get_work(db.pool(), id).await.unwrap().unwrap();
    assert!(work.preview_image_url.is_none());
    assert!(work.preview_error.unwrap().contains("storage unavailable"));
}

#[tokio::test]
async fn test_remote_preview_service() {
    let (db, _temp_dir) = setup_db().await;
    let mock_server = MockServer::start().await;

    let ok = insert(&db, "Удаленная", None, Some("https://files.example.com/a.zip")).await;
    let rar = insert(&db, "RAR", None, Some("https://files.example.com/b.rar")).await;

    Mock::given(method("POST"))
        .and(path("/preview/extract"))
        .and(body_json(json!({ "work_id": ok, "extract_from_archive": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "count": 1,
            "urls": ["https://cdn.example.com/previews/1/x.png"],
        })))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/preview/extract"))
        .and(body_json(json!({ "work_id": rar, "extract_from_archive": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "unsupported": true,
            "error": "RAR archive",
        })))
        .mount(&mock_server)
        .await;

    let service = RemotePreviewService::new(
        format!("{}/preview/extract", mock_server.uri()),
        Duration::from_secs(5),
    )
    .unwrap();

    let work = get_work(db.pool(), ok).await.unwrap().unwrap();
    assert!(matches!(
        service.generate(&work).await,
        PreviewOutcome::Extracted { count: 1, .. }
    ));

    let report = run_preview_batch(&db, &service, &options(10)).await.unwrap();
    assert_eq!(report.stats.processed, 2);
    assert_eq!(report.stats.successful, 1);
    assert_eq!(report.stats.unsupported, 1);

    let work = get_work(db.pool(), rar).await.unwrap().unwrap();
    assert_eq!(work.preview_status_enum(), Some(PreviewStatus::Unsupported));
}

//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use coursework_market::db::{insert_work, Database, NewWork, Work, WorkStatus};
use coursework_market::preview::{ArchiveFetcher, LocalPreviewService, PreviewSelection};
use coursework_market::s3::ObjectStore;
use sqlx::SqlitePool;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

pub const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR\x00\x00\x00\x01";
pub const RAR: &[u8] = b"Rar!\x1a\x07\x01\x00rest-of-archive";
pub const CDN_BASE: &str = "https://cdn.example.com";

pub async fn setup_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("test.db");
    let db = Database::new(&db_path)
        .await
        .expect("Failed to create database");
    (db, temp_dir)
}

/// Count every row in `works`, deleted ones included.
pub async fn count_works(pool: &SqlitePool) -> i64 {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM works")
        .fetch_one(pool)
        .await
        .expect("Failed to count works");
    row.0
}

/// Works sharing a folder path, newest first.
pub async fn works_in_folder(pool: &SqlitePool, folder_path: &str) -> Vec<Work> {
    sqlx::query_as("SELECT * FROM works WHERE folder_path = ? ORDER BY id DESC")
        .bind(folder_path)
        .fetch_all(pool)
        .await
        .expect("Failed to fetch works by folder path")
}

/// Build an in-memory ZIP archive from `(name, bytes)` pairs.
pub fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut buffer = Vec::new();
    let mut zip = ZipWriter::new(Cursor::new(&mut buffer));
    let options = SimpleFileOptions::default();
    for (name, data) in entries {
        zip.start_file(*name, options).expect("Failed to start zip entry");
        zip.write_all(data).expect("Failed to write zip entry");
    }
    zip.finish().expect("Failed to finish zip");
    buffer
}

/// A ZIP holding a single numbered page image.
pub fn zip_with_page() -> Vec<u8> {
    build_zip(&[("work/page1.png", PNG), ("work/readme.txt", b"hello")])
}

pub fn new_work(title: &str, folder_path: Option<&str>, download_url: Option<&str>) -> NewWork {
    NewWork {
        title: title.to_string(),
        work_type: "курсовая работа".to_string(),
        subject: "Экономика".to_string(),
        folder_path: folder_path.map(str::to_string),
        download_url: download_url.map(str::to_string),
        status: WorkStatus::Active,
    }
}

pub async fn insert(db: &Database, title: &str, folder_path: Option<&str>, url: Option<&str>) -> i64 {
    insert_work(db.pool(), &new_work(title, folder_path, url))
        .await
        .expect("Failed to insert work")
}

/// Object store that keeps uploads in memory.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<Vec<(String, Vec<u8>, String)>>,
    fail: bool,
}

impl MemoryStore {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .iter()
            .map(|(key, _, _)| key.clone())
            .collect()
    }

    pub fn content_types(&self) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, content_type)| content_type.clone())
            .collect()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put_public(&self, key: &str, data: &[u8], content_type: &str) -> Result<String> {
        if self.fail {
            bail!("storage unavailable");
        }
        self.objects
            .lock()
            .unwrap()
            .push((key.to_string(), data.to_vec(), content_type.to_string()));
        Ok(format!("{CDN_BASE}/{key}"))
    }
}

pub fn local_service(
    db: &Database,
    store: Arc<MemoryStore>,
    timeout: std::time::Duration,
) -> LocalPreviewService {
    let fetcher = ArchiveFetcher::new(timeout, 10 * 1024 * 1024).expect("Failed to build fetcher");
    LocalPreviewService::new(db.clone(), fetcher, store, PreviewSelection::default())
}

//! Duplicate work removal.
//!
//! Repeated ingestion of the same folder creates several works with one
//! `folder_path`. Only the newest (highest id) row of each folder is kept.

use anyhow::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::db::{count_duplicate_groups, delete_works_by_ids, find_duplicate_work_ids};

/// Rows deleted per statement (and per transaction).
pub const DELETE_CHUNK_SIZE: usize = 100;

/// Summary of a reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DedupReport {
    /// Folder paths that had more than one work.
    pub duplicate_groups: i64,
    /// Redundant works found.
    pub found: usize,
    /// Works actually deleted.
    pub removed: u64,
    pub dry_run: bool,
}

/// Delete every work that shares its folder path with a newer one.
///
/// Deletion happens in chunks of `chunk_size`, each committed on its own, so
/// an interrupted run keeps the chunks already removed. Running again after
/// a complete run removes nothing.
///
/// # Errors
///
/// Returns an error if a query or a chunk deletion fails.
pub async fn remove_duplicates(
    pool: &SqlitePool,
    chunk_size: usize,
    dry_run: bool,
) -> Result<DedupReport> {
    let duplicate_groups = count_duplicate_groups(pool).await?;
    let ids = find_duplicate_work_ids(pool).await?;

    let mut report = DedupReport {
        duplicate_groups,
        found: ids.len(),
        removed: 0,
        dry_run,
    };

    if ids.is_empty() || dry_run {
        info!(
            groups = duplicate_groups,
            found = ids.len(),
            dry_run,
            "Duplicate scan complete"
        );
        return Ok(report);
    }

    for chunk in ids.chunks(chunk_size.max(1)) {
        let removed = delete_works_by_ids(pool, chunk).await?;
        report.removed += removed;
        debug!(chunk = chunk.len(), removed, total = report.removed, "Deleted duplicate chunk");
    }

    info!(
        groups = duplicate_groups,
        removed = report.removed,
        "Duplicate works removed"
    );

    Ok(report)
}

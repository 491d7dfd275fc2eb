use anyhow::{Context, Result};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use super::models::{Category, NewWork, Work};
use crate::constants::DELETED_TITLE_PREFIX;

fn deleted_title_pattern() -> String {
    format!("{DELETED_TITLE_PREFIX}%")
}

// ========== Health ==========

/// Round-trip a trivial statement to confirm the database answers.
pub async fn ping(pool: &SqlitePool) -> Result<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .context("Database ping failed")?;
    Ok(())
}

// ========== Works ==========

/// Insert a new work and return its id.
pub async fn insert_work(pool: &SqlitePool, work: &NewWork) -> Result<i64> {
    let result = sqlx::query(
        r"
        INSERT INTO works (title, work_type, subject, folder_path, download_url, status)
        VALUES (?, ?, ?, ?, ?, ?)
        ",
    )
    .bind(&work.title)
    .bind(&work.work_type)
    .bind(&work.subject)
    .bind(&work.folder_path)
    .bind(&work.download_url)
    .bind(work.status.as_str())
    .execute(pool)
    .await
    .context("Failed to insert work")?;

    Ok(result.last_insert_rowid())
}

/// Get a work by ID.
pub async fn get_work(pool: &SqlitePool, id: i64) -> Result<Option<Work>> {
    sqlx::query_as("SELECT * FROM works WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch work")
}

/// List categories (subjects) of listed, non-deleted works with their counts.
pub async fn list_categories(pool: &SqlitePool) -> Result<Vec<Category>> {
    sqlx::query_as(
        r"
        SELECT subject AS name, COUNT(*) AS works_count
        FROM works
        WHERE status IN ('active', 'approved')
          AND title NOT LIKE ?
        GROUP BY subject
        ORDER BY works_count DESC, name ASC
        ",
    )
    .bind(deleted_title_pattern())
    .fetch_all(pool)
    .await
    .context("Failed to list categories")
}

// ========== Preview extraction ==========

/// Works eligible for preview extraction, most recently ingested first.
///
/// Excludes soft-deleted works, works without an archive, works that already
/// have a preview, archives known to be unsupported, works that exhausted
/// `max_attempts`, and works currently leased by another run.
pub async fn get_works_needing_preview(
    pool: &SqlitePool,
    limit: i64,
    max_attempts: i64,
) -> Result<Vec<Work>> {
    sqlx::query_as(
        r"
        SELECT * FROM works
        WHERE title NOT LIKE ?
          AND download_url IS NOT NULL
          AND preview_image_url IS NULL
          AND preview_status != 'unsupported'
          AND preview_attempts < ?
          AND (preview_lease_until IS NULL OR preview_lease_until <= datetime('now'))
        ORDER BY id DESC
        LIMIT ?
        ",
    )
    .bind(deleted_title_pattern())
    .bind(max_attempts)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("Failed to fetch works needing preview")
}

/// Count works still eligible for preview extraction, ignoring leases.
pub async fn count_works_needing_preview(pool: &SqlitePool, max_attempts: i64) -> Result<i64> {
    let row: (i64,) = sqlx::query_as(
        r"
        SELECT COUNT(*) FROM works
        WHERE title NOT LIKE ?
          AND download_url IS NOT NULL
          AND preview_image_url IS NULL
          AND preview_status != 'unsupported'
          AND preview_attempts < ?
        ",
    )
    .bind(deleted_title_pattern())
    .bind(max_attempts)
    .fetch_one(pool)
    .await
    .context("Failed to count works needing preview")?;

    Ok(row.0)
}

/// Works that exhausted their attempts without a preview, for manual review.
pub async fn get_preview_dead_letters(
    pool: &SqlitePool,
    max_attempts: i64,
    limit: i64,
) -> Result<Vec<Work>> {
    sqlx::query_as(
        r"
        SELECT * FROM works
        WHERE preview_image_url IS NULL
          AND (preview_attempts >= ? OR preview_status = 'unsupported')
        ORDER BY id DESC
        LIMIT ?
        ",
    )
    .bind(max_attempts)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("Failed to fetch preview dead letters")
}

/// Try to take the processing lease on a work.
///
/// Returns `false` when another run holds an unexpired lease or the work
/// already has a preview.
pub async fn claim_work_for_preview(pool: &SqlitePool, id: i64, lease_secs: i64) -> Result<bool> {
    let result = sqlx::query(
        r"
        UPDATE works
        SET preview_lease_until = datetime('now', '+' || ? || ' seconds'),
            updated_at = datetime('now')
        WHERE id = ?
          AND preview_image_url IS NULL
          AND (preview_lease_until IS NULL OR preview_lease_until <= datetime('now'))
        ",
    )
    .bind(lease_secs)
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to claim work for preview")?;

    Ok(result.rows_affected() == 1)
}

/// Store the public preview URL of a work.
pub async fn set_work_preview_image(pool: &SqlitePool, id: i64, url: &str) -> Result<()> {
    sqlx::query(
        r"
        UPDATE works
        SET preview_image_url = ?,
            preview_status = 'done',
            preview_error = NULL,
            updated_at = datetime('now')
        WHERE id = ?
        ",
    )
    .bind(url)
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to set work preview image")?;

    Ok(())
}

/// Mark a successful extraction and drop the lease.
pub async fn set_preview_done(pool: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query(
        r"
        UPDATE works
        SET preview_status = 'done',
            preview_error = NULL,
            preview_lease_until = NULL,
            updated_at = datetime('now')
        WHERE id = ?
        ",
    )
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to set preview done")?;

    Ok(())
}

/// Record an attempt that found a valid archive without usable images.
pub async fn record_preview_no_images(pool: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query(
        r"
        UPDATE works
        SET preview_status = 'no_images',
            preview_attempts = preview_attempts + 1,
            preview_error = NULL,
            preview_lease_until = NULL,
            updated_at = datetime('now')
        WHERE id = ?
        ",
    )
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to record preview without images")?;

    Ok(())
}

/// Record a failed attempt with its error message.
pub async fn record_preview_failure(pool: &SqlitePool, id: i64, error: &str) -> Result<()> {
    sqlx::query(
        r"
        UPDATE works
        SET preview_status = 'failed',
            preview_attempts = preview_attempts + 1,
            preview_error = ?,
            preview_lease_until = NULL,
            updated_at = datetime('now')
        WHERE id = ?
        ",
    )
    .bind(error)
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to record preview failure")?;

    Ok(())
}

/// Mark a work whose archive cannot be unpacked here; it is never reselected.
pub async fn set_preview_unsupported(pool: &SqlitePool, id: i64, reason: &str) -> Result<()> {
    sqlx::query(
        r"
        UPDATE works
        SET preview_status = 'unsupported',
            preview_error = ?,
            preview_lease_until = NULL,
            updated_at = datetime('now')
        WHERE id = ?
        ",
    )
    .bind(reason)
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to set preview unsupported")?;

    Ok(())
}

/// Put a work back into the preview queue with a fresh attempt budget.
pub async fn reset_preview_attempts(pool: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query(
        r"
        UPDATE works
        SET preview_status = 'pending',
            preview_attempts = 0,
            preview_error = NULL,
            preview_lease_until = NULL,
            updated_at = datetime('now')
        WHERE id = ? AND preview_image_url IS NULL
        ",
    )
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to reset preview attempts")?;

    Ok(())
}

// ========== Favorites ==========

/// Add or remove a favorite. Returns `true` if the work is now a favorite.
pub async fn toggle_favorite(pool: &SqlitePool, user_id: &str, work_id: i64) -> Result<bool> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let removed = sqlx::query("DELETE FROM favorites WHERE user_id = ? AND work_id = ?")
        .bind(user_id)
        .bind(work_id)
        .execute(&mut *tx)
        .await
        .context("Failed to remove favorite")?
        .rows_affected();

    if removed == 0 {
        sqlx::query("INSERT INTO favorites (user_id, work_id) VALUES (?, ?)")
            .bind(user_id)
            .bind(work_id)
            .execute(&mut *tx)
            .await
            .context("Failed to add favorite")?;
    }

    tx.commit().await.context("Failed to commit favorite toggle")?;

    Ok(removed == 0)
}

/// Works a user marked as favorite, most recently favorited first.
pub async fn list_favorite_works(pool: &SqlitePool, user_id: &str) -> Result<Vec<Work>> {
    sqlx::query_as(
        r"
        SELECT w.* FROM works w
        JOIN favorites f ON f.work_id = w.id
        WHERE f.user_id = ?
          AND w.title NOT LIKE ?
        ORDER BY f.created_at DESC, w.id DESC
        ",
    )
    .bind(user_id)
    .bind(deleted_title_pattern())
    .fetch_all(pool)
    .await
    .context("Failed to list favorite works")
}

// ========== Duplicate reconciliation ==========

/// IDs of every work that shares its folder path with a newer work.
///
/// Rows are ranked per folder path by id, newest first; everything ranked
/// after the first is a duplicate. Null folder paths are never considered.
pub async fn find_duplicate_work_ids(pool: &SqlitePool) -> Result<Vec<i64>> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        r"
        SELECT id FROM (
            SELECT id,
                   ROW_NUMBER() OVER (PARTITION BY folder_path ORDER BY id DESC) AS rn
            FROM works
            WHERE folder_path IS NOT NULL
        )
        WHERE rn > 1
        ORDER BY id
        ",
    )
    .fetch_all(pool)
    .await
    .context("Failed to find duplicate works")?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Number of folder paths that have more than one work.
pub async fn count_duplicate_groups(pool: &SqlitePool) -> Result<i64> {
    let row: (i64,) = sqlx::query_as(
        r"
        SELECT COUNT(*) FROM (
            SELECT folder_path FROM works
            WHERE folder_path IS NOT NULL
            GROUP BY folder_path
            HAVING COUNT(*) > 1
        )
        ",
    )
    .fetch_one(pool)
    .await
    .context("Failed to count duplicate groups")?;

    Ok(row.0)
}

/// Delete the given works in one transaction. Returns the number of rows removed.
pub async fn delete_works_by_ids(pool: &SqlitePool, ids: &[i64]) -> Result<u64> {
    if ids.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("DELETE FROM works WHERE id IN (");
    let mut separated = builder.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");

    let removed = builder
        .build()
        .execute(&mut *tx)
        .await
        .context("Failed to delete works")?
        .rows_affected();

    tx.commit().await.context("Failed to commit work deletion")?;

    Ok(removed)
}

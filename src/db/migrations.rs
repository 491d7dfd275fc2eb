use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::debug;

/// Run all pending migrations.
pub async fn run(pool: &SqlitePool) -> Result<()> {
    create_migration_table(pool).await?;
    let current_version = get_schema_version(pool).await?;

    if current_version < 1 {
        debug!("Running migration v1");
        run_migration_v1(pool).await?;
        set_schema_version(pool, 1).await?;
    }

    if current_version < 2 {
        debug!("Running migration v2");
        run_migration_v2(pool).await?;
        set_schema_version(pool, 2).await?;
    }

    Ok(())
}

async fn create_migration_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS _schema_version (
            version INTEGER PRIMARY KEY
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create schema version table")?;

    Ok(())
}

async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let row: Option<(i32,)> = sqlx::query_as("SELECT version FROM _schema_version LIMIT 1")
        .fetch_optional(pool)
        .await
        .context("Failed to get schema version")?;

    Ok(row.map_or(0, |(v,)| v))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("DELETE FROM _schema_version")
        .execute(pool)
        .await?;
    sqlx::query("INSERT INTO _schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}

async fn run_migration_v1(pool: &SqlitePool) -> Result<()> {
    debug!("Running migration v1: creating catalog schema");

    // Works table. folder_path is intentionally not unique; duplicates are
    // removed after the fact by the reconciler.
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS works (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            work_type TEXT NOT NULL,
            subject TEXT NOT NULL,
            folder_path TEXT,
            download_url TEXT,
            preview_image_url TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create works table")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_works_folder_path ON works(folder_path)")
        .execute(pool)
        .await
        .context("Failed to create folder_path index")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_works_subject ON works(subject)")
        .execute(pool)
        .await
        .context("Failed to create subject index")?;

    // Favorites table
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS favorites (
            user_id TEXT NOT NULL,
            work_id INTEGER NOT NULL REFERENCES works(id) ON DELETE CASCADE,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (user_id, work_id)
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create favorites table")?;

    Ok(())
}

async fn run_migration_v2(pool: &SqlitePool) -> Result<()> {
    debug!("Running migration v2: preview extraction bookkeeping");

    let statements = [
        "ALTER TABLE works ADD COLUMN preview_status TEXT NOT NULL DEFAULT 'pending'",
        "ALTER TABLE works ADD COLUMN preview_attempts INTEGER NOT NULL DEFAULT 0",
        "ALTER TABLE works ADD COLUMN preview_error TEXT",
        "ALTER TABLE works ADD COLUMN preview_lease_until TEXT",
    ];

    for statement in statements {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to run: {statement}"))?;
    }

    // Works that already had a preview before bookkeeping existed
    sqlx::query(
        "UPDATE works SET preview_status = 'done' WHERE preview_image_url IS NOT NULL",
    )
    .execute(pool)
    .await
    .context("Failed to backfill preview status")?;

    sqlx::query(
        r"
        CREATE INDEX IF NOT EXISTS idx_works_preview_queue
        ON works(preview_status, preview_attempts)
        WHERE preview_image_url IS NULL
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create preview queue index")?;

    Ok(())
}

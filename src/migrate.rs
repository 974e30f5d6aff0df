use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create the metadata tables if they do not exist yet.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Document lifecycle records
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents_metadata (
            id TEXT PRIMARY KEY,
            filename TEXT NOT NULL UNIQUE,
            country TEXT NOT NULL DEFAULT 'Unknown',
            doc_type TEXT NOT NULL DEFAULT 'Regulation',
            visibility TEXT NOT NULL DEFAULT 'visible',
            status TEXT NOT NULL DEFAULT 'pending',
            size INTEGER NOT NULL DEFAULT 0,
            last_modified_source TEXT NOT NULL DEFAULT '',
            added_at TEXT NOT NULL,
            last_updated TEXT,
            chunks_count INTEGER,
            error TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Marker set for the legacy `process_new_files` path
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS processed_files (
            filename TEXT PRIMARY KEY,
            processed_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_metadata_status ON documents_metadata(status)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

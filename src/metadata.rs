//! Document metadata store.
//!
//! The `documents_metadata` table is the single source of truth for which
//! documents exist and where each one is in the ingestion lifecycle:
//!
//! ```text
//! (first seen by sync) ──▶ pending ──claim──▶ processing ──▶ processed
//!                                                   └──────▶ error
//! ```
//!
//! Sync is a soft merge: new filenames are inserted, known filenames only
//! get `size`/`last_modified_source` refreshed, and nothing is ever
//! deleted. A record's `id`, `country` and `doc_type` survive every sync.
//!
//! Every mutation runs inside a SQLite transaction, so concurrent callers
//! never observe a half-written record.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Deserialize;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::models::{Country, DocStatus, DocumentRecord, ObjectInfo};
use crate::storage::{infer_country, ObjectStore};
use crate::{db, migrate};

/// Error context attached when the object-store listing fails during sync.
pub const STORAGE_CONNECTION_ERROR: &str = "Failed to connect to object storage or list documents. \
Please check the storage connection settings and ensure the service is running.";

/// Default `doc_type` for newly discovered documents.
pub const DEFAULT_DOC_TYPE: &str = "Regulation";

/// Fields that may be changed through `update_doc_metadata`.
///
/// Unknown keys are rejected so a typo never silently does nothing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetadataUpdate {
    pub country: Option<Country>,
    pub doc_type: Option<String>,
    pub visibility: Option<String>,
    pub status: Option<DocStatus>,
    pub chunks_count: Option<i64>,
    pub error: Option<String>,
}

impl MetadataUpdate {
    pub fn status(status: DocStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }
}

/// Handle to the metadata database.
#[derive(Clone)]
pub struct MetadataStore {
    pool: SqlitePool,
}

const SELECT_COLUMNS: &str = "SELECT id, filename, country, doc_type, visibility, status, size, \
     last_modified_source, added_at, last_updated, chunks_count, error FROM documents_metadata";

impl MetadataStore {
    /// Open (and migrate) the database configured in `[db]`.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool, creating the tables if needed.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        migrate::apply(&pool).await?;
        Ok(Self { pool })
    }

    /// Reconcile the store with the object-store listing.
    ///
    /// A listing failure is returned as an error; it is never treated as an
    /// empty bucket.
    pub async fn sync(&self, store: &dyn ObjectStore) -> Result<Vec<DocumentRecord>> {
        let listing = store.list().await.context(STORAGE_CONNECTION_ERROR)?;
        self.merge(&listing).await
    }

    /// Merge a listing into the store and return every known record.
    pub async fn merge(&self, listing: &[ObjectInfo]) -> Result<Vec<DocumentRecord>> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;
        let mut added = 0usize;

        for obj in listing {
            let updated = sqlx::query(
                "UPDATE documents_metadata SET size = ?, last_modified_source = ? WHERE filename = ?",
            )
            .bind(obj.size)
            .bind(&obj.last_modified)
            .bind(&obj.filename)
            .execute(&mut *tx)
            .await?;

            if updated.rows_affected() == 0 {
                sqlx::query(
                    r#"
                    INSERT INTO documents_metadata
                        (id, filename, country, doc_type, visibility, status, size,
                         last_modified_source, added_at)
                    VALUES (?, ?, ?, ?, 'visible', 'pending', ?, ?, ?)
                    "#,
                )
                .bind(uuid::Uuid::new_v4().to_string())
                .bind(&obj.filename)
                .bind(infer_country(&obj.filename).as_str())
                .bind(DEFAULT_DOC_TYPE)
                .bind(obj.size)
                .bind(&obj.last_modified)
                .bind(&now)
                .execute(&mut *tx)
                .await?;
                added += 1;
            }
        }

        tx.commit().await?;
        tracing::info!(listed = listing.len(), added, "metadata sync complete");

        self.list().await
    }

    /// All records in insertion order.
    pub async fn list(&self) -> Result<Vec<DocumentRecord>> {
        let rows = sqlx::query(&format!("{} ORDER BY rowid", SELECT_COLUMNS))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_record).collect()
    }

    /// Records with `status = pending`, in insertion order.
    pub async fn list_pending(&self) -> Result<Vec<DocumentRecord>> {
        let rows = sqlx::query(&format!(
            "{} WHERE status = 'pending' ORDER BY rowid",
            SELECT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_record).collect()
    }

    pub async fn get(&self, id: &str) -> Result<Option<DocumentRecord>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_record).transpose()
    }

    /// Merge `updates` into record `id` and stamp `last_updated`.
    ///
    /// Returns `false` when no record has that id.
    pub async fn update(&self, id: &str, updates: MetadataUpdate) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Ok(false);
        };
        let mut record = row_to_record(&row)?;

        if let Some(country) = updates.country {
            record.country = country;
        }
        if let Some(doc_type) = updates.doc_type {
            record.doc_type = doc_type;
        }
        if let Some(visibility) = updates.visibility {
            record.visibility = visibility;
        }
        if let Some(status) = updates.status {
            record.status = status;
        }
        if let Some(count) = updates.chunks_count {
            record.chunks_count = Some(count);
        }
        if let Some(error) = updates.error {
            record.error = Some(error);
        }
        record.last_updated = Some(Utc::now().to_rfc3339());

        sqlx::query(
            r#"
            UPDATE documents_metadata
            SET country = ?, doc_type = ?, visibility = ?, status = ?,
                chunks_count = ?, error = ?, last_updated = ?
            WHERE id = ?
            "#,
        )
        .bind(record.country.as_str())
        .bind(&record.doc_type)
        .bind(&record.visibility)
        .bind(record.status.as_str())
        .bind(record.chunks_count)
        .bind(&record.error)
        .bind(&record.last_updated)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Atomically move a record from `pending` to `processing`.
    ///
    /// Returns `false` if the record is not pending (already claimed by
    /// another run, or unknown). Clears any stale error.
    pub async fn claim(&self, id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE documents_metadata
            SET status = 'processing', error = NULL, last_updated = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn is_file_processed(&self, filename: &str) -> Result<bool> {
        let found: Option<String> =
            sqlx::query_scalar("SELECT filename FROM processed_files WHERE filename = ?")
                .bind(filename)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    pub async fn mark_file_processed(&self, filename: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO processed_files (filename, processed_at) VALUES (?, ?) \
             ON CONFLICT(filename) DO UPDATE SET processed_at = excluded.processed_at",
        )
        .bind(filename)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<DocumentRecord> {
    let status: String = row.try_get("status")?;
    let country: String = row.try_get("country")?;
    Ok(DocumentRecord {
        id: row.try_get("id")?,
        filename: row.try_get("filename")?,
        country: Country::from_folder(&country),
        doc_type: row.try_get("doc_type")?,
        visibility: row.try_get("visibility")?,
        status: status.parse()?,
        size: row.try_get("size")?,
        last_modified_source: row.try_get("last_modified_source")?,
        added_at: row.try_get("added_at")?,
        last_updated: row.try_get("last_updated")?,
        chunks_count: row.try_get("chunks_count")?,
        error: row.try_get("error")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tempfile::TempDir;

    async fn open_store(tmp: &TempDir) -> MetadataStore {
        let pool = db::connect_path(&tmp.path().join("meta.sqlite"))
            .await
            .unwrap();
        MetadataStore::from_pool(pool).await.unwrap()
    }

    fn obj(name: &str, size: i64) -> ObjectInfo {
        ObjectInfo {
            filename: name.to_string(),
            size,
            last_modified: format!("2024-01-0{}T00:00:00Z", size % 9 + 1),
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl ObjectStore for BrokenStore {
        fn kind(&self) -> &str {
            "broken"
        }
        async fn list(&self) -> Result<Vec<ObjectInfo>> {
            anyhow::bail!("connection refused")
        }
        async fn fetch(&self, _key: &str) -> Result<Vec<u8>> {
            anyhow::bail!("connection refused")
        }
    }

    #[tokio::test]
    async fn sync_adds_new_files_as_pending_with_inferred_country() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;

        let records = store
            .merge(&[obj("tunisia/code.pdf", 10), obj("misc.pdf", 3)])
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].country, Country::Tunisia);
        assert_eq!(records[0].doc_type, "Regulation");
        assert_eq!(records[0].visibility, "visible");
        assert_eq!(records[0].status, DocStatus::Pending);
        assert_eq!(records[1].country, Country::Unknown);
    }

    #[tokio::test]
    async fn sync_preserves_identity_and_manual_edits() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;

        let first = store.merge(&[obj("a.pdf", 1)]).await.unwrap();
        let id = first[0].id.clone();
        store
            .update(
                &id,
                MetadataUpdate {
                    country: Some(Country::France),
                    doc_type: Some("Circular".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let second = store.merge(&[obj("a.pdf", 2048)]).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id, id);
        assert_eq!(second[0].country, Country::France);
        assert_eq!(second[0].doc_type, "Circular");
        assert_eq!(second[0].size, 2048);
    }

    #[tokio::test]
    async fn sync_never_deletes_missing_files() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;

        store
            .merge(&[obj("a.pdf", 1), obj("b.pdf", 2)])
            .await
            .unwrap();
        let after = store.merge(&[obj("b.pdf", 2)]).await.unwrap();
        assert_eq!(after.len(), 2);
    }

    #[tokio::test]
    async fn sync_propagates_listing_failure() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        store.merge(&[obj("a.pdf", 1)]).await.unwrap();

        let err = store.sync(&BrokenStore).await.unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to connect to object storage"));
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn resync_does_not_reset_error_status() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        let id = store.merge(&[obj("a.pdf", 1)]).await.unwrap()[0].id.clone();
        store
            .update(&id, MetadataUpdate::status(DocStatus::Error))
            .await
            .unwrap();

        let records = store.merge(&[obj("a.pdf", 5)]).await.unwrap();
        assert_eq!(records[0].status, DocStatus::Error);
    }

    #[tokio::test]
    async fn update_unknown_id_returns_false() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        let ok = store
            .update("missing", MetadataUpdate::status(DocStatus::Processed))
            .await
            .unwrap();
        assert!(!ok);
    }

    #[tokio::test]
    async fn update_stamps_last_updated() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        let id = store.merge(&[obj("a.pdf", 1)]).await.unwrap()[0].id.clone();
        assert!(store.get(&id).await.unwrap().unwrap().last_updated.is_none());

        store
            .update(
                &id,
                MetadataUpdate {
                    status: Some(DocStatus::Processed),
                    chunks_count: Some(7),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let rec = store.get(&id).await.unwrap().unwrap();
        assert_eq!(rec.status, DocStatus::Processed);
        assert_eq!(rec.chunks_count, Some(7));
        assert!(rec.last_updated.is_some());
    }

    #[test]
    fn update_rejects_unknown_fields() {
        let err = serde_json::from_value::<MetadataUpdate>(serde_json::json!({
            "status": "processed",
            "colour": "blue"
        }))
        .unwrap_err();
        assert!(err.to_string().contains("colour"));
    }

    #[tokio::test]
    async fn claim_admits_a_document_once() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        let id = store.merge(&[obj("a.pdf", 1)]).await.unwrap()[0].id.clone();

        assert!(store.claim(&id).await.unwrap());
        assert!(!store.claim(&id).await.unwrap());
        assert!(store.list_pending().await.unwrap().is_empty());
        assert_eq!(
            store.get(&id).await.unwrap().unwrap().status,
            DocStatus::Processing
        );
    }

    #[tokio::test]
    async fn processed_file_markers() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        assert!(!store.is_file_processed("x.pdf").await.unwrap());
        store.mark_file_processed("x.pdf").await.unwrap();
        store.mark_file_processed("x.pdf").await.unwrap();
        assert!(store.is_file_processed("x.pdf").await.unwrap());
    }
}

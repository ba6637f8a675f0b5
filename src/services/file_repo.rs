//! Metadata repository — CRUD against the `file_metadata` table.

use crate::models::file_record::{FileRecord, NewFileRecord};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Repository over the `file_metadata` table.
///
/// Every operation is a single statement committed on its own; no
/// transaction spans multiple calls. Concurrent writers get
/// last-committer-wins semantics from the database.
#[derive(Clone)]
pub struct FileRepo {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,
}

impl FileRepo {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Insert a new record, returning it with its assigned id.
    pub async fn insert(&self, new: NewFileRecord) -> Result<FileRecord, sqlx::Error> {
        sqlx::query_as::<_, FileRecord>(
            r#"
            INSERT INTO file_metadata (
                stored_name, original_name, mime_type, size_bytes,
                uploaded_at, last_signed_url
            ) VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id, stored_name, original_name, mime_type, size_bytes,
                      uploaded_at, last_signed_url
            "#,
        )
        .bind(&new.stored_name)
        .bind(&new.original_name)
        .bind(&new.mime_type)
        .bind(new.size_bytes)
        .bind(new.uploaded_at)
        .bind(&new.last_signed_url)
        .fetch_one(&*self.db)
        .await
    }

    /// All records, most recent upload first. Records sharing an upload
    /// timestamp keep their insertion order.
    pub async fn list_all(&self) -> Result<Vec<FileRecord>, sqlx::Error> {
        sqlx::query_as::<_, FileRecord>(
            "SELECT id, stored_name, original_name, mime_type, size_bytes,
                    uploaded_at, last_signed_url
             FROM file_metadata
             ORDER BY uploaded_at DESC, id ASC",
        )
        .fetch_all(&*self.db)
        .await
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<FileRecord>, sqlx::Error> {
        sqlx::query_as::<_, FileRecord>(
            "SELECT id, stored_name, original_name, mime_type, size_bytes,
                    uploaded_at, last_signed_url
             FROM file_metadata WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&*self.db)
        .await
    }

    /// Delete by id. Returns false if no row matched.
    pub async fn delete_by_id(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM file_metadata WHERE id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

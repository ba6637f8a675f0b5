//! Represents the metadata row tracking one uploaded file.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// Metadata for a single uploaded file.
///
/// The row tracks the file independently of its byte storage: the payload
/// lives in the object store under `stored_name`, this record lives in the
/// `file_metadata` table.
#[derive(Serialize, Clone, FromRow, Debug)]
pub struct FileRecord {
    /// Assigned by the database on insert, immutable afterwards.
    pub id: i64,

    /// Sanitized storage key the payload is stored under.
    pub stored_name: String,

    /// Filename as supplied by the uploader.
    pub original_name: String,

    /// Content type reported at upload time.
    pub mime_type: String,

    /// Payload size in bytes.
    pub size_bytes: i64,

    /// When the upload completed, UTC.
    pub uploaded_at: DateTime<Utc>,

    /// Signed URL produced at upload time. Listing recomputes a fresh URL
    /// in memory on every read; this column is never written back.
    pub last_signed_url: String,
}

/// Column values for a record that has not been inserted yet.
#[derive(Clone, Debug)]
pub struct NewFileRecord {
    pub stored_name: String,
    pub original_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub uploaded_at: DateTime<Utc>,
    pub last_signed_url: String,
}

/// A record paired with a freshly signed download URL for rendering.
///
/// `download_url` is `None` when signing failed for that row; the listing
/// still succeeds and the UI shows the entry as unavailable.
#[derive(Serialize, Clone, Debug)]
pub struct ListedFile {
    #[serde(flatten)]
    pub record: FileRecord,
    pub download_url: Option<String>,
}

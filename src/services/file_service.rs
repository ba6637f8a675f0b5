//! FileService — the upload, listing and delete workflows.
//!
//! Each workflow runs entirely within one HTTP request and composes the
//! object store gateway with the metadata repository. Partial failures are
//! deliberate: a failed object write never leaves a metadata row behind,
//! and a failed object delete never removes one.

use crate::{
    models::file_record::{FileRecord, ListedFile, NewFileRecord},
    services::{
        file_repo::FileRepo,
        object_store::{ObjectStore, StoreError},
    },
    validate,
};
use bytes::Bytes;
use chrono::Utc;
use futures::Stream;
use std::io;
use thiserror::Error;
use tokio::fs::File;
use tracing::{error, warn};

/// Why an upload was rejected or failed.
///
/// The first three are client input errors and change no state. A storage
/// write failure leaves no metadata row; if the object landed but signing
/// or the insert failed afterwards, the object is orphaned and only logged.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("No file part")]
    NoFilePart,
    #[error("No selected file")]
    EmptyFilename,
    #[error("Invalid file type")]
    InvalidType,
    #[error("Error uploading file to storage")]
    StorageWrite,
    #[error("Error saving file metadata")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum DeleteError {
    #[error("File not found")]
    NotFound,
    #[error("Error deleting file from storage")]
    StorageDelete,
    #[error("Error deleting file")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("download link is invalid or has expired")]
    Forbidden,
    #[error("file not found")]
    NotFound,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// One file part pulled out of a multipart upload request.
pub struct UploadPart<S> {
    pub original_name: String,
    pub content_type: String,
    pub data: S,
}

/// Request-scoped file lifecycle workflows over the object store and the
/// metadata repository.
#[derive(Clone)]
pub struct FileService {
    pub store: ObjectStore,
    pub repo: FileRepo,
}

impl FileService {
    pub fn new(store: ObjectStore, repo: FileRepo) -> Self {
        Self { store, repo }
    }

    /// Upload workflow: validate, store the object, then record metadata.
    ///
    /// `part` is `None` when the request carried no file field. The object
    /// is written before the row so a row never references bytes that were
    /// never stored; the converse (object without row) can happen on a late
    /// failure and is accepted.
    pub async fn upload<S>(&self, part: Option<UploadPart<S>>) -> Result<FileRecord, UploadError>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        let Some(part) = part else {
            return Err(UploadError::NoFilePart);
        };
        if part.original_name.trim().is_empty() {
            return Err(UploadError::EmptyFilename);
        }
        if !validate::is_allowed_extension(&part.original_name) {
            return Err(UploadError::InvalidType);
        }

        let stored_name = validate::sanitize_name(&part.original_name);
        if stored_name.is_empty() {
            return Err(UploadError::InvalidType);
        }

        let size_bytes = self
            .store
            .put(&stored_name, &part.content_type, part.data)
            .await
            .map_err(|err| {
                error!("failed to store object `{}`: {}", stored_name, err);
                UploadError::StorageWrite
            })?;

        let last_signed_url = self.store.sign(&stored_name).map_err(|err| {
            // The payload was written; without a row it is now orphaned.
            warn!(
                "signing failed after storing `{}`, object is orphaned: {}",
                stored_name, err
            );
            UploadError::StorageWrite
        })?;

        let record = self
            .repo
            .insert(NewFileRecord {
                stored_name: stored_name.clone(),
                original_name: part.original_name,
                mime_type: part.content_type,
                size_bytes,
                uploaded_at: Utc::now(),
                last_signed_url,
            })
            .await
            .inspect_err(|err| {
                warn!(
                    "metadata insert failed after storing `{}`, object is orphaned: {}",
                    stored_name, err
                );
            })?;

        Ok(record)
    }

    /// Listing workflow: all records, most recent first, each paired with a
    /// freshly signed URL. A per-row signing failure downgrades that row to
    /// "unavailable" instead of failing the listing.
    pub async fn list(&self) -> Result<Vec<ListedFile>, sqlx::Error> {
        let records = self.repo.list_all().await?;
        Ok(records
            .into_iter()
            .map(|record| {
                let download_url = match self.store.sign(&record.stored_name) {
                    Ok(url) => Some(url),
                    Err(err) => {
                        warn!("could not sign URL for `{}`: {}", record.stored_name, err);
                        None
                    }
                };
                ListedFile {
                    record,
                    download_url,
                }
            })
            .collect())
    }

    /// Delete workflow: remove the object first, then the metadata row.
    ///
    /// If the object delete fails the row is kept so the file does not
    /// silently drop off the listing while its bytes may still exist.
    pub async fn delete(&self, id: i64) -> Result<(), DeleteError> {
        let record = self
            .repo
            .get_by_id(id)
            .await?
            .ok_or(DeleteError::NotFound)?;

        self.store.delete(&record.stored_name).await.map_err(|err| {
            error!(
                "failed to delete object `{}` for record {}: {}",
                record.stored_name, id, err
            );
            DeleteError::StorageDelete
        })?;

        // A concurrent delete of the same id is fine; the object is gone
        // either way.
        self.repo.delete_by_id(id).await?;
        Ok(())
    }

    /// Resolve a signed download request to an open object.
    pub async fn open_signed(
        &self,
        key: &str,
        expires: i64,
        sig: &str,
    ) -> Result<(File, String, i64), DownloadError> {
        if !self.store.verify(key, expires, sig) {
            return Err(DownloadError::Forbidden);
        }
        match self.store.open(key).await {
            Ok(opened) => Ok(opened),
            Err(StoreError::NotFound(_)) | Err(StoreError::InvalidKey) => {
                Err(DownloadError::NotFound)
            }
            Err(StoreError::Io(err)) => Err(DownloadError::Io(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::file_repo::tests::test_pool;
    use futures::stream;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    async fn test_service(dir: &TempDir) -> FileService {
        let store = ObjectStore::new(dir.path(), "test-secret", "", 3600);
        let repo = FileRepo::new(test_pool().await);
        FileService::new(store, repo)
    }

    fn part(name: &str, mime: &str, data: Vec<u8>) -> Option<UploadPart<impl Stream<Item = io::Result<Bytes>>>> {
        Some(UploadPart {
            original_name: name.to_string(),
            content_type: mime.to_string(),
            data: stream::iter(vec![Ok(Bytes::from(data))]),
        })
    }

    fn no_part() -> Option<UploadPart<stream::Iter<std::vec::IntoIter<io::Result<Bytes>>>>> {
        None
    }

    async fn read_object(service: &FileService, key: &str) -> Vec<u8> {
        let (mut file, _, _) = service.store.open(key).await.unwrap();
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn upload_records_metadata_and_stores_bytes() {
        let dir = TempDir::new().unwrap();
        let service = test_service(&dir).await;

        let record = service
            .upload(part("report.pdf", "application/pdf", vec![7u8; 500_000]))
            .await
            .unwrap();

        assert_eq!(record.original_name, "report.pdf");
        assert_eq!(record.stored_name, "report.pdf");
        assert_eq!(record.mime_type, "application/pdf");
        assert_eq!(record.size_bytes, 500_000);
        assert!(record.last_signed_url.contains("/download/report.pdf"));

        assert_eq!(read_object(&service, "report.pdf").await.len(), 500_000);
    }

    #[tokio::test]
    async fn upload_gates_reject_bad_input_without_side_effects() {
        let dir = TempDir::new().unwrap();
        let service = test_service(&dir).await;

        assert!(matches!(
            service.upload(no_part()).await,
            Err(UploadError::NoFilePart)
        ));
        assert!(matches!(
            service.upload(part("", "text/plain", b"x".to_vec())).await,
            Err(UploadError::EmptyFilename)
        ));
        assert!(matches!(
            service
                .upload(part("malware.exe", "application/x-msdownload", b"x".to_vec()))
                .await,
            Err(UploadError::InvalidType)
        ));

        assert!(service.repo.list_all().await.unwrap().is_empty());
        assert!(service.store.open("malware.exe").await.is_err());
    }

    #[tokio::test]
    async fn failed_object_write_leaves_no_metadata_row() {
        let dir = TempDir::new().unwrap();
        // Point the store somewhere it cannot create shard directories:
        // beneath a regular file.
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let store = ObjectStore::new(blocker.join("objects"), "test-secret", "", 3600);
        let service = FileService::new(store, FileRepo::new(test_pool().await));

        let result = service
            .upload(part("report.pdf", "application/pdf", b"data".to_vec()))
            .await;
        assert!(matches!(result, Err(UploadError::StorageWrite)));
        assert!(service.repo.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn listing_orders_and_signs() {
        let dir = TempDir::new().unwrap();
        let service = test_service(&dir).await;

        service
            .upload(part("first.txt", "text/plain", b"1".to_vec()))
            .await
            .unwrap();
        service
            .upload(part("second.txt", "text/plain", b"2".to_vec()))
            .await
            .unwrap();

        let listed = service.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        // Fresh URLs on every listing read.
        for item in &listed {
            let url = item.download_url.as_deref().unwrap();
            assert!(url.contains(&format!("/download/{}", item.record.stored_name)));
        }
    }

    #[tokio::test]
    async fn delete_removes_row_and_object() {
        let dir = TempDir::new().unwrap();
        let service = test_service(&dir).await;

        let record = service
            .upload(part("report.pdf", "application/pdf", b"bytes".to_vec()))
            .await
            .unwrap();

        service.delete(record.id).await.unwrap();
        assert!(service.repo.list_all().await.unwrap().is_empty());
        assert!(matches!(
            service.store.open("report.pdf").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_unknown_id_reports_not_found() {
        let dir = TempDir::new().unwrap();
        let service = test_service(&dir).await;
        assert!(matches!(
            service.delete(42).await,
            Err(DeleteError::NotFound)
        ));
    }

    #[tokio::test]
    async fn failed_object_delete_keeps_metadata_row() {
        let dir = TempDir::new().unwrap();
        let service = test_service(&dir).await;

        let record = service
            .upload(part("report.pdf", "application/pdf", b"bytes".to_vec()))
            .await
            .unwrap();

        // Replace the payload with a non-empty directory so remove_file fails.
        let payload = service.store.object_path("report.pdf");
        std::fs::remove_file(&payload).unwrap();
        std::fs::create_dir(&payload).unwrap();
        std::fs::write(payload.join("child"), b"x").unwrap();

        assert!(matches!(
            service.delete(record.id).await,
            Err(DeleteError::StorageDelete)
        ));
        let listed = service.repo.list_all().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, record.id);
    }

    #[tokio::test]
    async fn colliding_stored_names_overwrite_object_but_keep_both_rows() {
        let dir = TempDir::new().unwrap();
        let service = test_service(&dir).await;

        let first = service
            .upload(part("a b.txt", "text/plain", b"first bytes".to_vec()))
            .await
            .unwrap();
        let second = service
            .upload(part("a_b.txt", "text/plain", b"SECOND".to_vec()))
            .await
            .unwrap();
        assert_eq!(first.stored_name, second.stored_name);

        let listed = service.list().await.unwrap();
        assert_eq!(listed.len(), 2);

        // Both rows now resolve to the second upload's bytes.
        assert_eq!(read_object(&service, &first.stored_name).await, b"SECOND");
    }

    #[tokio::test]
    async fn open_signed_verifies_before_touching_disk() {
        let dir = TempDir::new().unwrap();
        let service = test_service(&dir).await;

        let record = service
            .upload(part("report.pdf", "application/pdf", b"bytes".to_vec()))
            .await
            .unwrap();

        let url = record.last_signed_url;
        let expires: i64 = url
            .split("expires=")
            .nth(1)
            .unwrap()
            .split('&')
            .next()
            .unwrap()
            .parse()
            .unwrap();
        let sig = url.split("sig=").nth(1).unwrap().to_string();

        assert!(service.open_signed("report.pdf", expires, &sig).await.is_ok());
        assert!(matches!(
            service.open_signed("report.pdf", expires, "bogus").await,
            Err(DownloadError::Forbidden)
        ));

        // Valid signature for a key whose payload is gone.
        service.store.delete("report.pdf").await.unwrap();
        let fresh = service.store.sign("report.pdf").unwrap();
        let fresh_expires: i64 = fresh
            .split("expires=")
            .nth(1)
            .unwrap()
            .split('&')
            .next()
            .unwrap()
            .parse()
            .unwrap();
        let fresh_sig = fresh.split("sig=").nth(1).unwrap().to_string();
        assert!(matches!(
            service.open_signed("report.pdf", fresh_expires, &fresh_sig).await,
            Err(DownloadError::NotFound)
        ));
    }
}

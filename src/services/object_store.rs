//! Object store gateway — put/delete/sign against the local bucket.
//!
//! Payloads are stored on disk sharded beneath `base_path/{shard}/{shard}/{key}`
//! with the content type kept in a small sidecar file next to the payload.
//! Download access goes through time-limited signed URLs (HMAC-SHA256 over
//! key + expiry) that the `/download/{key}` route verifies.

use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid object key")]
    InvalidKey,
    #[error("object `{0}` not found")]
    NotFound(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

const MAX_KEY_LEN: usize = 255;
const SIDECAR_SUFFIX: &str = ".content-type";

type HmacSha256 = Hmac<Sha256>;

/// Disk-backed object store with signed download URLs.
///
/// Keys are sanitized filenames, so a later put with the same key silently
/// overwrites the earlier payload. The store does not deduplicate.
#[derive(Clone)]
pub struct ObjectStore {
    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,

    signing_secret: String,
    public_base_url: String,
    url_ttl_secs: i64,
}

impl ObjectStore {
    pub fn new(
        base_path: impl Into<PathBuf>,
        signing_secret: impl Into<String>,
        public_base_url: impl Into<String>,
        url_ttl_secs: i64,
    ) -> Self {
        Self {
            base_path: base_path.into(),
            signing_secret: signing_secret.into(),
            public_base_url: public_base_url.into(),
            url_ttl_secs,
        }
    }

    /// Basic key validation to avoid trivial path traversal vectors.
    ///
    /// Keys come out of `validate::sanitize_name`, so this only guards the
    /// seams where a key arrives from the outside (the download route).
    fn ensure_key_safe(&self, key: &str) -> StoreResult<()> {
        if key.is_empty() || key.len() > MAX_KEY_LEN {
            return Err(StoreError::InvalidKey);
        }
        if key.starts_with('.') || key.contains('/') || key.contains("..") {
            return Err(StoreError::InvalidKey);
        }
        if key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(StoreError::InvalidKey);
        }
        Ok(())
    }

    /// Generate two-level shard identifiers for an object key.
    ///
    /// Uses MD5(key) and returns the first two bytes as lowercase
    /// hexadecimal strings (00–ff). Reduces file count per directory.
    fn shards(key: &str) -> (String, String) {
        let digest = md5::compute(key);
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// Construct a fully-qualified object payload path.
    ///
    /// Combines base_path/{shard}/{shard}/{key}. Parent directories may not
    /// exist yet.
    pub(crate) fn object_path(&self, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::shards(key);
        let mut path = self.base_path.clone();
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    fn sidecar_path(&self, key: &str) -> PathBuf {
        let mut path = self.object_path(key);
        path.as_mut_os_string().push(SIDECAR_SUFFIX);
        path
    }

    /// Stream-upload an object to disk.
    ///
    /// - Writes bytes incrementally to a temporary file, counting size.
    /// - Atomically renames into final location (overwrite semantics).
    /// - Records the content type in a sidecar file.
    ///
    /// Ensures durable writes (fsync) and cleans up temp files on errors.
    /// Returns the number of bytes written.
    pub async fn put<S>(&self, key: &str, content_type: &str, stream: S) -> StoreResult<i64>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        self.ensure_key_safe(key)?;

        let file_path = self.object_path(key);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StoreError::Io(io::Error::other("object path missing parent directory"))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut size_bytes: i64 = 0;
        pin_mut!(stream);
        while let Some(chunk_res) = stream.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(StoreError::Io(err));
                }
            };
            size_bytes += chunk.len() as i64;
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StoreError::Io(err));
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(&file_path).await?;
                fs::rename(&tmp_path, &file_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StoreError::Io(err));
            }
        }

        fs::write(self.sidecar_path(key), content_type).await?;

        Ok(size_bytes)
    }

    /// Produce a time-limited signed download URL for `key`.
    ///
    /// The URL embeds a unix expiry timestamp and an HMAC-SHA256 signature
    /// over `key\nexpiry`, base64url encoded. Verified by [`verify`].
    ///
    /// [`verify`]: ObjectStore::verify
    pub fn sign(&self, key: &str) -> StoreResult<String> {
        self.ensure_key_safe(key)?;
        let expires = Utc::now().timestamp() + self.url_ttl_secs;
        let sig = self.token_for(key, expires);
        Ok(format!(
            "{}/download/{}?expires={}&sig={}",
            self.public_base_url,
            urlencoding::encode(key),
            expires,
            sig
        ))
    }

    /// Check a signature produced by [`sign`] for `key`.
    ///
    /// False when the expiry has passed, the signature does not match, or
    /// the key is malformed.
    ///
    /// [`sign`]: ObjectStore::sign
    pub fn verify(&self, key: &str, expires: i64, sig: &str) -> bool {
        if self.ensure_key_safe(key).is_err() {
            return false;
        }
        if expires < Utc::now().timestamp() {
            return false;
        }
        let expected = self.token_for(key, expires);
        // base64 of a MAC; byte-wise comparison of fixed-length strings
        expected.as_bytes() == sig.as_bytes()
    }

    fn token_for(&self, key: &str, expires: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(self.signing_secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(key.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        general_purpose::URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }

    /// Open an object for reading.
    ///
    /// Returns the opened file, its recorded content type, and its size so
    /// the caller can stream it out with correct headers.
    pub async fn open(&self, key: &str) -> StoreResult<(File, String, i64)> {
        self.ensure_key_safe(key)?;
        let file_path = self.object_path(key);
        let file = File::open(&file_path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StoreError::NotFound(key.to_string())
            } else {
                StoreError::Io(err)
            }
        })?;
        let len = file.metadata().await?.len() as i64;
        let content_type = fs::read_to_string(self.sidecar_path(key))
            .await
            .unwrap_or_else(|_| "application/octet-stream".to_string());
        Ok((file, content_type, len))
    }

    /// Delete an object payload and its sidecar.
    ///
    /// A payload that is already gone counts as deleted; other I/O failures
    /// are returned to the caller. Prunes empty shard directories afterwards.
    pub async fn delete(&self, key: &str) -> StoreResult<()> {
        self.ensure_key_safe(key)?;
        let file_path = self.object_path(key);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed object payload {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("payload {} already missing", file_path.display());
            }
            Err(err) => return Err(StoreError::Io(err)),
        }
        if let Err(err) = fs::remove_file(self.sidecar_path(key)).await {
            if err.kind() != ErrorKind::NotFound {
                debug!("failed to remove sidecar for {}: {}", key, err);
            }
        }

        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent).await;
        }

        Ok(())
    }

    /// Recursively remove empty shard directories up to the base path.
    ///
    /// Stops when a directory is not empty, not found, or the base path is
    /// reached.
    async fn prune_empty_dirs(&self, start: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(&self.base_path) && current != self.base_path {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use tempfile::TempDir;

    fn test_store(dir: &TempDir) -> ObjectStore {
        ObjectStore::new(dir.path(), "test-secret", "", 3600)
    }

    fn one_chunk(data: &'static [u8]) -> impl Stream<Item = io::Result<Bytes>> {
        stream::iter(vec![Ok(Bytes::from_static(data))])
    }

    #[tokio::test]
    async fn put_then_open_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);

        let size = store
            .put("report.pdf", "application/pdf", one_chunk(b"hello pdf"))
            .await
            .unwrap();
        assert_eq!(size, 9);

        let (file, content_type, len) = store.open("report.pdf").await.unwrap();
        assert_eq!(content_type, "application/pdf");
        assert_eq!(len, 9);
        drop(file);
    }

    #[tokio::test]
    async fn put_counts_size_across_chunks() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);
        let chunks = stream::iter(vec![
            Ok(Bytes::from_static(b"abc")),
            Ok(Bytes::from_static(b"defgh")),
        ]);
        let size = store.put("notes.txt", "text/plain", chunks).await.unwrap();
        assert_eq!(size, 8);
    }

    #[tokio::test]
    async fn put_overwrites_existing_key() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);
        store
            .put("a.txt", "text/plain", one_chunk(b"first"))
            .await
            .unwrap();
        store
            .put("a.txt", "text/plain", one_chunk(b"second!"))
            .await
            .unwrap();

        let (_, _, len) = store.open("a.txt").await.unwrap();
        assert_eq!(len, 7);
    }

    #[tokio::test]
    async fn put_cleans_up_on_stream_error() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);
        let chunks = stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(io::Error::other("client went away")),
        ]);
        assert!(store.put("a.txt", "text/plain", chunks).await.is_err());
        assert!(matches!(
            store.open("a.txt").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_removes_payload_and_tolerates_missing() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);
        store
            .put("a.txt", "text/plain", one_chunk(b"x"))
            .await
            .unwrap();

        store.delete("a.txt").await.unwrap();
        assert!(matches!(
            store.open("a.txt").await,
            Err(StoreError::NotFound(_))
        ));

        // idempotent
        store.delete("a.txt").await.unwrap();
    }

    #[test]
    fn sign_and_verify_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);
        let url = store.sign("report.pdf").unwrap();
        assert!(url.starts_with("/download/report.pdf?expires="));

        let expires: i64 = url
            .split("expires=")
            .nth(1)
            .unwrap()
            .split('&')
            .next()
            .unwrap()
            .parse()
            .unwrap();
        let sig = url.split("sig=").nth(1).unwrap();

        assert!(store.verify("report.pdf", expires, sig));
        assert!(!store.verify("other.pdf", expires, sig));
        assert!(!store.verify("report.pdf", expires + 1, sig));
    }

    #[test]
    fn verify_rejects_expired_signature() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);
        let past = Utc::now().timestamp() - 10;
        let sig = store.token_for("report.pdf", past);
        assert!(!store.verify("report.pdf", past, &sig));
    }

    #[test]
    fn unsafe_keys_are_rejected() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);
        for key in ["", "../x", "a/b.txt", ".hidden", "a\\b"] {
            assert!(store.sign(key).is_err(), "{:?}", key);
            assert!(!store.verify(key, i64::MAX, "sig"), "{:?}", key);
        }
    }
}

//! Blob Store port (component C1, spec.md §4 "the blob store exclusively
//! owns bytes"). Content-addressed by deterministic path (see
//! `backplane_core::paths`), with presigned URL issuance for CDN/gate
//! consumers. Out of scope per spec.md §1 beyond this interface; the
//! filesystem implementation here is a development/test backend, not the
//! production object-storage mechanics.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BlobError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("object not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, BlobError>;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload bytes at `path`, overwriting any existing object. Uploads
    /// are idempotent: two claimants racing on a redelivered job and
    /// writing the same deterministic path converge on the same bytes
    /// (spec.md §5, §8).
    async fn put(&self, path: &str, data: Bytes) -> Result<()>;
    async fn get(&self, path: &str) -> Result<Bytes>;
    async fn exists(&self, path: &str) -> bool;
    async fn delete(&self, path: &str) -> Result<()>;
    /// List object keys under `prefix`, used by the warm-cache stage to
    /// enumerate a video's HLS segments.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
    /// A URL a CDN edge or client can fetch `path` through. Signing and
    /// expiry policy live behind this call; the in-scope `StreamAccessGate`
    /// (C10) governs playback access separately.
    fn presigned_url(&self, path: &str) -> String;
}

/// Filesystem-backed implementation rooted at a base directory, the
/// simplest faithful implementation of the content-addressed contract.
pub struct FilesystemBlobStore {
    root: std::path::PathBuf,
    base_url: String,
}

impl FilesystemBlobStore {
    pub fn new(root: impl Into<std::path::PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into(),
        }
    }

    fn resolve(&self, path: &str) -> std::path::PathBuf {
        self.root.join(path)
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn put(&self, path: &str, data: Bytes) -> Result<()> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(full, data).await?;
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Bytes> {
        let full = self.resolve(path);
        match tokio::fs::read(&full).await {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(BlobError::NotFound(path.to_string())),
            Err(e) => Err(BlobError::Io(e)),
        }
    }

    async fn exists(&self, path: &str) -> bool {
        tokio::fs::metadata(self.resolve(path)).await.is_ok()
    }

    async fn delete(&self, path: &str) -> Result<()> {
        match tokio::fs::remove_file(self.resolve(path)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BlobError::Io(e)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let dir = self.resolve(prefix);
        let mut out = Vec::new();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(BlobError::Io(e)),
        };
        while let Some(entry) = entries.next_entry().await? {
            if let Ok(relative) = entry.path().strip_prefix(&self.root) {
                out.push(relative.to_string_lossy().replace('\\', "/"));
            }
        }
        out.sort();
        Ok(out)
    }

    fn presigned_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemBlobStore::new(dir.path(), "https://cdn.example.com");
        store.put("hls/abc/master.m3u8", Bytes::from_static(b"#EXTM3U")).await.unwrap();
        let data = store.get("hls/abc/master.m3u8").await.unwrap();
        assert_eq!(&data[..], b"#EXTM3U");
    }

    #[tokio::test]
    async fn redelivered_upload_converges_on_same_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemBlobStore::new(dir.path(), "https://cdn.example.com");
        store.put("hls/abc/master.m3u8", Bytes::from_static(b"v1")).await.unwrap();
        store.put("hls/abc/master.m3u8", Bytes::from_static(b"v1")).await.unwrap();
        let data = store.get("hls/abc/master.m3u8").await.unwrap();
        assert_eq!(&data[..], b"v1");
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemBlobStore::new(dir.path(), "https://cdn.example.com");
        let err = store.get("nope").await.unwrap_err();
        assert!(matches!(err, BlobError::NotFound(_)));
    }

    #[tokio::test]
    async fn presigned_url_joins_base_and_path() {
        let store = FilesystemBlobStore::new("/tmp", "https://cdn.example.com/");
        assert_eq!(store.presigned_url("hls/abc/master.m3u8"), "https://cdn.example.com/hls/abc/master.m3u8");
    }
}

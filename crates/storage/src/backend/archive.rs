//! Archive-filtered storage backend decorator.
//!
//! Wraps another backend and restricts all operations to `.zip` files, so an
//! inbox can share a collection with unrelated documents.

use crate::backend::FileInfoStream;
use crate::error::ErrorKind;
use crate::{BackendHandle, StorageBackend, error::Result};
use async_trait::async_trait;
use futures::StreamExt;
use std::path::Path;

const ARCHIVE_EXTENSION: &str = "zip";

/// Whether the path names a zip archive (extension compared
/// case-insensitively).
pub fn is_archive_path(path: impl AsRef<Path>) -> bool {
    path.as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(ARCHIVE_EXTENSION))
}

/// Archive-filtered storage backend.
///
/// Listings only yield `.zip` files; any other path is rejected with
/// [`FilteredPath`](ErrorKind::FilteredPath).
#[derive(Clone)]
pub struct ArchiveOnlyBackend {
    inner: BackendHandle,
}
impl ArchiveOnlyBackend {
    pub fn new(inner: BackendHandle) -> Self {
        Self { inner }
    }

    fn check(path: &Path) -> Result<()> {
        if !is_archive_path(path) {
            exn::bail!(ErrorKind::FilteredPath(path.to_path_buf()));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for ArchiveOnlyBackend {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        Box::pin(self.inner.list_stream(prefix).filter(|item| {
            std::future::ready(match item {
                Ok(info) => is_archive_path(&info.path),
                Err(_) => true,
            })
        }))
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        Self::check(path)?;
        self.inner.exists(path).await
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        Self::check(path)?;
        self.inner.read(path).await
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        Self::check(path)?;
        self.inner.write(path, data).await
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        Self::check(path)?;
        self.inner.delete(path).await
    }
}

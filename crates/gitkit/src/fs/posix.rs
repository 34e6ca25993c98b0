//! POSIX-compatible filesystem wrapper.
//!
//! [`PosixFs`] takes a raw [`FsBackend`] and enforces the filesystem contract:
//!
//! | Operation | Check |
//! |-----------|-------|
//! | `write_file` | size ceiling, ancestors are directories (missing ones are created), target is not a directory |
//! | `read_file` | target exists and is a file |
//! | `unlink` | target exists and is a file |
//! | `mkdir` | no file at target, parent exists |
//! | `rmdir` | target is an empty, non-root directory |
//! | `read_dir` | target exists and is a directory |

use async_trait::async_trait;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::trace;

use super::backend::FsBackend;
use super::limits::StoreLimits;
use super::path::{ancestors, is_root, normalize_path, parent_path};
use super::traits::{FileSystem, Metadata};
use crate::error::{Error, Result};

/// POSIX-compatible filesystem wrapper.
///
/// Wraps any [`FsBackend`] and enforces the [`FileSystem`] error semantics.
pub struct PosixFs<B: FsBackend> {
    backend: B,
}

impl<B: FsBackend> PosixFs<B> {
    /// Wrap a storage backend.
    pub fn with_backend(backend: B) -> Self {
        Self { backend }
    }

    /// Get a reference to the underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Get storage limits.
    pub fn limits(&self) -> StoreLimits {
        self.backend.limits()
    }

    async fn lookup(&self, path: &str) -> Result<Option<Metadata>> {
        if is_root(path) {
            // Root exists even if a backend forgot to store it.
            return Ok(Some(
                self.backend
                    .lookup(path)
                    .await?
                    .unwrap_or_else(|| Metadata::directory(SystemTime::now())),
            ));
        }
        self.backend.lookup(path).await
    }
}

#[async_trait]
impl<B: FsBackend + 'static> FileSystem for PosixFs<B> {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let path = normalize_path(path);

        match self.lookup(&path).await? {
            Some(meta) if meta.is_dir() => Err(Error::IsDirectory(path)),
            Some(_) => self
                .backend
                .read(&path)
                .await?
                .ok_or(Error::NotFound(path)),
            None => Err(Error::NotFound(path)),
        }
    }

    async fn write_file(&self, path: &str, content: &[u8]) -> Result<()> {
        let path = normalize_path(path);
        if is_root(&path) {
            return Err(Error::IsDirectory(path));
        }

        let limits = self.backend.limits();
        let size = self.backend.encoded_len(content);
        if !limits.allows(size) {
            return Err(Error::SizeExceeded {
                path,
                size,
                limit: limits.max_object_size,
            });
        }

        // Once one ancestor is missing, every deeper one is missing too.
        let mut missing: Vec<&str> = Vec::new();
        for dir in ancestors(&path) {
            if !missing.is_empty() {
                missing.push(dir);
                continue;
            }
            match self.backend.lookup(dir).await? {
                Some(meta) if meta.is_dir() => {}
                Some(_) => return Err(Error::NotDirectory(dir.to_string())),
                None => missing.push(dir),
            }
        }

        if missing.is_empty() {
            if let Some(meta) = self.backend.lookup(&path).await? {
                if meta.is_dir() {
                    return Err(Error::IsDirectory(path));
                }
            }
        }

        trace!(path = %path, bytes = content.len(), created_dirs = missing.len(), "write_file");
        self.backend.write(&path, content, &missing).await
    }

    async fn unlink(&self, path: &str) -> Result<()> {
        let path = normalize_path(path);

        match self.lookup(&path).await? {
            Some(meta) if meta.is_dir() => Err(Error::PermissionDenied(path)),
            Some(_) => self.backend.remove(&path).await,
            None => Err(Error::NotFound(path)),
        }
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<String>> {
        let path = normalize_path(path);

        match self.lookup(&path).await? {
            Some(meta) if meta.is_dir() => self.backend.children(&path).await,
            Some(_) => Err(Error::NotDirectory(path)),
            None => Err(Error::NotFound(path)),
        }
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        let path = normalize_path(path);

        match self.lookup(&path).await? {
            Some(meta) if meta.is_dir() => return Ok(()),
            Some(_) => return Err(Error::AlreadyExists(path)),
            None => {}
        }

        if let Some(parent) = parent_path(&path) {
            match self.lookup(parent).await? {
                Some(meta) if meta.is_dir() => {}
                Some(_) => return Err(Error::NotDirectory(parent.to_string())),
                None => return Err(Error::NotFound(path)),
            }
        }

        trace!(path = %path, "mkdir");
        self.backend.create_dir(&path).await
    }

    async fn rmdir(&self, path: &str) -> Result<()> {
        let path = normalize_path(path);
        if is_root(&path) {
            return Err(Error::PermissionDenied(path));
        }

        match self.lookup(&path).await? {
            Some(meta) if meta.is_dir() => {
                if self.backend.has_children(&path).await? {
                    return Err(Error::NotEmpty(path));
                }
                self.backend.remove(&path).await
            }
            Some(_) => Err(Error::NotDirectory(path)),
            None => Err(Error::NotFound(path)),
        }
    }

    async fn stat(&self, path: &str) -> Result<Metadata> {
        let path = normalize_path(path);
        self.lookup(&path).await?.ok_or(Error::NotFound(path))
    }
}

// Allow PosixFs<B> to be used where Arc<dyn FileSystem> is expected
impl<B: FsBackend + 'static> From<PosixFs<B>> for Arc<dyn FileSystem> {
    fn from(fs: PosixFs<B>) -> Self {
        Arc::new(fs)
    }
}

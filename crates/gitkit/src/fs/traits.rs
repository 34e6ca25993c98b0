//! Filesystem trait definitions

use async_trait::async_trait;
use std::time::SystemTime;

use crate::error::Result;

/// Mode reported for regular files.
pub const FILE_MODE: u32 = 0o100644;

/// Mode reported for directories.
pub const DIR_MODE: u32 = 0o040755;

/// Async filesystem trait consumed by the git plumbing.
///
/// Paths are strings and are normalized by every implementation, so `"/a/b"`
/// and `"a/b/"` name the same entry. Errors carry POSIX categories (see
/// [`crate::Error::code`]).
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Read a file's contents.
    ///
    /// # Errors
    /// - `NotFound` if absent, `IsDirectory` if the path is a directory
    async fn read_file(&self, path: &str) -> Result<Vec<u8>>;

    /// Create or replace a file, creating missing ancestor directories.
    ///
    /// # Errors
    /// - `IsDirectory` if the path is a directory
    /// - `NotDirectory` if an ancestor is a file
    /// - `SizeExceeded` if the encoded content is over the backend ceiling
    async fn write_file(&self, path: &str, content: &[u8]) -> Result<()>;

    /// Remove a file.
    ///
    /// # Errors
    /// - `NotFound` if absent, `PermissionDenied` if the path is a directory
    async fn unlink(&self, path: &str) -> Result<()>;

    /// Names of the immediate children of a directory.
    ///
    /// # Errors
    /// - `NotFound` if absent, `NotDirectory` if the path is a file
    async fn read_dir(&self, path: &str) -> Result<Vec<String>>;

    /// Create a directory. Succeeds if a directory is already there.
    ///
    /// Parents are not created.
    ///
    /// # Errors
    /// - `AlreadyExists` if a file occupies the path
    /// - `NotFound` if the parent does not exist
    async fn mkdir(&self, path: &str) -> Result<()>;

    /// Remove an empty directory.
    ///
    /// # Errors
    /// - `NotFound`, `NotDirectory`, `NotEmpty`
    /// - `PermissionDenied` on root
    async fn rmdir(&self, path: &str) -> Result<()>;

    /// Get metadata for a path.
    async fn stat(&self, path: &str) -> Result<Metadata>;

    /// Get metadata without following links.
    ///
    /// Links are stored as plain files, so this is the same as `stat`.
    async fn lstat(&self, path: &str) -> Result<Metadata> {
        self.stat(path).await
    }

    /// Create a symbolic link; stored as a file holding the target text.
    async fn symlink(&self, target: &str, path: &str) -> Result<()> {
        self.write_file(path, target.as_bytes()).await
    }

    /// Read a link target written by [`FileSystem::symlink`].
    async fn read_link(&self, path: &str) -> Result<String> {
        let content = self.read_file(path).await?;
        Ok(String::from_utf8_lossy(&content).into_owned())
    }

    /// Check if a path exists.
    ///
    /// Only `NotFound` maps to `false`; every other error is returned.
    async fn exists(&self, path: &str) -> Result<bool> {
        match self.stat(path).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// File metadata.
#[derive(Debug, Clone)]
pub struct Metadata {
    /// File type
    pub file_type: FileType,
    /// Size in bytes (approximate for encoded backends)
    pub size: u64,
    /// Unix mode including the type bits
    pub mode: u32,
    /// Last modification time (advisory)
    pub modified: SystemTime,
}

impl Metadata {
    /// Metadata for a file of `size` bytes.
    pub fn file(size: u64, modified: SystemTime) -> Self {
        Self {
            file_type: FileType::File,
            size,
            mode: FILE_MODE,
            modified,
        }
    }

    /// Metadata for a directory.
    pub fn directory(modified: SystemTime) -> Self {
        Self {
            file_type: FileType::Directory,
            size: 0,
            mode: DIR_MODE,
            modified,
        }
    }

    /// Check if this is a file.
    pub fn is_file(&self) -> bool {
        self.file_type.is_file()
    }

    /// Check if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.file_type.is_dir()
    }

    /// Always false; links are indistinguishable from files.
    pub fn is_symlink(&self) -> bool {
        false
    }
}

/// File type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// Regular file
    File,
    /// Directory
    Directory,
}

impl FileType {
    /// Check if this is a file.
    pub fn is_file(&self) -> bool {
        matches!(self, FileType::File)
    }

    /// Check if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, FileType::Directory)
    }
}

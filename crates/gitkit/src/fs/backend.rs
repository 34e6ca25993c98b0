//! Low-level storage backend trait.
//!
//! This module provides the [`FsBackend`] trait for raw storage operations
//! without POSIX semantics. [`PosixFs`](super::PosixFs) wraps a backend and
//! enforces the whole [`FileSystem`](super::FileSystem) contract, so the
//! volatile and persistent stores share one set of rules.
//!
//! ```text
//!             ┌───────────────────────┐
//!             │     git plumbing      │
//!             └───────────┬───────────┘
//!                         │ FileSystem
//!             ┌───────────▼───────────┐
//!             │      PosixFs<B>       │
//!             │   (error semantics)   │
//!             └─────┬───────────┬─────┘
//!                   │ FsBackend │
//!       ┌───────────▼───┐   ┌───▼───────────┐
//!       │ MemoryBackend │   │ SqliteBackend │
//!       └───────────────┘   └───────────────┘
//! ```

use async_trait::async_trait;

use super::limits::StoreLimits;
use super::traits::Metadata;
use crate::error::Result;

/// Raw storage operations.
///
/// # Contract
///
/// Backends receive canonical paths only (see [`super::path`]) and may assume
/// [`PosixFs`](super::PosixFs) has already checked entry types, parent
/// existence and size. The root entry (`""`) must always exist as a directory.
#[async_trait]
pub trait FsBackend: Send + Sync {
    /// Metadata of an entry, `None` if absent.
    async fn lookup(&self, path: &str) -> Result<Option<Metadata>>;

    /// File contents, `None` if there is no file at `path`.
    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>>;

    /// Store a file, first creating `missing_dirs` (top-down).
    ///
    /// Replaces any existing file at `path`.
    async fn write(&self, path: &str, content: &[u8], missing_dirs: &[&str]) -> Result<()>;

    /// Store a directory entry.
    async fn create_dir(&self, path: &str) -> Result<()>;

    /// Delete a single entry.
    async fn remove(&self, path: &str) -> Result<()>;

    /// Names of the immediate children of a directory.
    async fn children(&self, path: &str) -> Result<Vec<String>>;

    /// Whether a directory has any child entries.
    async fn has_children(&self, path: &str) -> Result<bool>;

    /// Stored size of `content` after the backend's encoding.
    fn encoded_len(&self, content: &[u8]) -> u64 {
        content.len() as u64
    }

    /// Get storage limits.
    fn limits(&self) -> StoreLimits {
        StoreLimits::unlimited()
    }
}

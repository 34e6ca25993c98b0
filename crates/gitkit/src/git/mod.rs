//! Git plumbing for Gitkit
//!
//! The repository layer never touches git objects directly. It talks to a
//! [`GitPlumbing`] implementation, handing it a [`FileSystem`] and the logical
//! root of a working tree. [`LoosePlumbing`] is the bundled implementation:
//! loose zlib objects, text refs, a symbolic `HEAD`, and version-2 packs.
//!
//! # Usage
//!
//! ```rust,ignore
//! use gitkit::{GitConfig, GitPlumbing, LoosePlumbing, VolatileStore};
//!
//! let fs = VolatileStore::new();
//! let git = LoosePlumbing::new();
//! let config = GitConfig::new();
//!
//! git.init(&fs, "/", config.branch()).await?;
//! fs.write_file("README.md", b"# hello\n").await?;
//! git.add(&fs, "/", "README.md").await?;
//! let oid = git.commit(&fs, "/", "Initial commit", &config.signature()).await?;
//! ```

mod config;
mod loose;
mod object;
mod pack;

pub use config::{DEFAULT_AUTHOR_EMAIL, DEFAULT_AUTHOR_NAME, DEFAULT_BRANCH, GIT_DIR, GitConfig};
pub use loose::LoosePlumbing;
pub use object::{
    CommitInfo, MODE_COMMIT, MODE_EXECUTABLE, MODE_FILE, MODE_SYMLINK, MODE_TREE, ObjectId,
    ObjectKind, Signature, TreeEntry, decode_commit, decode_loose, decode_tree, encode_commit,
    encode_loose, encode_tree,
};
pub use pack::PackWriter;

use async_trait::async_trait;

use crate::error::Result;
use crate::fs::FileSystem;

/// Change of one path between the stage and `HEAD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChange {
    /// Staged but not in `HEAD`
    Added,
    /// Staged with different content or mode
    Modified,
    /// In `HEAD` but no longer staged
    Deleted,
}

/// One line of a stage-vs-HEAD diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// Path relative to the working tree root
    pub path: String,
    pub change: FileChange,
}

/// Git operations over a virtual filesystem.
///
/// `dir` is the working tree root inside `fs`; repository metadata lives in
/// `<dir>/.git`. Filesystem errors propagate unchanged; object-level failures
/// (missing or corrupt objects, bad refs) surface as `Error::Plumbing`.
#[async_trait]
pub trait GitPlumbing: Send + Sync {
    /// Create an empty repository. A no-op if one exists.
    async fn init(&self, fs: &dyn FileSystem, dir: &str, default_branch: &str) -> Result<()>;

    /// Stage a path. Directories are staged recursively; a missing path is
    /// removed from the stage.
    async fn add(&self, fs: &dyn FileSystem, dir: &str, path: &str) -> Result<()>;

    /// Drop a path from the stage.
    async fn remove(&self, fs: &dyn FileSystem, dir: &str, path: &str) -> Result<()>;

    /// Record the stage as a commit on top of `HEAD` and advance `HEAD`.
    async fn commit(
        &self,
        fs: &dyn FileSystem,
        dir: &str,
        message: &str,
        author: &Signature,
    ) -> Result<ObjectId>;

    /// Diff the stage against `HEAD`, sorted by path.
    async fn status(&self, fs: &dyn FileSystem, dir: &str) -> Result<Vec<StatusEntry>>;

    /// Resolve a ref name (or full id) to an object id; `None` if unresolvable.
    async fn resolve_ref(&self, fs: &dyn FileSystem, dir: &str, name: &str)
    -> Result<Option<ObjectId>>;

    /// Point a ref at an object, replacing any previous value.
    async fn write_ref(&self, fs: &dyn FileSystem, dir: &str, name: &str, oid: ObjectId)
    -> Result<()>;

    /// Local branch names, sorted.
    async fn list_branches(&self, fs: &dyn FileSystem, dir: &str) -> Result<Vec<String>>;

    /// Branch `HEAD` points at, `None` when detached or absent.
    async fn current_branch(&self, fs: &dyn FileSystem, dir: &str) -> Result<Option<String>>;

    /// Read a commit object.
    async fn read_commit(&self, fs: &dyn FileSystem, dir: &str, oid: ObjectId)
    -> Result<CommitInfo>;

    /// Read a tree object.
    async fn read_tree(&self, fs: &dyn FileSystem, dir: &str, oid: ObjectId)
    -> Result<Vec<TreeEntry>>;

    /// Read a blob object.
    async fn read_blob(&self, fs: &dyn FileSystem, dir: &str, oid: ObjectId) -> Result<Vec<u8>>;

    /// Build a pack containing exactly `oids`, in the given order.
    async fn pack_objects(&self, fs: &dyn FileSystem, dir: &str, oids: &[ObjectId])
    -> Result<Vec<u8>>;
}

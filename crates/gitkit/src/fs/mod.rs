//! Virtual filesystem for Gitkit
//!
//! Provides an async filesystem trait and two stores behind it:
//! - `VolatileStore`: in-memory, request-scoped
//! - `PersistentStore`: SQLite table with base64 text content
//!
//! Both are [`PosixFs`] over a raw [`FsBackend`], so they share one
//! implementation of the error semantics the git plumbing relies on.

mod backend;
mod limits;
mod memory;
pub mod path;
mod posix;
mod sqlite;
mod traits;

pub use backend::FsBackend;
pub use limits::{DEFAULT_MAX_OBJECT_SIZE, STORAGE_FIELD_LIMIT, StoreLimits};
pub use memory::{MemoryBackend, VolatileStore};
pub use posix::PosixFs;
pub use sqlite::{PersistentStore, SqliteBackend};
pub use traits::{DIR_MODE, FILE_MODE, FileSystem, FileType, Metadata};

use crate::error::Result;
use path::{ancestors, is_root, join_path, normalize_path};

/// Create a directory and all of its missing ancestors, top-down.
pub async fn create_dir_all(fs: &dyn FileSystem, path: &str) -> Result<()> {
    let path = normalize_path(path);
    if is_root(&path) {
        return Ok(());
    }
    for dir in ancestors(&path) {
        fs.mkdir(dir).await?;
    }
    fs.mkdir(&path).await
}

/// Every file below `dir`, as canonical paths, sorted.
///
/// Uses an explicit stack so depth is not bounded by the call stack.
pub async fn walk_files(fs: &dyn FileSystem, dir: &str) -> Result<Vec<String>> {
    let mut files = Vec::new();
    let mut pending = vec![normalize_path(dir)];

    while let Some(current) = pending.pop() {
        for name in fs.read_dir(&current).await? {
            let child = join_path(&current, &name);
            if fs.stat(&child).await?.is_dir() {
                pending.push(child);
            } else {
                files.push(child);
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Copy every file below `dir` from one filesystem into another.
///
/// Returns the number of files copied.
pub async fn copy_tree(from: &dyn FileSystem, to: &dyn FileSystem, dir: &str) -> Result<usize> {
    let files = walk_files(from, dir).await?;
    for file in &files {
        let content = from.read_file(file).await?;
        to.write_file(file, &content).await?;
    }
    Ok(files.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[tokio::test]
    async fn create_dir_all_builds_chain() {
        let fs = VolatileStore::new();
        create_dir_all(&fs, "/a/b/c").await.unwrap();

        assert!(fs.stat("a").await.unwrap().is_dir());
        assert!(fs.stat("a/b/c").await.unwrap().is_dir());
        // Idempotent
        create_dir_all(&fs, "a/b/c").await.unwrap();
    }

    #[tokio::test]
    async fn create_dir_all_stops_at_file() {
        let fs = VolatileStore::new();
        fs.write_file("a", b"file").await.unwrap();

        let err = create_dir_all(&fs, "a/b").await.unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn walk_files_is_recursive_and_sorted() {
        let fs = VolatileStore::new();
        fs.write_file("z.txt", b"").await.unwrap();
        fs.write_file("d/e/f.txt", b"").await.unwrap();
        fs.write_file("d/a.txt", b"").await.unwrap();
        fs.mkdir("empty").await.unwrap();

        let files = walk_files(&fs, "/").await.unwrap();
        assert_eq!(files, vec!["d/a.txt", "d/e/f.txt", "z.txt"]);

        let sub = walk_files(&fs, "d/e").await.unwrap();
        assert_eq!(sub, vec!["d/e/f.txt"]);
    }

    #[tokio::test]
    async fn copy_tree_between_backends() {
        let src = PersistentStore::open_in_memory().unwrap();
        src.write_file(".git/HEAD", b"ref: refs/heads/main\n")
            .await
            .unwrap();
        src.write_file(".git/objects/ab/cdef", &[0x78, 0x01, 0x00])
            .await
            .unwrap();
        src.write_file("README.md", b"not copied").await.unwrap();

        let dst = VolatileStore::new();
        let copied = copy_tree(&src, &dst, ".git").await.unwrap();

        assert_eq!(copied, 2);
        assert_eq!(
            dst.read_file(".git/objects/ab/cdef").await.unwrap(),
            vec![0x78, 0x01, 0x00]
        );
        assert!(!dst.exists("README.md").await.unwrap());
    }
}

//! In-memory storage backend

// RwLock.read()/write().unwrap() only panics on lock poisoning (prior panic
// while holding lock). This is intentional - corrupted state should not propagate.
#![allow(clippy::unwrap_used)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::SystemTime;

use super::backend::FsBackend;
use super::path::{ROOT, file_name, parent_path};
use super::posix::PosixFs;
use super::traits::Metadata;
use crate::error::Result;

/// Volatile store: the POSIX contract over an in-memory map.
///
/// Used to materialize throwaway repositories for a single request.
pub type VolatileStore = PosixFs<MemoryBackend>;

impl VolatileStore {
    /// Create an empty volatile store holding only the root directory.
    pub fn new() -> Self {
        PosixFs::with_backend(MemoryBackend::new())
    }
}

impl Default for VolatileStore {
    fn default() -> Self {
        Self::new()
    }
}

/// In-memory backend.
///
/// Stores every entry in a HashMap keyed by canonical path.
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, MemEntry>>,
}

#[derive(Debug, Clone)]
enum MemEntry {
    File {
        content: Vec<u8>,
        modified: SystemTime,
    },
    Directory {
        modified: SystemTime,
    },
}

impl MemEntry {
    fn metadata(&self) -> Metadata {
        match self {
            MemEntry::File { content, modified } => Metadata::file(content.len() as u64, *modified),
            MemEntry::Directory { modified } => Metadata::directory(*modified),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create a backend holding only the root directory.
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        entries.insert(
            ROOT.to_string(),
            MemEntry::Directory {
                modified: SystemTime::now(),
            },
        );

        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Number of stored entries, root included.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    /// Whether only the root is stored.
    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }
}

#[async_trait]
impl FsBackend for MemoryBackend {
    async fn lookup(&self, path: &str) -> Result<Option<Metadata>> {
        let entries = self.entries.read().unwrap();
        Ok(entries.get(path).map(MemEntry::metadata))
    }

    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let entries = self.entries.read().unwrap();
        match entries.get(path) {
            Some(MemEntry::File { content, .. }) => Ok(Some(content.clone())),
            _ => Ok(None),
        }
    }

    async fn write(&self, path: &str, content: &[u8], missing_dirs: &[&str]) -> Result<()> {
        let now = SystemTime::now();
        let mut entries = self.entries.write().unwrap();

        for dir in missing_dirs {
            entries
                .entry((*dir).to_string())
                .or_insert(MemEntry::Directory { modified: now });
        }

        entries.insert(
            path.to_string(),
            MemEntry::File {
                content: content.to_vec(),
                modified: now,
            },
        );

        Ok(())
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        let mut entries = self.entries.write().unwrap();
        entries.entry(path.to_string()).or_insert(MemEntry::Directory {
            modified: SystemTime::now(),
        });
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<()> {
        let mut entries = self.entries.write().unwrap();
        entries.remove(path);
        Ok(())
    }

    async fn children(&self, path: &str) -> Result<Vec<String>> {
        let entries = self.entries.read().unwrap();
        Ok(entries
            .keys()
            .filter(|key| parent_path(key) == Some(path))
            .map(|key| file_name(key).to_string())
            .collect())
    }

    async fn has_children(&self, path: &str) -> Result<bool> {
        let entries = self.entries.read().unwrap();
        Ok(entries.keys().any(|key| parent_path(key) == Some(path)))
    }
}

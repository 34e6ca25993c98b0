//! Long-lived repository over a persistent store.

use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{FixedOffset, Offset, TimeZone, Utc};
use tracing::debug;

use crate::error::{Error, Result};
use crate::fs::FileSystem;
use crate::fs::path::{ROOT, is_within, normalize_path};
use crate::git::{CommitInfo, GIT_DIR, GitConfig, GitPlumbing, ObjectId, Signature, StatusEntry};

/// One commit of a [`RepositorySession::log`] walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub oid: ObjectId,
    pub commit: CommitInfo,
}

/// A repository whose working tree and metadata live in one store.
///
/// The session does not serialize writers; callers sharing a store must
/// order their writes themselves.
pub struct RepositorySession {
    fs: Arc<dyn FileSystem>,
    plumbing: Arc<dyn GitPlumbing>,
    config: GitConfig,
}

impl RepositorySession {
    /// Bind to a store, initializing the repository on first use.
    pub async fn open(
        fs: impl Into<Arc<dyn FileSystem>>,
        plumbing: Arc<dyn GitPlumbing>,
        config: GitConfig,
    ) -> Result<Self> {
        let session = Self {
            fs: fs.into(),
            plumbing,
            config,
        };
        if !session.has_history().await? {
            debug!(branch = session.config.branch(), "initializing session repository");
            session
                .plumbing
                .init(session.fs.as_ref(), ROOT, session.config.branch())
                .await?;
        }
        Ok(session)
    }

    /// Backing store.
    pub fn fs(&self) -> &dyn FileSystem {
        self.fs.as_ref()
    }

    /// Working tree root inside [`fs`](Self::fs).
    pub fn dir(&self) -> &str {
        ROOT
    }

    pub fn plumbing(&self) -> &Arc<dyn GitPlumbing> {
        &self.plumbing
    }

    pub fn config(&self) -> &GitConfig {
        &self.config
    }

    /// Whether the store holds repository metadata.
    pub async fn has_history(&self) -> Result<bool> {
        self.fs.exists(GIT_DIR).await
    }

    fn working_path(path: &str) -> Result<String> {
        let path = normalize_path(path);
        if path.is_empty() || is_within(&path, GIT_DIR) {
            return Err(Error::PermissionDenied(path));
        }
        Ok(path)
    }

    /// Write a working-tree file. Repository metadata is not writable.
    pub async fn write_file(&self, path: &str, content: &[u8]) -> Result<()> {
        let path = Self::working_path(path)?;
        self.fs.write_file(&path, content).await
    }

    pub async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        self.fs.read_file(&Self::working_path(path)?).await
    }

    pub async fn delete_file(&self, path: &str) -> Result<()> {
        self.fs.unlink(&Self::working_path(path)?).await
    }

    /// Working tree changes relative to `HEAD`.
    ///
    /// Stages the whole tree first, so the result reflects unstaged edits too.
    pub async fn status(&self) -> Result<Vec<StatusEntry>> {
        self.plumbing.add(self.fs(), ROOT, ".").await?;
        self.plumbing.status(self.fs(), ROOT).await
    }

    /// Commit every working tree change. `None` when nothing changed.
    pub async fn commit(&self, message: &str) -> Result<Option<ObjectId>> {
        self.commit_as(message, &self.config.signature()).await
    }

    /// Commit with an explicit author and timestamp.
    pub async fn commit_as(&self, message: &str, author: &Signature) -> Result<Option<ObjectId>> {
        let changes = self.status().await?;
        if changes.is_empty() {
            debug!("nothing to commit");
            return Ok(None);
        }

        let oid = self.plumbing.commit(self.fs(), ROOT, message, author).await?;
        debug!(%oid, changes = changes.len(), "session commit");
        Ok(Some(oid))
    }

    /// Tip of the current branch.
    pub async fn head(&self) -> Result<Option<ObjectId>> {
        self.plumbing.resolve_ref(self.fs(), ROOT, "HEAD").await
    }

    /// Walk first parents from `HEAD`, newest first.
    pub async fn log(&self, limit: usize) -> Result<Vec<LogEntry>> {
        let mut entries = Vec::new();
        let mut next = self.head().await?;

        while let Some(oid) = next {
            if entries.len() >= limit {
                break;
            }
            let commit = self.plumbing.read_commit(self.fs(), ROOT, oid).await?;
            next = commit.parents.first().copied();
            entries.push(LogEntry { oid, commit });
        }
        Ok(entries)
    }

    /// `git log`-style text for the last `limit` commits.
    pub async fn format_log(&self, limit: usize) -> Result<String> {
        let mut out = String::new();
        for entry in self.log(limit).await? {
            let author = &entry.commit.author;
            let _ = writeln!(out, "commit {}", entry.oid);
            let _ = writeln!(out, "Author: {} <{}>", author.name, author.email);
            let _ = writeln!(out, "Date:   {}", format_date(author));
            out.push('\n');
            for line in entry.commit.message.lines() {
                let _ = writeln!(out, "    {line}");
            }
            out.push('\n');
        }
        Ok(out)
    }
}

fn format_date(sig: &Signature) -> String {
    let offset = FixedOffset::east_opt(sig.tz_offset_minutes * 60).unwrap_or(Utc.fix());
    match offset.timestamp_opt(sig.timestamp, 0).single() {
        Some(time) => time.format("%a %b %e %H:%M:%S %Y %z").to_string(),
        None => sig.timestamp.to_string(),
    }
}

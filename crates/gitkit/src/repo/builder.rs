//! Request-scoped repositories for clone and fetch.
//!
//! A build layers up to two disconnected histories in a fresh
//! [`VolatileStore`]:
//!
//! ```text
//!   template snapshot ──► base commit ─┐
//!                                      ├─► refs/heads/<branch>
//!   session .git ──► copied objects ───┘   (session tip wins)
//! ```
//!
//! The branch is repointed at the session tip; no object is rewritten, so the
//! session's commit ids survive the build unchanged.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::session::RepositorySession;
use crate::error::{BuildPhase, Error, Result};
use crate::fs::path::{ROOT, join_path, normalize_path};
use crate::fs::{FileSystem, VolatileStore, copy_tree, walk_files};
use crate::git::{GIT_DIR, GitConfig, GitPlumbing, ObjectId};

/// Files a new repository starts from, keyed by path.
///
/// Deserializes from a JSON object of path to UTF-8 text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct TemplateSnapshot {
    files: BTreeMap<String, Vec<u8>>,
}

impl TemplateSnapshot {
    /// Empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a file.
    pub fn file(mut self, path: &str, content: impl Into<Vec<u8>>) -> Self {
        self.insert(path, content);
        self
    }

    /// Add or replace a file in place.
    pub fn insert(&mut self, path: &str, content: impl Into<Vec<u8>>) {
        self.files.insert(normalize_path(path), content.into());
    }

    /// Number of files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// `true` when there are no files.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Files in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.files.iter().map(|(p, c)| (p.as_str(), c.as_slice()))
    }
}

impl From<BTreeMap<String, String>> for TemplateSnapshot {
    fn from(files: BTreeMap<String, String>) -> Self {
        let mut snapshot = Self::new();
        for (path, text) in files {
            snapshot.insert(&path, text);
        }
        snapshot
    }
}

impl From<TemplateSnapshot> for BTreeMap<String, String> {
    fn from(snapshot: TemplateSnapshot) -> Self {
        snapshot
            .files
            .into_iter()
            .map(|(path, content)| (path, String::from_utf8_lossy(&content).into_owned()))
            .collect()
    }
}

/// Which state a build produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    /// No commits and no refs.
    Empty,
    /// Only the template base commit.
    TemplateOnly,
    /// Session history imported and the branch points at its tip.
    FullHistory,
    /// History was imported but the branch could not be repointed.
    Degraded,
}

/// A populated in-memory repository, discarded after one response.
pub struct EphemeralRepository {
    fs: VolatileStore,
    plumbing: Arc<dyn GitPlumbing>,
    config: GitConfig,
    outcome: BuildOutcome,
}

impl EphemeralRepository {
    /// Store holding the working tree and `.git`.
    pub fn fs(&self) -> &VolatileStore {
        &self.fs
    }

    /// Working tree root inside [`fs`](Self::fs).
    pub fn dir(&self) -> &str {
        ROOT
    }

    /// Plumbing the repository was built with.
    pub fn plumbing(&self) -> &dyn GitPlumbing {
        self.plumbing.as_ref()
    }

    /// Configuration the repository was built with.
    pub fn config(&self) -> &GitConfig {
        &self.config
    }

    /// Which state the build produced.
    pub fn outcome(&self) -> BuildOutcome {
        self.outcome
    }

    /// Commit `HEAD` resolves to, `None` for an empty repository.
    pub async fn resolve_head(&self) -> Result<Option<ObjectId>> {
        self.plumbing.resolve_ref(&self.fs, ROOT, "HEAD").await
    }

    /// Branch `HEAD` points at.
    pub async fn head_branch(&self) -> Result<Option<String>> {
        self.plumbing.current_branch(&self.fs, ROOT).await
    }
}

/// Assembles [`EphemeralRepository`] instances.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use gitkit::{EphemeralRepositoryBuilder, LoosePlumbing, TemplateSnapshot};
///
/// let builder = EphemeralRepositoryBuilder::new(Arc::new(LoosePlumbing::new()));
/// let template = TemplateSnapshot::new().file("index.html", "<h1>hi</h1>");
/// let repo = builder.build(Some(&template), Some(&session)).await?;
/// ```
pub struct EphemeralRepositoryBuilder {
    plumbing: Arc<dyn GitPlumbing>,
    config: GitConfig,
}

impl EphemeralRepositoryBuilder {
    /// Builder using `plumbing` and the default [`GitConfig`].
    pub fn new(plumbing: Arc<dyn GitPlumbing>) -> Self {
        Self {
            plumbing,
            config: GitConfig::default(),
        }
    }

    /// Identity, branch and base commit message for builds.
    pub fn config(mut self, config: GitConfig) -> Self {
        self.config = config;
        self
    }

    /// Build a repository from an optional template and an optional session.
    ///
    /// Steps run in order: init, template commit, history import, ref
    /// repoint. A failed repoint is logged and yields
    /// [`BuildOutcome::Degraded`]; any other failure aborts the build with
    /// [`Error::Build`].
    pub async fn build(
        &self,
        template: Option<&TemplateSnapshot>,
        session: Option<&RepositorySession>,
    ) -> Result<EphemeralRepository> {
        let fs = VolatileStore::new();
        let git = self.plumbing.as_ref();

        debug!(phase = %BuildPhase::Init, "building ephemeral repository");
        git.init(&fs, ROOT, self.config.branch())
            .await
            .map_err(|e| Error::build(BuildPhase::Init, e))?;

        let base = match template.filter(|t| !t.is_empty()) {
            Some(template) => Some(
                self.commit_template(&fs, template)
                    .await
                    .map_err(|e| Error::build(BuildPhase::TemplateCommit, e))?,
            ),
            None => None,
        };

        let imported = match session {
            Some(session) => self
                .import_history(&fs, session)
                .await
                .map_err(|e| Error::build(BuildPhase::HistoryImport, e))?,
            None => false,
        };

        let outcome = match (imported, session) {
            (true, Some(session)) => self.repoint(&fs, session, base).await,
            _ if base.is_some() => BuildOutcome::TemplateOnly,
            _ => BuildOutcome::Empty,
        };

        debug!(?outcome, "ephemeral repository ready");
        Ok(EphemeralRepository {
            fs,
            plumbing: Arc::clone(&self.plumbing),
            config: self.config.clone(),
            outcome,
        })
    }

    async fn commit_template(
        &self,
        fs: &VolatileStore,
        template: &TemplateSnapshot,
    ) -> Result<ObjectId> {
        debug!(phase = %BuildPhase::TemplateCommit, files = template.len());
        for (path, content) in template.iter() {
            fs.write_file(path, content).await?;
        }
        self.plumbing.add(fs, ROOT, ".").await?;
        self.plumbing
            .commit(fs, ROOT, &self.config.template_message, &self.config.signature())
            .await
    }

    /// Copy the session's metadata namespace. `false` if it has none.
    async fn import_history(
        &self,
        fs: &VolatileStore,
        session: &RepositorySession,
    ) -> Result<bool> {
        if !session.has_history().await? {
            return Ok(false);
        }
        let source = join_path(session.dir(), GIT_DIR);
        let copied = copy_tree(session.fs(), fs, &source).await?;
        debug!(phase = %BuildPhase::HistoryImport, files = copied);
        Ok(true)
    }

    async fn point_at_session_tip(
        &self,
        fs: &VolatileStore,
        session: &RepositorySession,
        branch_ref: &str,
    ) -> Result<Option<ObjectId>> {
        let tip = session
            .plumbing()
            .resolve_ref(session.fs(), session.dir(), "HEAD")
            .await?;
        if let Some(tip) = tip {
            self.plumbing.write_ref(fs, ROOT, branch_ref, tip).await?;
        }
        Ok(tip)
    }

    async fn repoint(
        &self,
        fs: &VolatileStore,
        session: &RepositorySession,
        base: Option<ObjectId>,
    ) -> BuildOutcome {
        let branch_ref = self.config.branch_ref();
        let repointed = self.point_at_session_tip(fs, session, &branch_ref).await;

        match repointed {
            Ok(Some(tip)) => {
                debug!(phase = %BuildPhase::RefRepoint, %tip, branch = %branch_ref);
                BuildOutcome::FullHistory
            }
            Ok(None) if base.is_some() => BuildOutcome::TemplateOnly,
            Ok(None) => BuildOutcome::Empty,
            Err(e) => {
                let e = Error::build(BuildPhase::RefRepoint, e);
                warn!(error = %e, "continuing without session history");
                if let Err(e) = self.reset_refs(fs, &branch_ref, base).await {
                    warn!(error = %e, "could not restore base refs");
                }
                BuildOutcome::Degraded
            }
        }
    }

    /// Drop the copied session refs and point `HEAD` back at the configured
    /// branch, which holds `base` or nothing.
    async fn reset_refs(
        &self,
        fs: &VolatileStore,
        branch_ref: &str,
        base: Option<ObjectId>,
    ) -> Result<()> {
        let heads = join_path(GIT_DIR, "refs/heads");
        if fs.exists(&heads).await? {
            for path in walk_files(fs, &heads).await? {
                fs.unlink(&path).await?;
            }
        }
        fs.write_file(
            &join_path(GIT_DIR, "HEAD"),
            format!("ref: {branch_ref}\n").as_bytes(),
        )
        .await?;
        if let Some(base) = base {
            self.plumbing.write_ref(fs, ROOT, branch_ref, base).await?;
        }
        Ok(())
    }
}

//! Git smart-HTTP responses for `upload-pack`.
//!
//! Produces the bodies of `GET info/refs?service=git-upload-pack` and
//! `POST git-upload-pack` for an [`EphemeralRepository`]. Negotiation is not
//! implemented: every request receives everything reachable from `HEAD`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use gitkit::protocol::{ADVERTISEMENT_CONTENT_TYPE, SmartProtocolServer};
//!
//! let server = SmartProtocolServer::new();
//! let body = server.advertise_refs(&repo).await?;
//! respond(ADVERTISEMENT_CONTENT_TYPE, body);
//! ```

pub mod pktline;
pub mod sideband;

use std::collections::HashSet;

use tracing::debug;

use crate::error::{Error, Result};
use crate::git::{ObjectId, ObjectKind};
use crate::repo::EphemeralRepository;

/// Content type of the ref advertisement.
pub const ADVERTISEMENT_CONTENT_TYPE: &str = "application/x-git-upload-pack-advertisement";

/// Content type of the upload-pack result.
pub const RESULT_CONTENT_TYPE: &str = "application/x-git-upload-pack-result";

const SERVICE_LINE: &[u8] = b"# service=git-upload-pack\n";

/// Deduplicated objects reachable from a commit, in visit order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReachableSet {
    objects: Vec<(ObjectId, ObjectKind)>,
}

impl ReachableSet {
    /// Number of objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// `true` when no object was reached.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Number of objects of one kind.
    pub fn count(&self, kind: ObjectKind) -> usize {
        self.objects.iter().filter(|(_, k)| *k == kind).count()
    }

    /// Object ids in visit order.
    pub fn ids(&self) -> Vec<ObjectId> {
        self.objects.iter().map(|(oid, _)| *oid).collect()
    }

    /// Whether `oid` was reached.
    pub fn contains(&self, oid: ObjectId) -> bool {
        self.objects.iter().any(|(o, _)| *o == oid)
    }

    /// `(id, kind)` pairs in visit order.
    pub fn iter(&self) -> impl Iterator<Item = &(ObjectId, ObjectKind)> {
        self.objects.iter()
    }
}

/// Serves upload-pack responses.
#[derive(Debug, Clone)]
pub struct SmartProtocolServer {
    agent: String,
}

impl Default for SmartProtocolServer {
    fn default() -> Self {
        Self::new()
    }
}

impl SmartProtocolServer {
    /// Server advertising `agent=gitkit/<version>`.
    pub fn new() -> Self {
        Self {
            agent: format!("gitkit/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Override the `agent=` capability.
    pub fn agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = agent.into();
        self
    }

    fn capabilities(&self, head_branch: Option<&str>) -> String {
        let mut caps = String::from("side-band-64k no-progress");
        if let Some(branch) = head_branch {
            caps.push_str(&format!(" symref=HEAD:refs/heads/{branch}"));
        }
        caps.push_str(&format!(" agent={}", self.agent));
        caps
    }

    /// Body of `info/refs?service=git-upload-pack`.
    ///
    /// The first ref line carries the capability list after a NUL. A
    /// repository with no refs advertises `capabilities^{}` on the zero id.
    /// Unreadable refs fail with `Error::Plumbing`.
    pub async fn advertise_refs(&self, repo: &EphemeralRepository) -> Result<Vec<u8>> {
        let fs = repo.fs();
        let git = repo.plumbing();

        let head = repo.resolve_head().await.map_err(as_plumbing)?;
        let head_branch = repo.head_branch().await.map_err(as_plumbing)?;

        let mut refs: Vec<(ObjectId, String)> = Vec::new();
        if let Some(head) = head {
            refs.push((head, "HEAD".to_string()));
        }
        let branches = git.list_branches(fs, repo.dir()).await.map_err(as_plumbing)?;
        for branch in branches {
            let name = format!("refs/heads/{branch}");
            let oid = git.resolve_ref(fs, repo.dir(), &name).await.map_err(as_plumbing)?;
            if let Some(oid) = oid {
                refs.push((oid, name));
            }
        }

        let symref = head.and(head_branch.as_deref());
        let caps = self.capabilities(symref);

        let mut out = Vec::new();
        pktline::write(&mut out, SERVICE_LINE)?;
        out.extend_from_slice(pktline::flush());

        if refs.is_empty() {
            let line = format!("{} capabilities^{{}}\0{caps}\n", ObjectId::ZERO);
            pktline::write(&mut out, line.as_bytes())?;
        }
        for (i, (oid, name)) in refs.iter().enumerate() {
            let line = if i == 0 {
                format!("{oid} {name}\0{caps}\n")
            } else {
                format!("{oid} {name}\n")
            };
            pktline::write(&mut out, line.as_bytes())?;
        }
        out.extend_from_slice(pktline::flush());

        debug!(refs = refs.len(), bytes = out.len(), "advertised refs");
        Ok(out)
    }

    /// Body of `git-upload-pack`: `NAK`, the pack on side-band channel 1,
    /// then a flush.
    ///
    /// Fails with `Error::Plumbing` when the repository has no commits or
    /// any object cannot be read.
    pub async fn generate_pack(&self, repo: &EphemeralRepository) -> Result<Vec<u8>> {
        let head = repo
            .resolve_head()
            .await
            .map_err(as_plumbing)?
            .ok_or_else(|| Error::plumbing("repository has no commits to send"))?;

        let closure = reachable_objects(repo, head).await.map_err(as_plumbing)?;
        let pack = repo
            .plumbing()
            .pack_objects(repo.fs(), repo.dir(), &closure.ids())
            .await
            .map_err(as_plumbing)?;

        let mut out = Vec::with_capacity(pack.len() + 64);
        pktline::write(&mut out, b"NAK\n")?;
        sideband::write_channel(&mut out, sideband::PACK_DATA, &pack)?;
        out.extend_from_slice(pktline::flush());

        debug!(objects = closure.len(), pack_bytes = pack.len(), "generated pack");
        Ok(out)
    }
}

fn as_plumbing(e: Error) -> Error {
    match e {
        Error::Plumbing(_) => e,
        other => Error::plumbing(other.to_string()),
    }
}

/// Every object reachable from `start`: commits, their parents, their trees
/// and everything below them.
///
/// One visited set spans the whole walk, so shared trees and blobs appear
/// once. Submodule entries point outside the repository and are skipped.
pub async fn reachable_objects(
    repo: &EphemeralRepository,
    start: ObjectId,
) -> Result<ReachableSet> {
    let fs = repo.fs();
    let git = repo.plumbing();
    let dir = repo.dir();

    let mut seen: HashSet<ObjectId> = HashSet::new();
    let mut set = ReachableSet::default();
    let mut pending = vec![(start, ObjectKind::Commit)];

    while let Some((oid, kind)) = pending.pop() {
        if !seen.insert(oid) {
            continue;
        }
        set.objects.push((oid, kind));

        match kind {
            ObjectKind::Commit => {
                let commit = git.read_commit(fs, dir, oid).await?;
                for parent in commit.parents.iter().rev() {
                    pending.push((*parent, ObjectKind::Commit));
                }
                pending.push((commit.tree, ObjectKind::Tree));
            }
            ObjectKind::Tree => {
                for entry in git.read_tree(fs, dir, oid).await?.iter().rev() {
                    match entry.kind() {
                        ObjectKind::Tree => pending.push((entry.oid, ObjectKind::Tree)),
                        ObjectKind::Blob => pending.push((entry.oid, ObjectKind::Blob)),
                        ObjectKind::Commit => {}
                    }
                }
            }
            ObjectKind::Blob => {}
        }
    }

    Ok(set)
}

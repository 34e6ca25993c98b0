//! Loose-object git plumbing.
//!
//! Repository layout inside `<dir>/.git`:
//!
//! | Path | Content |
//! |------|---------|
//! | `HEAD` | `ref: refs/heads/<branch>` or a detached id |
//! | `refs/heads/*` | branch tips, one hex id per file |
//! | `objects/xx/yyyy…` | zlib-compressed `"<type> <len>\0<content>"` |
//! | `stage` | staged paths, one `<mode> <id>\t<path>` line each |
//! | `config` | minimal core section |

use async_trait::async_trait;
use flate2::Compression;
use std::cmp::Reverse;
use std::collections::BTreeMap;
use tracing::debug;

use super::config::GIT_DIR;
use super::object::{
    CommitInfo, MODE_FILE, MODE_TREE, ObjectId, ObjectKind, Signature, TreeEntry, decode_commit,
    decode_loose, decode_tree, encode_commit, encode_loose, encode_tree,
};
use super::pack::PackWriter;
use super::{FileChange, GitPlumbing, StatusEntry};
use crate::error::{Error, Result};
use crate::fs::path::{
    ROOT, ancestors, file_name, is_root, is_within, join_path, normalize_path, parent_path,
    relative_to,
};
use crate::fs::{FileSystem, create_dir_all, walk_files};

/// Symbolic refs followed before giving up.
const MAX_SYMREF_DEPTH: usize = 5;

const STAGE_FILE: &str = "stage";

type Stage = BTreeMap<String, (u32, ObjectId)>;

/// Git plumbing storing loose objects on a [`FileSystem`].
#[derive(Debug, Clone)]
pub struct LoosePlumbing {
    compression: Compression,
}

impl Default for LoosePlumbing {
    fn default() -> Self {
        Self::new()
    }
}

impl LoosePlumbing {
    /// Create plumbing with default zlib compression.
    pub fn new() -> Self {
        Self {
            compression: Compression::default(),
        }
    }

    /// Set the zlib level for objects and packs.
    pub fn compression(mut self, level: Compression) -> Self {
        self.compression = level;
        self
    }

    fn git_path(dir: &str, rest: &str) -> String {
        join_path(&join_path(dir, GIT_DIR), rest)
    }

    fn object_path(dir: &str, oid: ObjectId) -> String {
        let hex = oid.to_hex();
        Self::git_path(dir, &format!("objects/{}/{}", &hex[..2], &hex[2..]))
    }

    async fn write_object(
        &self,
        fs: &dyn FileSystem,
        dir: &str,
        kind: ObjectKind,
        content: &[u8],
    ) -> Result<ObjectId> {
        let oid = ObjectId::hash_object(kind, content);
        let path = Self::object_path(dir, oid);
        if !fs.exists(&path).await? {
            fs.write_file(&path, &encode_loose(kind, content, self.compression)?)
                .await?;
        }
        Ok(oid)
    }

    async fn read_object(
        &self,
        fs: &dyn FileSystem,
        dir: &str,
        oid: ObjectId,
    ) -> Result<(ObjectKind, Vec<u8>)> {
        match fs.read_file(&Self::object_path(dir, oid)).await {
            Ok(stored) => decode_loose(&stored),
            Err(e) if e.is_not_found() => Err(Error::plumbing(format!("object {oid} not found"))),
            Err(e) => Err(e),
        }
    }

    async fn read_typed(
        &self,
        fs: &dyn FileSystem,
        dir: &str,
        oid: ObjectId,
        expected: ObjectKind,
    ) -> Result<Vec<u8>> {
        let (kind, content) = self.read_object(fs, dir, oid).await?;
        if kind != expected {
            return Err(Error::plumbing(format!(
                "object {oid} is a {kind}, expected a {expected}"
            )));
        }
        Ok(content)
    }

    async fn read_stage(&self, fs: &dyn FileSystem, dir: &str) -> Result<Stage> {
        let content = match fs.read_file(&Self::git_path(dir, STAGE_FILE)).await {
            Ok(content) => content,
            Err(e) if e.is_not_found() => return Ok(Stage::new()),
            Err(e) => return Err(e),
        };

        let mut stage = Stage::new();
        for line in String::from_utf8_lossy(&content).lines() {
            if line.is_empty() {
                continue;
            }
            let malformed = || Error::plumbing(format!("malformed stage line '{line}'"));
            let (mode, rest) = line.split_once(' ').ok_or_else(malformed)?;
            let (hex, path) = rest.split_once('\t').ok_or_else(malformed)?;
            let mode = u32::from_str_radix(mode, 8).map_err(|_| malformed())?;
            stage.insert(path.to_string(), (mode, ObjectId::from_hex(hex)?));
        }
        Ok(stage)
    }

    async fn write_stage(&self, fs: &dyn FileSystem, dir: &str, stage: &Stage) -> Result<()> {
        let mut content = String::new();
        for (path, (mode, oid)) in stage {
            content.push_str(&format!("{mode:o} {oid}\t{path}\n"));
        }
        fs.write_file(&Self::git_path(dir, STAGE_FILE), content.as_bytes())
            .await
    }

    async fn stage_file(
        &self,
        fs: &dyn FileSystem,
        dir: &str,
        rel: &str,
        stage: &mut Stage,
    ) -> Result<()> {
        let content = fs.read_file(&join_path(dir, rel)).await?;
        let oid = self.write_object(fs, dir, ObjectKind::Blob, &content).await?;
        stage.insert(rel.to_string(), (MODE_FILE, oid));
        Ok(())
    }

    /// Files below `full`, never descending into the metadata directory.
    async fn working_files(
        &self,
        fs: &dyn FileSystem,
        dir: &str,
        full: &str,
    ) -> Result<Vec<String>> {
        let git_dir = join_path(dir, GIT_DIR);
        let mut files = Vec::new();
        for name in fs.read_dir(full).await? {
            let child = join_path(full, &name);
            if child == git_dir {
                continue;
            }
            if fs.stat(&child).await?.is_dir() {
                files.extend(walk_files(fs, &child).await?);
            } else {
                files.push(child);
            }
        }
        Ok(files)
    }

    /// Write tree objects for the stage, deepest directories first.
    async fn write_stage_tree(
        &self,
        fs: &dyn FileSystem,
        dir: &str,
        stage: &Stage,
    ) -> Result<ObjectId> {
        let mut dirs: BTreeMap<String, Vec<TreeEntry>> = BTreeMap::new();
        dirs.insert(ROOT.to_string(), Vec::new());

        for (path, (mode, oid)) in stage {
            for ancestor in ancestors(path) {
                dirs.entry(ancestor.to_string()).or_default();
            }
            let parent = parent_path(path).unwrap_or(ROOT);
            dirs.entry(parent.to_string()).or_default().push(TreeEntry {
                mode: *mode,
                name: file_name(path).to_string(),
                oid: *oid,
            });
        }

        let mut order: Vec<String> = dirs.keys().cloned().collect();
        order.sort_by_key(|d| Reverse(depth(d)));

        let mut root = None;
        for path in order {
            let entries = dirs.remove(&path).unwrap_or_default();
            let oid = self
                .write_object(fs, dir, ObjectKind::Tree, &encode_tree(&entries))
                .await?;
            match parent_path(&path) {
                Some(parent) => dirs.entry(parent.to_string()).or_default().push(TreeEntry {
                    mode: MODE_TREE,
                    name: file_name(&path).to_string(),
                    oid,
                }),
                None => root = Some(oid),
            }
        }

        root.ok_or_else(|| Error::plumbing("stage produced no root tree"))
    }

    /// Every blob below a tree, keyed by path.
    async fn flatten_tree(&self, fs: &dyn FileSystem, dir: &str, tree: ObjectId) -> Result<Stage> {
        let mut files = Stage::new();
        let mut pending = vec![(ROOT.to_string(), tree)];

        while let Some((prefix, oid)) = pending.pop() {
            for entry in self.read_tree(fs, dir, oid).await? {
                let path = join_path(&prefix, &entry.name);
                if entry.is_tree() {
                    pending.push((path, entry.oid));
                } else {
                    files.insert(path, (entry.mode, entry.oid));
                }
            }
        }
        Ok(files)
    }

    async fn head_files(&self, fs: &dyn FileSystem, dir: &str) -> Result<Stage> {
        match self.resolve_ref(fs, dir, "HEAD").await? {
            Some(head) => {
                let commit = self.read_commit(fs, dir, head).await?;
                self.flatten_tree(fs, dir, commit.tree).await
            }
            None => Ok(Stage::new()),
        }
    }

    async fn read_ref_file(
        &self,
        fs: &dyn FileSystem,
        dir: &str,
        name: &str,
    ) -> Result<Option<String>> {
        match fs.read_file(&Self::git_path(dir, name)).await {
            Ok(content) => Ok(Some(String::from_utf8_lossy(&content).trim().to_string())),
            Err(Error::NotFound(_)) | Err(Error::IsDirectory(_)) | Err(Error::NotDirectory(_)) => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

fn depth(path: &str) -> usize {
    if is_root(path) {
        0
    } else {
        path.matches('/').count() + 1
    }
}

fn is_full_hex_id(name: &str) -> bool {
    name.len() == 40 && name.bytes().all(|b| b.is_ascii_hexdigit())
}

fn ref_candidates(name: &str) -> Vec<String> {
    if name == "HEAD" || name.starts_with("refs/") {
        vec![name.to_string()]
    } else {
        vec![
            name.to_string(),
            format!("refs/{name}"),
            format!("refs/heads/{name}"),
            format!("refs/tags/{name}"),
        ]
    }
}

#[async_trait]
impl GitPlumbing for LoosePlumbing {
    async fn init(&self, fs: &dyn FileSystem, dir: &str, default_branch: &str) -> Result<()> {
        if fs.exists(&Self::git_path(dir, "HEAD")).await? {
            return Ok(());
        }

        create_dir_all(fs, &Self::git_path(dir, "objects")).await?;
        create_dir_all(fs, &Self::git_path(dir, "refs/heads")).await?;
        create_dir_all(fs, &Self::git_path(dir, "refs/tags")).await?;

        fs.write_file(
            &Self::git_path(dir, "HEAD"),
            format!("ref: refs/heads/{default_branch}\n").as_bytes(),
        )
        .await?;
        fs.write_file(
            &Self::git_path(dir, "config"),
            b"[core]\n\
              \trepositoryformatversion = 0\n\
              \tfilemode = false\n\
              \tbare = false\n",
        )
        .await?;
        fs.write_file(&Self::git_path(dir, STAGE_FILE), b"").await?;

        debug!(dir, branch = default_branch, "initialized repository");
        Ok(())
    }

    async fn add(&self, fs: &dyn FileSystem, dir: &str, path: &str) -> Result<()> {
        let dir = normalize_path(dir);
        let rel = normalize_path(path);
        if !is_root(&rel) && is_within(&rel, GIT_DIR) {
            return Ok(());
        }

        let full = join_path(&dir, &rel);
        let mut stage = self.read_stage(fs, &dir).await?;

        match fs.stat(&full).await {
            Ok(meta) if meta.is_dir() => {
                for file in self.working_files(fs, &dir, &full).await? {
                    let file_rel = relative_to(&file, &dir).to_string();
                    self.stage_file(fs, &dir, &file_rel, &mut stage).await?;
                }
                // Paths under the directory that vanished from the working tree.
                let gone: Vec<String> = stage
                    .keys()
                    .filter(|p| is_within(p, &rel))
                    .cloned()
                    .collect();
                for p in gone {
                    if !fs.exists(&join_path(&dir, &p)).await? {
                        stage.remove(&p);
                    }
                }
            }
            Ok(_) => self.stage_file(fs, &dir, &rel, &mut stage).await?,
            Err(e) if e.is_not_found() => {
                stage.remove(&rel);
            }
            Err(e) => return Err(e),
        }

        self.write_stage(fs, &dir, &stage).await
    }

    async fn remove(&self, fs: &dyn FileSystem, dir: &str, path: &str) -> Result<()> {
        let mut stage = self.read_stage(fs, dir).await?;
        stage.remove(&normalize_path(path));
        self.write_stage(fs, dir, &stage).await
    }

    async fn commit(
        &self,
        fs: &dyn FileSystem,
        dir: &str,
        message: &str,
        author: &Signature,
    ) -> Result<ObjectId> {
        let stage = self.read_stage(fs, dir).await?;
        let tree = self.write_stage_tree(fs, dir, &stage).await?;
        let parents: Vec<ObjectId> = self.resolve_ref(fs, dir, "HEAD").await?.into_iter().collect();

        let commit = CommitInfo {
            tree,
            parents,
            author: author.clone(),
            committer: author.clone(),
            message: message.to_string(),
        };
        let oid = self
            .write_object(fs, dir, ObjectKind::Commit, &encode_commit(&commit))
            .await?;

        let head = self.read_ref_file(fs, dir, "HEAD").await?.unwrap_or_default();
        match head.strip_prefix("ref:") {
            Some(target) => self.write_ref(fs, dir, target.trim(), oid).await?,
            None => self.write_ref(fs, dir, "HEAD", oid).await?,
        }

        debug!(%oid, %tree, "created commit");
        Ok(oid)
    }

    async fn status(&self, fs: &dyn FileSystem, dir: &str) -> Result<Vec<StatusEntry>> {
        let stage = self.read_stage(fs, dir).await?;
        let head = self.head_files(fs, dir).await?;

        let mut changes = Vec::new();
        for (path, staged) in &stage {
            match head.get(path) {
                None => changes.push(StatusEntry {
                    path: path.clone(),
                    change: FileChange::Added,
                }),
                Some(committed) if committed != staged => changes.push(StatusEntry {
                    path: path.clone(),
                    change: FileChange::Modified,
                }),
                Some(_) => {}
            }
        }
        for path in head.keys() {
            if !stage.contains_key(path) {
                changes.push(StatusEntry {
                    path: path.clone(),
                    change: FileChange::Deleted,
                });
            }
        }

        changes.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(changes)
    }

    async fn resolve_ref(
        &self,
        fs: &dyn FileSystem,
        dir: &str,
        name: &str,
    ) -> Result<Option<ObjectId>> {
        if is_full_hex_id(name) {
            return ObjectId::from_hex(name).map(Some);
        }

        let mut current = name.to_string();
        for _ in 0..MAX_SYMREF_DEPTH {
            let mut content = None;
            for candidate in ref_candidates(&current) {
                if let Some(text) = self.read_ref_file(fs, dir, &candidate).await? {
                    content = Some(text);
                    break;
                }
            }

            let Some(text) = content else {
                return Ok(None);
            };
            match text.strip_prefix("ref:") {
                Some(target) => current = target.trim().to_string(),
                None if text.is_empty() => return Ok(None),
                None => return ObjectId::from_hex(&text).map(Some),
            }
        }

        Err(Error::plumbing(format!(
            "too many levels of symbolic refs resolving '{name}'"
        )))
    }

    async fn write_ref(
        &self,
        fs: &dyn FileSystem,
        dir: &str,
        name: &str,
        oid: ObjectId,
    ) -> Result<()> {
        let valid = (name == "HEAD" || name.starts_with("refs/"))
            && !name.split('/').any(|segment| segment.is_empty() || segment == "..");
        if !valid {
            return Err(Error::plumbing(format!("invalid ref name '{name}'")));
        }

        fs.write_file(&Self::git_path(dir, name), format!("{oid}\n").as_bytes())
            .await
    }

    async fn list_branches(&self, fs: &dyn FileSystem, dir: &str) -> Result<Vec<String>> {
        let heads = Self::git_path(dir, "refs/heads");
        if !fs.exists(&heads).await? {
            return Ok(Vec::new());
        }

        // walk_files returns sorted paths
        Ok(walk_files(fs, &heads)
            .await?
            .iter()
            .map(|path| relative_to(path, &heads).to_string())
            .collect())
    }

    async fn current_branch(&self, fs: &dyn FileSystem, dir: &str) -> Result<Option<String>> {
        let head = self.read_ref_file(fs, dir, "HEAD").await?;
        Ok(head
            .as_deref()
            .and_then(|h| h.strip_prefix("ref:"))
            .and_then(|target| target.trim().strip_prefix("refs/heads/"))
            .map(str::to_string))
    }

    async fn read_commit(
        &self,
        fs: &dyn FileSystem,
        dir: &str,
        oid: ObjectId,
    ) -> Result<CommitInfo> {
        let content = self.read_typed(fs, dir, oid, ObjectKind::Commit).await?;
        decode_commit(&content)
    }

    async fn read_tree(
        &self,
        fs: &dyn FileSystem,
        dir: &str,
        oid: ObjectId,
    ) -> Result<Vec<TreeEntry>> {
        let content = self.read_typed(fs, dir, oid, ObjectKind::Tree).await?;
        decode_tree(&content)
    }

    async fn read_blob(&self, fs: &dyn FileSystem, dir: &str, oid: ObjectId) -> Result<Vec<u8>> {
        self.read_typed(fs, dir, oid, ObjectKind::Blob).await
    }

    async fn pack_objects(
        &self,
        fs: &dyn FileSystem,
        dir: &str,
        oids: &[ObjectId],
    ) -> Result<Vec<u8>> {
        let mut writer = PackWriter::new(self.compression);
        for oid in oids {
            let (kind, content) = self.read_object(fs, dir, *oid).await?;
            writer.add(kind, &content)?;
        }
        debug!(objects = writer.len(), "built pack");
        Ok(writer.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::VolatileStore;

    fn sig() -> Signature {
        Signature::new("Test User", "test@example.com", 1_700_000_000)
    }

    async fn repo() -> (VolatileStore, LoosePlumbing) {
        let fs = VolatileStore::new();
        let git = LoosePlumbing::new();
        git.init(&fs, "/", "main").await.unwrap();
        (fs, git)
    }

    #[tokio::test]
    async fn init_creates_layout() {
        let (fs, git) = repo().await;

        assert_eq!(fs.read_file(".git/HEAD").await.unwrap(), b"ref: refs/heads/main\n");
        assert!(fs.stat(".git/refs/heads").await.unwrap().is_dir());
        assert_eq!(git.resolve_ref(&fs, "/", "HEAD").await.unwrap(), None);
        assert_eq!(
            git.current_branch(&fs, "/").await.unwrap().as_deref(),
            Some("main")
        );
        // Reinit is a no-op
        git.init(&fs, "/", "other").await.unwrap();
        assert_eq!(fs.read_file(".git/HEAD").await.unwrap(), b"ref: refs/heads/main\n");
    }

    #[tokio::test]
    async fn commit_advances_branch_and_chains_parents() {
        let (fs, git) = repo().await;

        fs.write_file("a.txt", b"one").await.unwrap();
        git.add(&fs, "/", "a.txt").await.unwrap();
        let first = git.commit(&fs, "/", "first", &sig()).await.unwrap();

        fs.write_file("a.txt", b"two").await.unwrap();
        git.add(&fs, "/", "a.txt").await.unwrap();
        let second = git.commit(&fs, "/", "second", &sig()).await.unwrap();

        assert_eq!(git.resolve_ref(&fs, "/", "HEAD").await.unwrap(), Some(second));
        assert_eq!(git.resolve_ref(&fs, "/", "main").await.unwrap(), Some(second));
        let commit = git.read_commit(&fs, "/", second).await.unwrap();
        assert_eq!(commit.parents, vec![first]);
        assert_eq!(commit.message, "second\n");
    }

    #[tokio::test]
    async fn nested_paths_become_subtrees() {
        let (fs, git) = repo().await;
        fs.write_file("src/app/main.rs", b"fn main() {}").await.unwrap();
        fs.write_file("README.md", b"# hi").await.unwrap();
        git.add(&fs, "/", ".").await.unwrap();
        let oid = git.commit(&fs, "/", "nested", &sig()).await.unwrap();

        let commit = git.read_commit(&fs, "/", oid).await.unwrap();
        let root = git.read_tree(&fs, "/", commit.tree).await.unwrap();
        let names: Vec<&str> = root.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["README.md", "src"]);
        assert!(root[1].is_tree());

        let src = git.read_tree(&fs, "/", root[1].oid).await.unwrap();
        assert_eq!(src[0].name, "app");
        let app = git.read_tree(&fs, "/", src[0].oid).await.unwrap();
        let blob = git.read_blob(&fs, "/", app[0].oid).await.unwrap();
        assert_eq!(blob, b"fn main() {}");
    }

    #[tokio::test]
    async fn add_all_skips_git_dir() {
        let (fs, git) = repo().await;
        fs.write_file("file.txt", b"x").await.unwrap();
        git.add(&fs, "/", ".").await.unwrap();

        let status = git.status(&fs, "/").await.unwrap();
        assert_eq!(
            status,
            vec![StatusEntry {
                path: "file.txt".into(),
                change: FileChange::Added,
            }]
        );
    }

    #[tokio::test]
    async fn status_reports_modified_and_deleted() {
        let (fs, git) = repo().await;
        fs.write_file("keep.txt", b"1").await.unwrap();
        fs.write_file("drop.txt", b"1").await.unwrap();
        git.add(&fs, "/", ".").await.unwrap();
        git.commit(&fs, "/", "base", &sig()).await.unwrap();
        assert!(git.status(&fs, "/").await.unwrap().is_empty());

        fs.write_file("keep.txt", b"2").await.unwrap();
        fs.unlink("drop.txt").await.unwrap();
        git.add(&fs, "/", ".").await.unwrap();

        let status = git.status(&fs, "/").await.unwrap();
        assert_eq!(
            status,
            vec![
                StatusEntry {
                    path: "drop.txt".into(),
                    change: FileChange::Deleted,
                },
                StatusEntry {
                    path: "keep.txt".into(),
                    change: FileChange::Modified,
                },
            ]
        );
    }

    #[tokio::test]
    async fn repository_in_subdirectory() {
        let fs = VolatileStore::new();
        let git = LoosePlumbing::new();
        git.init(&fs, "/work/repo", "main").await.unwrap();
        fs.write_file("/work/repo/x.txt", b"x").await.unwrap();
        git.add(&fs, "/work/repo", "x.txt").await.unwrap();
        git.commit(&fs, "/work/repo", "sub", &sig()).await.unwrap();

        assert!(fs.exists("work/repo/.git/refs/heads/main").await.unwrap());
        assert_eq!(
            git.list_branches(&fs, "/work/repo").await.unwrap(),
            vec!["main".to_string()]
        );
    }

    #[tokio::test]
    async fn write_ref_rejects_bad_names() {
        let (fs, git) = repo().await;
        let oid = ObjectId::hash_object(ObjectKind::Blob, b"");
        assert!(git.write_ref(&fs, "/", "main", oid).await.is_err());
        assert!(git.write_ref(&fs, "/", "refs/../../x", oid).await.is_err());
        git.write_ref(&fs, "/", "refs/heads/feature/x", oid).await.unwrap();
        assert_eq!(
            git.list_branches(&fs, "/").await.unwrap(),
            vec!["feature/x".to_string()]
        );
    }

    #[tokio::test]
    async fn missing_object_is_plumbing_error() {
        let (fs, git) = repo().await;
        let oid = ObjectId::hash_object(ObjectKind::Blob, b"never written");
        let err = git.read_blob(&fs, "/", oid).await.unwrap_err();
        assert!(matches!(err, Error::Plumbing(_)));
    }

    #[tokio::test]
    async fn read_with_wrong_type_fails() {
        let (fs, git) = repo().await;
        fs.write_file("a", b"a").await.unwrap();
        git.add(&fs, "/", "a").await.unwrap();
        let oid = git.commit(&fs, "/", "c", &sig()).await.unwrap();
        assert!(git.read_tree(&fs, "/", oid).await.is_err());
    }
}

//! Ephemeral repository builder tests

use std::sync::Arc;

use gitkit::{
    BuildOutcome, EphemeralRepositoryBuilder, FileSystem, GitConfig, GitPlumbing, LoosePlumbing,
    PersistentStore, RepositorySession, Signature, SmartProtocolServer, TemplateSnapshot,
};
use pretty_assertions::assert_eq;

fn plumbing() -> Arc<dyn GitPlumbing> {
    Arc::new(LoosePlumbing::new())
}

fn builder() -> EphemeralRepositoryBuilder {
    EphemeralRepositoryBuilder::new(plumbing())
        .config(GitConfig::new().author("Builder", "builder@example.com"))
}

fn template() -> TemplateSnapshot {
    TemplateSnapshot::new()
        .file("package.json", "{\"name\":\"app\"}")
        .file("src/index.js", "console.log('template')")
}

async fn session() -> RepositorySession {
    let store = PersistentStore::open_in_memory().unwrap();
    RepositorySession::open(store, plumbing(), GitConfig::new())
        .await
        .unwrap()
}

#[tokio::test]
async fn empty_build_is_not_an_error() {
    let repo = builder().build(None, None).await.unwrap();

    assert_eq!(repo.outcome(), BuildOutcome::Empty);
    assert_eq!(repo.resolve_head().await.unwrap(), None);
    assert!(
        repo.plumbing()
            .list_branches(repo.fs(), repo.dir())
            .await
            .unwrap()
            .is_empty()
    );

    let refs = SmartProtocolServer::new().advertise_refs(&repo).await.unwrap();
    assert!(String::from_utf8_lossy(&refs).contains("capabilities^{}"));
}

#[tokio::test]
async fn session_without_commits_counts_as_empty() {
    let session = session().await;
    let repo = builder().build(None, Some(&session)).await.unwrap();
    assert_eq!(repo.outcome(), BuildOutcome::Empty);
    assert_eq!(repo.resolve_head().await.unwrap(), None);
}

#[tokio::test]
async fn template_only_build_has_one_commit() {
    let repo = builder().build(Some(&template()), None).await.unwrap();
    assert_eq!(repo.outcome(), BuildOutcome::TemplateOnly);

    let head = repo.resolve_head().await.unwrap().unwrap();
    let commit = repo
        .plumbing()
        .read_commit(repo.fs(), repo.dir(), head)
        .await
        .unwrap();
    assert!(commit.parents.is_empty());
    assert_eq!(commit.message, "Initial commit from template\n");
    assert_eq!(commit.author.name, "Builder");

    assert_eq!(
        repo.fs().read_file("src/index.js").await.unwrap(),
        b"console.log('template')"
    );
}

#[tokio::test]
async fn empty_template_is_skipped() {
    let repo = builder()
        .build(Some(&TemplateSnapshot::new()), None)
        .await
        .unwrap();
    assert_eq!(repo.outcome(), BuildOutcome::Empty);
}

#[tokio::test]
async fn session_history_wins_without_rewriting() {
    let session = session().await;
    session.write_file("index.html", b"<h1>v1</h1>").await.unwrap();
    let first = session
        .commit_as("v1", &Signature::new("Ada", "ada@example.com", 1_700_000_000))
        .await
        .unwrap()
        .unwrap();
    session.write_file("index.html", b"<h1>v2</h1>").await.unwrap();
    let tip = session
        .commit_as("v2", &Signature::new("Ada", "ada@example.com", 1_700_000_100))
        .await
        .unwrap()
        .unwrap();

    let repo = builder()
        .build(Some(&template()), Some(&session))
        .await
        .unwrap();

    assert_eq!(repo.outcome(), BuildOutcome::FullHistory);
    assert_eq!(repo.resolve_head().await.unwrap(), Some(tip));
    assert_eq!(
        repo.plumbing()
            .resolve_ref(repo.fs(), repo.dir(), "refs/heads/main")
            .await
            .unwrap(),
        Some(tip)
    );

    // The session's graph is intact and disconnected from the template commit.
    let commit = repo
        .plumbing()
        .read_commit(repo.fs(), repo.dir(), tip)
        .await
        .unwrap();
    assert_eq!(commit.parents, vec![first]);
    let root = repo
        .plumbing()
        .read_commit(repo.fs(), repo.dir(), first)
        .await
        .unwrap();
    assert!(root.parents.is_empty());
}

#[tokio::test]
async fn history_only_build() {
    let session = session().await;
    session.write_file("a.txt", b"a").await.unwrap();
    let tip = session.commit("only").await.unwrap().unwrap();

    let repo = builder().build(None, Some(&session)).await.unwrap();
    assert_eq!(repo.outcome(), BuildOutcome::FullHistory);
    assert_eq!(repo.resolve_head().await.unwrap(), Some(tip));
}

#[tokio::test]
async fn unresolvable_session_head_degrades() {
    let session = session().await;
    session.write_file("a.txt", b"a").await.unwrap();
    session.commit("one").await.unwrap();
    // Corrupt the branch tip so HEAD cannot be resolved.
    session
        .fs()
        .write_file(".git/refs/heads/main", b"not-an-object-id\n")
        .await
        .unwrap();

    let repo = builder()
        .build(Some(&template()), Some(&session))
        .await
        .unwrap();
    assert_eq!(repo.outcome(), BuildOutcome::Degraded);

    // The branch is back on the template base commit.
    let head = repo.resolve_head().await.unwrap().unwrap();
    let commit = repo
        .plumbing()
        .read_commit(repo.fs(), repo.dir(), head)
        .await
        .unwrap();
    assert_eq!(commit.message, "Initial commit from template\n");
}

#[tokio::test]
async fn degraded_build_without_template_is_servable() {
    let session = session().await;
    session.write_file("a.txt", b"a").await.unwrap();
    session.commit("one").await.unwrap();
    session
        .fs()
        .write_file(".git/refs/heads/main", b"not-an-object-id\n")
        .await
        .unwrap();

    let repo = builder().build(None, Some(&session)).await.unwrap();
    assert_eq!(repo.outcome(), BuildOutcome::Degraded);
    assert_eq!(repo.resolve_head().await.unwrap(), None);

    let refs = SmartProtocolServer::new().advertise_refs(&repo).await.unwrap();
    let text = String::from_utf8_lossy(&refs);
    assert!(text.contains("capabilities^{}"), "{text}");
    assert!(!text.contains("refs/heads/"), "{text}");
}

#[tokio::test]
async fn degraded_build_resets_head_to_configured_branch() {
    let store = PersistentStore::open_in_memory().unwrap();
    let config = GitConfig::new().default_branch("dev");
    let session = RepositorySession::open(store, plumbing(), config)
        .await
        .unwrap();
    session.write_file("a.txt", b"a").await.unwrap();
    session.commit("one").await.unwrap();
    session
        .fs()
        .write_file(".git/refs/heads/dev", b"not-an-object-id\n")
        .await
        .unwrap();

    let repo = builder()
        .build(Some(&template()), Some(&session))
        .await
        .unwrap();
    assert_eq!(repo.outcome(), BuildOutcome::Degraded);
    assert_eq!(repo.head_branch().await.unwrap().as_deref(), Some("main"));
    assert!(repo.resolve_head().await.unwrap().is_some());

    let refs = SmartProtocolServer::new().advertise_refs(&repo).await.unwrap();
    let text = String::from_utf8_lossy(&refs);
    assert!(text.contains("symref=HEAD:refs/heads/main"), "{text}");
    assert!(!text.contains("refs/heads/dev"), "{text}");
}

#[tokio::test]
async fn template_deserializes_from_json() {
    let template: TemplateSnapshot =
        serde_json::from_str(r#"{"/README.md": "hello", "docs/guide.md": "read me"}"#).unwrap();
    assert_eq!(template.len(), 2);

    let repo = builder().build(Some(&template), None).await.unwrap();
    assert_eq!(repo.fs().read_file("README.md").await.unwrap(), b"hello");
    assert_eq!(
        repo.fs().read_file("docs/guide.md").await.unwrap(),
        b"read me"
    );
}

#[tokio::test]
async fn session_store_can_be_reopened() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("session.db");

    let tip = {
        let store = PersistentStore::open(&db).unwrap();
        let session = RepositorySession::open(store, plumbing(), GitConfig::new())
            .await
            .unwrap();
        session.write_file("app.js", b"1").await.unwrap();
        session.commit("persisted").await.unwrap().unwrap()
    };

    let store = PersistentStore::open(&db).unwrap();
    let session = RepositorySession::open(store, plumbing(), GitConfig::new())
        .await
        .unwrap();
    assert_eq!(session.head().await.unwrap(), Some(tip));

    let repo = builder().build(None, Some(&session)).await.unwrap();
    assert_eq!(repo.resolve_head().await.unwrap(), Some(tip));
}

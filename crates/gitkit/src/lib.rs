//! Gitkit - Virtual git filesystem and smart-HTTP serving
//!
//! Part of the Everruns ecosystem.
//!
//! Repositories live in virtual stores instead of on disk: a SQLite-backed
//! [`PersistentStore`] for long-lived sessions and an in-memory
//! [`VolatileStore`] for repositories built per clone request. Both present
//! the same POSIX-style [`FileSystem`] contract to the git plumbing.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use gitkit::{
//!     EphemeralRepositoryBuilder, GitConfig, LoosePlumbing, PersistentStore,
//!     RepositorySession, SmartProtocolServer,
//! };
//!
//! #[tokio::main]
//! async fn main() -> gitkit::Result<()> {
//!     let plumbing = Arc::new(LoosePlumbing::new());
//!     let store = PersistentStore::open_in_memory()?;
//!     let session = RepositorySession::open(store, plumbing.clone(), GitConfig::new()).await?;
//!
//!     session.write_file("index.html", b"<h1>hello</h1>").await?;
//!     session.commit("Add index").await?;
//!
//!     let repo = EphemeralRepositoryBuilder::new(plumbing)
//!         .build(None, Some(&session))
//!         .await?;
//!     let server = SmartProtocolServer::new();
//!     let refs = server.advertise_refs(&repo).await?;
//!     assert!(refs.starts_with(b"001e# service=git-upload-pack\n0000"));
//!     Ok(())
//! }
//! ```

mod error;
pub mod fs;
pub mod git;
pub mod protocol;
pub mod repo;

pub use async_trait::async_trait;
pub use error::{BuildPhase, Error, Result};
pub use fs::{FileSystem, FsBackend, Metadata, PersistentStore, PosixFs, StoreLimits, VolatileStore};
pub use git::{
    CommitInfo, FileChange, GitConfig, GitPlumbing, LoosePlumbing, ObjectId, ObjectKind,
    Signature, StatusEntry, TreeEntry,
};
pub use protocol::{ReachableSet, SmartProtocolServer, reachable_objects};
pub use repo::{
    BuildOutcome, EphemeralRepository, EphemeralRepositoryBuilder, LogEntry, RepositorySession,
    TemplateSnapshot,
};

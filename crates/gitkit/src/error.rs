//! Error types for Gitkit
//!
//! Filesystem errors are categorized the way POSIX categorizes them. The git
//! plumbing branches on these categories (for example it creates missing
//! parents after an `ENOENT` from `mkdir`), so they must reach it verbatim and
//! are never folded into a generic failure.

use std::fmt;
use thiserror::Error;

/// Result type alias using Gitkit's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Phase of an ephemeral repository build that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildPhase {
    /// Creating the empty repository structure.
    Init,
    /// Writing template files and recording the base commit.
    TemplateCommit,
    /// Copying the session's history into the volatile store.
    HistoryImport,
    /// Pointing the main branch at the session's tip.
    RefRepoint,
}

impl fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildPhase::Init => "init",
            BuildPhase::TemplateCommit => "template-commit",
            BuildPhase::HistoryImport => "history-import",
            BuildPhase::RefRepoint => "ref-repoint",
        };
        f.write_str(name)
    }
}

/// Gitkit error types.
#[derive(Error, Debug)]
pub enum Error {
    /// Path does not exist.
    #[error("ENOENT: no such file or directory, '{0}'")]
    NotFound(String),

    /// Path is a directory where a file was expected.
    #[error("EISDIR: illegal operation on a directory, '{0}'")]
    IsDirectory(String),

    /// Path (or one of its ancestors) is a file where a directory was expected.
    #[error("ENOTDIR: not a directory, '{0}'")]
    NotDirectory(String),

    /// A file already occupies the path.
    #[error("EEXIST: file already exists, '{0}'")]
    AlreadyExists(String),

    /// Directory still has entries.
    #[error("ENOTEMPTY: directory not empty, '{0}'")]
    NotEmpty(String),

    /// Operation is not allowed on this path.
    #[error("EPERM: operation not permitted, '{0}'")]
    PermissionDenied(String),

    /// Encoded object does not fit the backend's ceiling.
    #[error("EFBIG: '{path}' is {size} bytes encoded, limit is {limit}")]
    SizeExceeded { path: String, size: u64, limit: u64 },

    /// Failure reported by the git plumbing.
    #[error("plumbing error: {0}")]
    Plumbing(String),

    /// Ephemeral repository assembly failed.
    #[error("build failed during {phase}: {source}")]
    Build {
        phase: BuildPhase,
        #[source]
        source: Box<Error>,
    },

    /// Persistent store failure.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Stored content could not be decoded.
    #[error("encoding error: {0}")]
    Encoding(#[from] base64::DecodeError),

    /// I/O error from compression streams.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap an error raised during one build phase.
    pub fn build(phase: BuildPhase, source: Error) -> Self {
        Self::Build {
            phase,
            source: Box::new(source),
        }
    }

    /// Create a plumbing error.
    pub fn plumbing(message: impl Into<String>) -> Self {
        Self::Plumbing(message.into())
    }

    /// POSIX error code for filesystem errors.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Error::NotFound(_) => Some("ENOENT"),
            Error::IsDirectory(_) => Some("EISDIR"),
            Error::NotDirectory(_) => Some("ENOTDIR"),
            Error::AlreadyExists(_) => Some("EEXIST"),
            Error::NotEmpty(_) => Some("ENOTEMPTY"),
            Error::PermissionDenied(_) => Some("EPERM"),
            Error::SizeExceeded { .. } => Some("EFBIG"),
            _ => None,
        }
    }

    /// Check if this is an `ENOENT` error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Phase of a build failure, if this is one.
    pub fn build_phase(&self) -> Option<BuildPhase> {
        match self {
            Error::Build { phase, .. } => Some(*phase),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn posix_codes() {
        assert_eq!(Error::NotFound("a".into()).code(), Some("ENOENT"));
        assert_eq!(Error::NotEmpty("a".into()).code(), Some("ENOTEMPTY"));
        assert_eq!(Error::plumbing("boom").code(), None);
    }

    #[test]
    fn message_starts_with_code() {
        let err = Error::IsDirectory("a/b".into());
        assert!(err.to_string().starts_with("EISDIR"));
        assert!(err.to_string().contains("a/b"));
    }

    #[test]
    fn build_error_keeps_phase_and_source() {
        let err = Error::build(BuildPhase::HistoryImport, Error::NotFound(".git".into()));
        assert_eq!(err.build_phase(), Some(BuildPhase::HistoryImport));
        assert!(err.to_string().contains("history-import"));
        assert!(err.to_string().contains("ENOENT"));
    }
}

//! Repositories: persistent sessions and request-scoped ephemeral copies.

mod builder;
mod session;

pub use builder::{BuildOutcome, EphemeralRepository, EphemeralRepositoryBuilder, TemplateSnapshot};
pub use session::{LogEntry, RepositorySession};

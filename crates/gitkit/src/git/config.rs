//! Git configuration for Gitkit.
//!
//! Identity and layout used when repositories are initialized and committed
//! to. Nothing is read from the host's git configuration.

use super::object::Signature;

/// Default author name for commits.
pub const DEFAULT_AUTHOR_NAME: &str = "gitkit";

/// Default author email for commits.
pub const DEFAULT_AUTHOR_EMAIL: &str = "gitkit@everruns.local";

/// Default branch for new repositories.
pub const DEFAULT_BRANCH: &str = "main";

/// Directory that holds repository metadata, relative to the working tree.
pub const GIT_DIR: &str = ".git";

/// Git configuration.
///
/// # Example
///
/// ```rust
/// use gitkit::GitConfig;
///
/// let config = GitConfig::new()
///     .author("Deploy Bot", "deploy@example.com")
///     .default_branch("trunk");
/// assert_eq!(config.branch(), "trunk");
/// ```
#[derive(Debug, Clone)]
pub struct GitConfig {
    /// Author name for commits
    pub(crate) author_name: String,
    /// Author email for commits
    pub(crate) author_email: String,
    /// Branch created by init and repointed by builds
    pub(crate) default_branch: String,
    /// Message of the template base commit
    pub(crate) template_message: String,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            author_name: DEFAULT_AUTHOR_NAME.to_string(),
            author_email: DEFAULT_AUTHOR_EMAIL.to_string(),
            default_branch: DEFAULT_BRANCH.to_string(),
            template_message: "Initial commit from template".to_string(),
        }
    }
}

impl GitConfig {
    /// Create a new git configuration with the default identity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the author name and email for commits.
    pub fn author(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.author_name = name.into();
        self.author_email = email.into();
        self
    }

    /// Set the branch created by init.
    pub fn default_branch(mut self, branch: impl Into<String>) -> Self {
        self.default_branch = branch.into();
        self
    }

    /// Set the message of the template base commit.
    pub fn template_message(mut self, message: impl Into<String>) -> Self {
        self.template_message = message.into();
        self
    }

    /// Branch name (without `refs/heads/`).
    pub fn branch(&self) -> &str {
        &self.default_branch
    }

    /// Full ref of the default branch.
    pub fn branch_ref(&self) -> String {
        format!("refs/heads/{}", self.default_branch)
    }

    /// Author name.
    pub fn author_name(&self) -> &str {
        &self.author_name
    }

    /// Author email.
    pub fn author_email(&self) -> &str {
        &self.author_email
    }

    /// Signature for a commit made now.
    pub fn signature(&self) -> Signature {
        Signature::new(
            self.author_name.clone(),
            self.author_email.clone(),
            chrono::Utc::now().timestamp(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = GitConfig::new();
        assert_eq!(config.author_name(), DEFAULT_AUTHOR_NAME);
        assert_eq!(config.branch_ref(), "refs/heads/main");
    }

    #[test]
    fn builder_overrides() {
        let config = GitConfig::new()
            .author("CI Bot", "ci@example.com")
            .default_branch("develop");
        let sig = config.signature();
        assert_eq!(sig.name, "CI Bot");
        assert_eq!(sig.email, "ci@example.com");
        assert!(sig.timestamp > 0);
        assert_eq!(config.branch_ref(), "refs/heads/develop");
    }
}

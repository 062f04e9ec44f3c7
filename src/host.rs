//! Capabilities the embedding editor host must provide.
//!
//! The agent never talks to editor UI or version control directly; it goes
//! through these traits. Hosts implement them over their own prompt,
//! notification, and SCM APIs. [`WorkspaceGit`] is a ready-made [`GitLookup`]
//! for hosts that can enumerate their open repositories.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

/// What the user picked at the sign-in prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignInChoice {
    /// Run the device authorization flow in the browser
    OpenBrowser,
    /// Paste a pre-issued access token
    EnterToken,
    /// Close the prompt without signing in
    Dismissed,
}

/// User-facing surface of the host: prompts, notifications, and the
/// elapsed-time display.
#[async_trait]
pub trait UserInterface: Send + Sync {
    async fn prompt_sign_in(&self) -> SignInChoice;

    /// Ask the user to paste an access token; `None` when they abort.
    async fn prompt_access_token(&self) -> Option<String>;

    /// Present the device-authorization user code and verification link.
    async fn show_user_code(&self, user_code: &str, verification_uri: &str);

    async fn open_external(&self, url: &str);

    fn notify_info(&self, message: &str);

    fn notify_error(&self, message: &str);

    /// Render elapsed time for the active session; `None` renders paused.
    fn show_elapsed(&self, elapsed: Option<Duration>);
}

/// Version-control lookup for the active file.
pub trait GitLookup: Send + Sync {
    fn repository_root_for(&self, path: &Path) -> Option<PathBuf>;
    fn remote_url_for(&self, path: &Path) -> Option<String>;
}

/// One repository the host knows about.
#[derive(Debug, Clone)]
pub struct KnownRepository {
    pub root: PathBuf,
    /// Remote the checked-out branch pushes to, when one is configured
    pub head_remote_url: Option<String>,
    /// All configured remotes, in configuration order
    pub remote_urls: Vec<String>,
}

/// [`GitLookup`] over the host's open repositories. The deepest root
/// containing the file wins, so nested repositories resolve to the inner one.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceGit {
    repositories: Vec<KnownRepository>,
}

impl WorkspaceGit {
    pub fn new(repositories: Vec<KnownRepository>) -> Self {
        Self { repositories }
    }

    fn find(&self, path: &Path) -> Option<&KnownRepository> {
        self.repositories
            .iter()
            .filter(|repo| path.starts_with(&repo.root))
            .max_by_key(|repo| repo.root.as_os_str().len())
    }
}

impl GitLookup for WorkspaceGit {
    fn repository_root_for(&self, path: &Path) -> Option<PathBuf> {
        self.find(path).map(|repo| repo.root.clone())
    }

    fn remote_url_for(&self, path: &Path) -> Option<String> {
        let repo = self.find(path)?;
        repo.head_remote_url
            .clone()
            .or_else(|| repo.remote_urls.first().cloned())
    }
}

//! Pulsetrack agent - idle-aware editor activity tracking reported to a
//! hosted timesheet backend.
//!
//! An editor host embeds [`Agent`], implements the capability traits in
//! [`host`], and forwards editor events to the tracker. The agent handles
//! the rest: credential storage, device-code or manual-token sign-in,
//! session refresh, debounced heartbeat reporting, and idle detection.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use pulsetrack::{Agent, Config, EditorSnapshot, host::{UserInterface, WorkspaceGit}};
//! # async fn example(ui: Arc<dyn UserInterface>) -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let git = Arc::new(WorkspaceGit::default());
//! let agent = Agent::with_http_backend(config, ui, git)?;
//!
//! agent.authenticate().await;
//! agent.tracker().activate();
//! agent
//!     .tracker()
//!     .handle_activity(EditorSnapshot {
//!         active_file: Some("/work/project/src/main.rs".into()),
//!         window_focused: true,
//!     })
//!     .await;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod host;
pub mod reporter;
pub mod tracker;
pub mod util;

#[cfg(test)]
pub(crate) mod testutil;

pub use api::{ApiError, Backend, HttpBackend};
pub use auth::{AuthError, CredentialStore, KeyringStore, SecretStore, Session, SessionManager};
pub use config::Config;
pub use host::{GitLookup, SignInChoice, UserInterface, WorkspaceGit};
pub use reporter::EventReporter;
pub use tracker::{ActivitySignal, ActivityTracker, EditorSnapshot};

use std::sync::Arc;

/// The wired-up agent: one explicit context object constructed at startup
/// and handed to the host, with no ambient global state.
pub struct Agent {
    sessions: Arc<SessionManager>,
    tracker: ActivityTracker,
}

impl Agent {
    /// Wire the components over explicit capability implementations.
    pub fn new(
        config: Config,
        backend: Arc<dyn Backend>,
        secrets: Arc<dyn SecretStore>,
        ui: Arc<dyn UserInterface>,
        git: Arc<dyn GitLookup>,
    ) -> Self {
        let credentials = CredentialStore::new(&config.origin, secrets);
        let sessions = SessionManager::new(Arc::clone(&backend), credentials, Arc::clone(&ui));
        let reporter = Arc::new(EventReporter::new(
            backend,
            Arc::clone(&sessions),
            Arc::clone(&git),
            Arc::clone(&ui),
        ));
        let tracker = ActivityTracker::new(&config, reporter, git, ui);

        Self { sessions, tracker }
    }

    /// Production wiring: HTTP backend against the configured origin and the
    /// OS keychain for credentials.
    pub fn with_http_backend(
        config: Config,
        ui: Arc<dyn UserInterface>,
        git: Arc<dyn GitLookup>,
    ) -> Result<Self, ApiError> {
        let backend = Arc::new(HttpBackend::new(&config.origin, &config.api_url())?);
        Ok(Self::new(config, backend, Arc::new(KeyringStore), ui, git))
    }

    /// Establish a session; `None` means the user declined or authentication
    /// is currently unavailable.
    pub async fn authenticate(&self) -> Option<Session> {
        self.sessions.authenticate().await
    }

    pub fn logout(&self) {
        self.sessions.logout();
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn tracker(&self) -> &ActivityTracker {
        &self.tracker
    }

    /// Host teardown: stop tracking, cancel in-flight sign-in polling, and
    /// clear every timer so nothing fires afterwards.
    pub fn shutdown(&self) {
        self.tracker.deactivate();
        self.sessions.shutdown();
    }
}

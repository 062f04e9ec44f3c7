//! Activity-event reporting.
//!
//! Takes signals from the tracker, attaches the current session and git
//! metadata, and calls the backend. Best-effort: with no session the signal
//! is dropped on the floor, and failures surface once as a non-blocking
//! notice. A 401-class rejection gets one silent re-authentication attempt
//! before giving up.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::api::{ActivityEventInput, ApiError, Backend, EVENT_SOURCE};
use crate::auth::SessionManager;
use crate::host::{GitLookup, UserInterface};
use crate::tracker::ActivitySignal;

pub struct EventReporter {
    backend: Arc<dyn Backend>,
    sessions: Arc<SessionManager>,
    git: Arc<dyn GitLookup>,
    ui: Arc<dyn UserInterface>,
}

impl EventReporter {
    pub fn new(
        backend: Arc<dyn Backend>,
        sessions: Arc<SessionManager>,
        git: Arc<dyn GitLookup>,
        ui: Arc<dyn UserInterface>,
    ) -> Self {
        Self {
            backend,
            sessions,
            git,
            ui,
        }
    }

    pub async fn report(&self, signal: ActivitySignal) {
        // The session is read immediately before sending so a token revoked
        // by logout is never attached to an event.
        let Some(session) = self.sessions.current_session() else {
            debug!(file = %signal.file_path.display(), "no active session, dropping signal");
            self.ui.show_elapsed(None);
            return;
        };

        let input = self.build_input(&signal);
        match self
            .backend
            .create_activity_event(&session.token, &input)
            .await
        {
            Ok(receipt) => {
                debug!(event_id = %receipt.id, file = %input.filename, "activity event recorded");
            }
            Err(ApiError::Unauthorized) => {
                info!("activity event rejected as unauthorized, re-authenticating");
                self.retry_after_reauth(&input).await;
            }
            Err(err) => self.surface_failure(err),
        }
    }

    async fn retry_after_reauth(&self, input: &ActivityEventInput) {
        let Some(fresh) = self.sessions.authenticate().await else {
            warn!("re-authentication failed, dropping activity event");
            return;
        };

        match self.backend.create_activity_event(&fresh.token, input).await {
            Ok(receipt) => {
                debug!(event_id = %receipt.id, "activity event recorded after re-authentication");
            }
            Err(err) => self.surface_failure(err),
        }
    }

    fn surface_failure(&self, err: ApiError) {
        warn!(error = %err, "failed to record activity event");
        self.ui
            .notify_error("Pulsetrack: error while saving timesheet data.");
    }

    fn build_input(&self, signal: &ActivitySignal) -> ActivityEventInput {
        // Report repository-relative paths when the file is inside a known
        // repository, absolute paths otherwise.
        let filename = match self.git.repository_root_for(&signal.file_path) {
            Some(root) => signal
                .file_path
                .strip_prefix(&root)
                .unwrap_or(&signal.file_path)
                .to_path_buf(),
            None => signal.file_path.clone(),
        };

        ActivityEventInput {
            filename: filename.to_string_lossy().into_owned(),
            source: EVENT_SOURCE,
            is_heartbeat: true,
            start_date_time: signal.timestamp,
            git_remote_url: signal.git_remote_url.clone(),
        }
    }
}

//! Session lifecycle: authenticate, refresh, logout.
//!
//! A [`Session`] is the in-memory pairing of a validated token with the
//! identity the backend reported for it. At most one session is current.
//! [`SessionManager`] owns it and decides the fate of stored credentials:
//! tokens the backend rejects are deleted, tokens that merely could not be
//! checked are kept.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{ApiError, Backend, Identity, IssuedToken};
use crate::host::{SignInChoice, UserInterface};
use crate::util::{lock_unpoisoned, TimerSlot};

use super::credentials::CredentialStore;
use super::{device_flow, AuthError};

#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user_id: String,
    pub profile_id: String,
    pub profile_name: String,
    /// Set only for tokens that advertised a bounded lifetime.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    fn from_identity(token: String, identity: Identity, expires_in: Option<Duration>) -> Self {
        let expires_at = expires_in
            .and_then(|lifetime| chrono::Duration::from_std(lifetime).ok())
            .map(|lifetime| Utc::now() + lifetime);

        Self {
            token,
            user_id: identity.user_id,
            profile_id: identity.profile_id,
            profile_name: identity.profile_name,
            expires_at,
        }
    }

    pub fn lifetime_remaining(&self) -> Option<Duration> {
        let expires_at = self.expires_at?;
        (expires_at - Utc::now()).to_std().ok()
    }
}

/// Outcome of validating one stored credential.
enum Validation {
    Valid(Session),
    Invalid,
    Unreachable,
}

pub struct SessionManager {
    backend: Arc<dyn Backend>,
    credentials: CredentialStore,
    ui: Arc<dyn UserInterface>,
    current: Mutex<Option<Session>>,
    refresh: Mutex<TimerSlot>,
    cancel: CancellationToken,
}

impl SessionManager {
    pub fn new(
        backend: Arc<dyn Backend>,
        credentials: CredentialStore,
        ui: Arc<dyn UserInterface>,
    ) -> Arc<Self> {
        Arc::new(Self {
            backend,
            credentials,
            ui,
            current: Mutex::new(None),
            refresh: Mutex::new(TimerSlot::default()),
            cancel: CancellationToken::new(),
        })
    }

    /// The session consumers may report against right now, if any.
    pub fn current_session(&self) -> Option<Session> {
        lock_unpoisoned(&self.current).clone()
    }

    /// Establish a session: try every stored credential, fall back to the
    /// interactive sign-in path. Returns `None` when the user bows out or
    /// authentication is unavailable; callers treat dependent features as
    /// inactive until the next successful call.
    pub async fn authenticate(self: &Arc<Self>) -> Option<Session> {
        match self.try_authenticate().await {
            Ok(session) => session,
            Err(err) if err.is_silent() => {
                debug!("authentication cancelled by user");
                None
            }
            Err(err) => {
                warn!(error = %err, "authentication unavailable");
                self.ui
                    .notify_error("Pulsetrack: could not sign in. Activity is not being recorded.");
                None
            }
        }
    }

    async fn try_authenticate(self: &Arc<Self>) -> Result<Option<Session>, AuthError> {
        let stored = self.credentials.list()?;
        if stored.is_empty() {
            debug!("no stored credentials, entering sign-in flow");
            return self.sign_in().await;
        }

        // Validate concurrently, but aggregate strictly in stored order so
        // the winner is deterministic no matter which call returns first.
        let checks = stored
            .iter()
            .map(|credential| self.validate(credential.token.clone()));
        let outcomes = future::join_all(checks).await;

        let mut selected = None;
        for (credential, outcome) in stored.iter().zip(outcomes) {
            match outcome {
                Validation::Valid(session) => {
                    if selected.is_none() {
                        selected = Some(session);
                    }
                }
                Validation::Invalid => {
                    info!(account = %credential.account, "removing credential rejected by backend");
                    if let Err(err) = self.credentials.delete(&credential.account) {
                        warn!(error = %err, account = %credential.account, "failed to remove stale credential");
                    }
                }
                Validation::Unreachable => {
                    debug!(account = %credential.account, "backend unreachable, keeping credential");
                }
            }
        }

        if let Some(session) = selected {
            info!(profile = %session.profile_name, "authenticated with stored credential");
            self.install(session.clone());
            return Ok(Some(session));
        }

        self.sign_in().await
    }

    async fn validate(&self, token: String) -> Validation {
        match self.backend.me(&token).await {
            Ok(identity) => Validation::Valid(Session::from_identity(token, identity, None)),
            Err(err) if err.invalidates_token() => Validation::Invalid,
            Err(err) => {
                debug!(error = %err, "credential validation did not complete");
                Validation::Unreachable
            }
        }
    }

    /// Interactive sign-in: device authorization in the browser, or a
    /// manually pasted token. Dismissing the prompt is not an error.
    async fn sign_in(self: &Arc<Self>) -> Result<Option<Session>, AuthError> {
        match self.ui.prompt_sign_in().await {
            SignInChoice::Dismissed => {
                debug!("sign-in prompt dismissed");
                Ok(None)
            }
            SignInChoice::OpenBrowser => {
                let cancel = self.cancel.child_token();
                let issued =
                    device_flow::run(self.backend.as_ref(), self.ui.as_ref(), &cancel).await?;
                let session = self.validate_issued(issued).await?;
                self.persist_and_install(session.clone())?;
                Ok(Some(session))
            }
            SignInChoice::EnterToken => {
                let Some(token) = self.ui.prompt_access_token().await else {
                    debug!("no access token entered");
                    return Ok(None);
                };
                match self.backend.me(&token).await {
                    Ok(identity) => {
                        let session = Session::from_identity(token, identity, None);
                        self.persist_and_install(session.clone())?;
                        Ok(Some(session))
                    }
                    Err(ApiError::Unauthorized) => {
                        self.ui
                            .notify_error("Pulsetrack: that access token is not valid.");
                        Ok(None)
                    }
                    Err(err) => Err(AuthError::from_api(err)),
                }
            }
        }
    }

    async fn validate_issued(&self, issued: IssuedToken) -> Result<Session, AuthError> {
        let identity = self
            .backend
            .me(&issued.access_token)
            .await
            .map_err(AuthError::from_api)?;
        Ok(Session::from_identity(
            issued.access_token,
            identity,
            issued.expires_in,
        ))
    }

    fn persist_and_install(self: &Arc<Self>, session: Session) -> Result<(), AuthError> {
        self.credentials.save(&session.profile_id, &session.token)?;
        info!(profile = %session.profile_name, "credentials saved");
        self.ui.notify_info(&format!(
            "Pulsetrack: signed in as {}.",
            session.profile_name
        ));
        self.install(session);
        Ok(())
    }

    fn install(self: &Arc<Self>, session: Session) {
        self.schedule_refresh(&session);
        *lock_unpoisoned(&self.current) = Some(session);
    }

    /// Re-authenticate at half the token's advertised lifetime. A session
    /// without a bounded lifetime is left alone until the backend rejects it.
    fn schedule_refresh(self: &Arc<Self>, session: &Session) {
        let mut slot = lock_unpoisoned(&self.refresh);
        slot.clear();

        let Some(lifetime) = session.lifetime_remaining() else {
            return;
        };
        let delay = lifetime / 2;
        debug!(delay_secs = delay.as_secs(), "refresh scheduled");

        let manager = Arc::clone(self);
        slot.replace(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            info!("session lifetime half elapsed, re-authenticating");
            if manager.authenticate().await.is_none() {
                warn!("session refresh failed, signing out");
                manager.logout();
            }
        }));
    }

    /// Drop the current session and its stored credential. Safe to call
    /// repeatedly; the second call finds nothing to do.
    pub fn logout(&self) {
        lock_unpoisoned(&self.refresh).clear();

        let Some(session) = lock_unpoisoned(&self.current).take() else {
            debug!("logout with no active session");
            return;
        };

        match self.credentials.delete(&session.profile_id) {
            Ok(true) => debug!(account = %session.profile_id, "credential deleted"),
            Ok(false) => debug!(account = %session.profile_id, "no credential to delete"),
            Err(err) => warn!(error = %err, "failed to delete credential during logout"),
        }
        info!(profile = %session.profile_name, "signed out");
    }

    /// Tear down: stop the refresh timer and cancel any in-flight device
    /// authorization. The manager must not fire timers after this.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        lock_unpoisoned(&self.refresh).clear();
    }

    #[cfg(test)]
    pub(crate) fn refresh_is_scheduled(&self) -> bool {
        lock_unpoisoned(&self.refresh).is_armed()
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

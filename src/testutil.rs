//! Scripted in-memory fakes for the capability seams, shared by the unit
//! tests across modules. Compiled only for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::api::{
    ActivityEventInput, ApiError, Backend, DeviceAuthorization, DevicePoll, EventReceipt,
    Identity,
};
use crate::auth::{AuthError, CredentialStore, SecretStore, StoredSecret};
use crate::host::{SignInChoice, UserInterface};
use crate::util::lock_unpoisoned;

pub type SharedBackend = Arc<ScriptedBackend>;

// ============================================================================
// Secret store
// ============================================================================

/// In-memory [`SecretStore`] preserving insertion order per service.
#[derive(Default)]
pub struct MemoryStore {
    services: Mutex<HashMap<String, Vec<(String, String)>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for MemoryStore {
    fn find(&self, service: &str) -> Result<Vec<StoredSecret>, AuthError> {
        Ok(lock_unpoisoned(&self.services)
            .get(service)
            .map(|entries| {
                entries
                    .iter()
                    .map(|(account, secret)| StoredSecret {
                        account: account.clone(),
                        secret: secret.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    fn set(&self, service: &str, account: &str, secret: &str) -> Result<(), AuthError> {
        let mut services = lock_unpoisoned(&self.services);
        let entries = services.entry(service.to_string()).or_default();
        if let Some(existing) = entries.iter_mut().find(|(a, _)| a.as_str() == account) {
            existing.1 = secret.to_string();
        } else {
            entries.push((account.to_string(), secret.to_string()));
        }
        Ok(())
    }

    fn delete(&self, service: &str, account: &str) -> Result<bool, AuthError> {
        let mut services = lock_unpoisoned(&self.services);
        let Some(entries) = services.get_mut(service) else {
            return Ok(false);
        };
        let before = entries.len();
        entries.retain(|(a, _)| a.as_str() != account);
        Ok(entries.len() != before)
    }
}

/// A credential store over a fresh in-memory backing, pre-seeded with
/// `(account, token)` pairs in order.
pub fn memory_credentials(seeded: &[(&str, &str)]) -> CredentialStore {
    let store = CredentialStore::new("https://app.example.com", Arc::new(MemoryStore::new()));
    for (account, token) in seeded {
        store.save(account, token).expect("seed credential");
    }
    store
}

// ============================================================================
// Backend
// ============================================================================

enum MeScript {
    Accept(Identity),
    Reject,
    Fail,
}

/// Backend whose responses are scripted per token / per call.
#[derive(Default)]
pub struct ScriptedBackend {
    me_scripts: Mutex<HashMap<String, MeScript>>,
    me_calls: AtomicUsize,
    polls: Mutex<VecDeque<DevicePoll>>,
    poll_times: Mutex<Vec<Instant>>,
    events: Mutex<Vec<(String, ActivityEventInput)>>,
    event_results: Mutex<VecDeque<Result<(), ApiError>>>,
    allow_all_events: AtomicUsize,
    event_seq: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accept_token(&self, token: &str, user_id: &str, profile_id: &str, name: &str) {
        lock_unpoisoned(&self.me_scripts).insert(
            token.to_string(),
            MeScript::Accept(Identity {
                user_id: user_id.to_string(),
                profile_id: profile_id.to_string(),
                profile_name: name.to_string(),
            }),
        );
    }

    /// The backend will answer 401 for this token.
    pub fn reject_token(&self, token: &str) {
        lock_unpoisoned(&self.me_scripts).insert(token.to_string(), MeScript::Reject);
    }

    /// The backend will answer with a transient failure for this token.
    pub fn fail_token(&self, token: &str) {
        lock_unpoisoned(&self.me_scripts).insert(token.to_string(), MeScript::Fail);
    }

    pub fn script_polls(&self, polls: impl IntoIterator<Item = DevicePoll>) {
        lock_unpoisoned(&self.polls).extend(polls);
    }

    pub fn poll_times(&self) -> Vec<Instant> {
        lock_unpoisoned(&self.poll_times).clone()
    }

    /// Accept every activity event not covered by a scripted result.
    pub fn allow_events(&self) {
        self.allow_all_events.store(1, Ordering::Release);
    }

    pub fn script_event_results(&self, results: impl IntoIterator<Item = Result<(), ApiError>>) {
        lock_unpoisoned(&self.event_results).extend(results);
    }

    pub fn events(&self) -> Vec<(String, ActivityEventInput)> {
        lock_unpoisoned(&self.events).clone()
    }

    pub fn event_count(&self) -> usize {
        lock_unpoisoned(&self.events).len()
    }

    pub fn me_calls(&self) -> usize {
        self.me_calls.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn me(&self, token: &str) -> Result<Identity, ApiError> {
        self.me_calls.fetch_add(1, Ordering::AcqRel);
        match lock_unpoisoned(&self.me_scripts).get(token) {
            Some(MeScript::Accept(identity)) => Ok(identity.clone()),
            Some(MeScript::Reject) => Err(ApiError::Unauthorized),
            Some(MeScript::Fail) => Err(ApiError::ServerError("scripted outage".to_string())),
            None => Err(ApiError::ServerError(format!("unscripted token {token}"))),
        }
    }

    async fn create_activity_event(
        &self,
        token: &str,
        input: &ActivityEventInput,
    ) -> Result<EventReceipt, ApiError> {
        lock_unpoisoned(&self.events).push((token.to_string(), input.clone()));

        if let Some(result) = lock_unpoisoned(&self.event_results).pop_front() {
            return result.map(|()| EventReceipt {
                id: format!("evt-{}", self.event_seq.fetch_add(1, Ordering::AcqRel)),
            });
        }
        if self.allow_all_events.load(Ordering::Acquire) == 1 {
            return Ok(EventReceipt {
                id: format!("evt-{}", self.event_seq.fetch_add(1, Ordering::AcqRel)),
            });
        }
        Err(ApiError::ServerError("unscripted event".to_string()))
    }

    async fn request_device_code(&self) -> Result<DeviceAuthorization, ApiError> {
        Ok(DeviceAuthorization {
            device_code: "device-1".to_string(),
            user_code: "WDJB-MJHT".to_string(),
            verification_uri: "https://app.example.com/activate".to_string(),
            interval: Duration::from_secs(5),
            expires_in: Duration::from_secs(60),
        })
    }

    async fn poll_device_token(&self, _device_code: &str) -> Result<DevicePoll, ApiError> {
        lock_unpoisoned(&self.poll_times).push(Instant::now());
        lock_unpoisoned(&self.polls)
            .pop_front()
            .ok_or_else(|| ApiError::ServerError("unscripted poll".to_string()))
    }
}

// ============================================================================
// User interface
// ============================================================================

/// UI whose prompts are scripted and whose outputs are recorded.
#[derive(Default)]
pub struct RecordingUi {
    sign_in_choices: Mutex<VecDeque<SignInChoice>>,
    tokens: Mutex<VecDeque<Option<String>>>,
    shown_codes: Mutex<Vec<(String, String)>>,
    opened_urls: Mutex<Vec<String>>,
    infos: Arc<Mutex<Vec<String>>>,
    errors: Arc<Mutex<Vec<String>>>,
    elapsed: Mutex<Vec<Option<Duration>>>,
}

impl RecordingUi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_sign_in(&self, choices: impl IntoIterator<Item = SignInChoice>) {
        lock_unpoisoned(&self.sign_in_choices).extend(choices);
    }

    pub fn script_tokens(&self, tokens: impl IntoIterator<Item = Option<String>>) {
        lock_unpoisoned(&self.tokens).extend(tokens);
    }

    pub fn shown_codes(&self) -> Vec<(String, String)> {
        lock_unpoisoned(&self.shown_codes).clone()
    }

    pub fn opened_urls(&self) -> Vec<String> {
        lock_unpoisoned(&self.opened_urls).clone()
    }

    pub fn errors_handle(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.errors)
    }

    pub fn infos_handle(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.infos)
    }
}

#[async_trait]
impl UserInterface for RecordingUi {
    async fn prompt_sign_in(&self) -> SignInChoice {
        lock_unpoisoned(&self.sign_in_choices)
            .pop_front()
            .unwrap_or(SignInChoice::Dismissed)
    }

    async fn prompt_access_token(&self) -> Option<String> {
        lock_unpoisoned(&self.tokens).pop_front().flatten()
    }

    async fn show_user_code(&self, user_code: &str, verification_uri: &str) {
        lock_unpoisoned(&self.shown_codes)
            .push((user_code.to_string(), verification_uri.to_string()));
    }

    async fn open_external(&self, url: &str) {
        lock_unpoisoned(&self.opened_urls).push(url.to_string());
    }

    fn notify_info(&self, message: &str) {
        lock_unpoisoned(&self.infos).push(message.to_string());
    }

    fn notify_error(&self, message: &str) {
        lock_unpoisoned(&self.errors).push(message.to_string());
    }

    fn show_elapsed(&self, elapsed: Option<Duration>) {
        lock_unpoisoned(&self.elapsed).push(elapsed);
    }
}
